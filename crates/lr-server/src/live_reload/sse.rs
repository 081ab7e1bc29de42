//! Push endpoint handlers.
//!
//! `GET {endpoint}` opens a server-sent event stream that carries one
//! `data:` frame per reload message. The stream stays open until the client
//! disconnects or the hub drops the connection.

use std::time::Duration;

use axum::Json;
use axum::extract::State;
use axum::http::header;
use axum::response::IntoResponse;
use axum::response::sse::{Event, KeepAlive, Sse};
use serde::Serialize;
use tokio_stream::{Stream, StreamExt};

use crate::error::ServerError;
use crate::state::LiveReloadState;

/// Interval between keep-alive comments on idle streams.
const KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(15);

/// Handle GET {endpoint}.
pub(crate) async fn sse_handler(
    State(state): State<LiveReloadState>,
) -> Result<Sse<impl Stream<Item = Result<Event, axum::Error>>>, ServerError> {
    let subscription = state.hub.subscribe().await?;
    tracing::debug!(id = %subscription.id(), "Opened live reload stream");

    let stream = subscription.map(|message| Event::default().json_data(message));

    Ok(Sse::new(stream).keep_alive(KeepAlive::new().interval(KEEP_ALIVE_INTERVAL)))
}

/// Handle GET {endpoint}/client.js.
pub(crate) async fn client_script(State(state): State<LiveReloadState>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/javascript; charset=utf-8")],
        state.context.client_js().to_owned(),
    )
}

/// Response for GET {endpoint}/clients.
#[derive(Serialize)]
pub(crate) struct ClientsResponse {
    /// Number of open push connections.
    connections: usize,
}

/// Handle GET {endpoint}/clients.
pub(crate) async fn clients(
    State(state): State<LiveReloadState>,
) -> Result<Json<ClientsResponse>, ServerError> {
    let connections = state.hub.client_count().await?;
    Ok(Json(ClientsResponse { connections }))
}
