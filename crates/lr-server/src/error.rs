//! Server error types.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

/// Error raised while setting up or running live reload.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// The change watcher could not be started.
    #[error("{0}")]
    Watch(#[from] lr_watch::WatchError),
    /// Binding or serving failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// The live reload hub has shut down.
    #[error("Live reload hub is not running")]
    HubClosed,
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = match self {
            Self::HubClosed => StatusCode::SERVICE_UNAVAILABLE,
            Self::Watch(_) | Self::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        tracing::warn!(error = %self, %status, "Request failed");
        (status, self.to_string()).into_response()
    }
}
