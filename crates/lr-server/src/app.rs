//! Router construction.
//!
//! Serves the watched directory as static files and attaches live reload.

use std::path::Path;

use axum::Router;
use tower::ServiceBuilder;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::error::ServerError;
use crate::live_reload::{self, LiveReload, LiveReloadOptions};
use crate::middleware::headers;

/// Static file router for `root`, with `index.html` served for directories.
pub(crate) fn static_router(root: &Path) -> Router {
    Router::new().fallback_service(ServeDir::new(root).append_index_html_on_directories(true))
}

/// Create the development server router.
///
/// # Arguments
///
/// * `root` - Directory to serve
/// * `options` - Live reload options (the watched root is normally `root` too)
pub(crate) fn create_router(
    root: &Path,
    options: LiveReloadOptions,
) -> Result<(Router, LiveReload), ServerError> {
    let (router, live_reload) = live_reload::attach_with(static_router(root), options)?;

    let router = router.layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(headers::content_type_options_layer())
            .layer(headers::no_store_layer()),
    );

    Ok((router, live_reload))
}
