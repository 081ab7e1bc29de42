//! Shared state for the live reload handlers.

use std::sync::Arc;

use crate::live_reload::{HubHandle, ReloadContext};

/// State shared by the push endpoint handlers.
#[derive(Clone)]
pub(crate) struct LiveReloadState {
    /// Handle to the task owning the open connections.
    pub(crate) hub: HubHandle,
    /// Startup context (endpoint, client script).
    pub(crate) context: Arc<ReloadContext>,
}
