//! Live reload: watch a directory, push a reload signal to every open page.
//!
//! ```text
//! ChangeWatcher ──batches──► pump ──broadcast──► hub (ClientRegistry)
//!                                                    │
//!                                    SSE stream ◄────┴────► SSE stream
//!                                        │                      │
//!                                     browser                browser
//! ```
//!
//! [`attach`] wires all of it onto an existing router and hands back a
//! [`LiveReload`] that owns the background tasks.

mod context;
mod hub;
mod message;
mod registry;
mod sse;

use std::ops::ControlFlow;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::Router;
use axum::routing::get;
use lr_watch::{ChangeBatch, ChangeStream, ChangeWatcher, WatchError, WatchHandle};
use tokio::task::JoinHandle;

pub use context::ReloadContext;
pub use hub::{HubHandle, Subscription};
pub use message::ReloadMessage;
pub use registry::{BroadcastReport, ClientRegistry, ConnectionId};

use crate::error::ServerError;
use crate::middleware::inject::inject_script;
use crate::mode::Mode;
use crate::state::LiveReloadState;

/// Default push endpoint path.
pub const DEFAULT_ENDPOINT: &str = "/__livereload";

/// Default debounce window for change batching.
const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(100);

/// Options for [`attach_with`].
#[derive(Clone, Debug)]
pub struct LiveReloadOptions {
    root: PathBuf,
    mode: Mode,
    endpoint: String,
    patterns: Vec<String>,
    debounce: Duration,
}

impl LiveReloadOptions {
    /// Watch `root` in `mode`, with the default endpoint and debounce.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>, mode: Mode) -> Self {
        Self {
            root: root.into(),
            mode,
            endpoint: DEFAULT_ENDPOINT.to_owned(),
            patterns: Vec::new(),
            debounce: DEFAULT_DEBOUNCE,
        }
    }

    /// Serve the push channel at `endpoint` instead of `/__livereload`.
    #[must_use]
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// Only reload for changes matching these globs (relative to the root).
    #[must_use]
    pub fn with_patterns(mut self, patterns: Vec<String>) -> Self {
        self.patterns = patterns;
        self
    }

    /// Set the debounce window.
    #[must_use]
    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }
}

/// Running live reload machinery.
///
/// Constructed by [`attach`]; call [`shutdown`](Self::shutdown) at process
/// exit. Dropping it without shutting down stops the watcher but leaves
/// open streams to the router.
pub struct LiveReload {
    context: Arc<ReloadContext>,
    running: Option<Running>,
}

struct Running {
    hub: HubHandle,
    hub_task: JoinHandle<()>,
    pump_task: JoinHandle<()>,
    watch: WatchHandle,
}

impl LiveReload {
    /// Startup context (mode, endpoint, script).
    #[must_use]
    pub fn context(&self) -> &ReloadContext {
        &self.context
    }

    /// Whether the watcher and push endpoint are running.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.running.is_some()
    }

    /// Hub handle, when active.
    #[must_use]
    pub fn hub(&self) -> Option<&HubHandle> {
        self.running.as_ref().map(|r| &r.hub)
    }

    /// Stop the watcher, close every open connection and wait for the
    /// background tasks to finish.
    pub async fn shutdown(self) {
        let Some(running) = self.running else {
            return;
        };

        running.watch.stop();
        running.hub.shutdown();
        let _ = running.pump_task.await;
        let _ = running.hub_task.await;
        tracing::debug!("Live reload stopped");
    }
}

/// Add live reload for `root` to `router`.
///
/// See [`attach_with`].
///
/// # Errors
///
/// Returns [`ServerError::Watch`] if the watcher cannot start.
pub fn attach(
    router: Router,
    root: impl Into<PathBuf>,
    mode: Mode,
) -> Result<(Router, LiveReload), ServerError> {
    attach_with(router, LiveReloadOptions::new(root, mode))
}

/// Add live reload to `router`.
///
/// In production the router is returned untouched: no endpoint, no
/// injection, no watcher. In development this starts the change watcher,
/// the hub and the pump between them, registers the push endpoint (plus
/// `/client.js` and `/clients` below it) and injects the client script into
/// HTML responses of every route already on `router`.
///
/// Must be called from within a Tokio runtime. Panics if `router` already
/// has a route at the endpoint.
///
/// # Errors
///
/// Returns [`ServerError::Watch`] if the watcher cannot start.
pub fn attach_with(
    router: Router,
    options: LiveReloadOptions,
) -> Result<(Router, LiveReload), ServerError> {
    let context = Arc::new(ReloadContext::new(options.mode, options.endpoint));

    if !context.enabled() {
        tracing::info!(mode = %context.mode(), "Live reload disabled");
        return Ok((
            router,
            LiveReload {
                context,
                running: None,
            },
        ));
    }

    let (changes, watch) = ChangeWatcher::new(&options.root)
        .with_patterns(&options.patterns)
        .with_debounce(options.debounce)
        .watch()?;

    let (hub, hub_task) = hub::spawn_hub();
    let pump_task = tokio::spawn(pump(changes, hub.clone()));

    let state = LiveReloadState {
        hub: hub.clone(),
        context: Arc::clone(&context),
    };
    let routes = Router::new()
        .route(context.endpoint(), get(sse::sse_handler))
        .route(&context.client_js_path(), get(sse::client_script))
        .route(&format!("{}/clients", context.endpoint()), get(sse::clients))
        .with_state(state);

    let router = router
        .layer(axum::middleware::from_fn_with_state(
            Arc::clone(&context),
            inject_script,
        ))
        .merge(routes);

    tracing::info!(
        root = %options.root.display(),
        endpoint = context.endpoint(),
        "Live reload enabled"
    );

    Ok((
        router,
        LiveReload {
            context,
            running: Some(Running {
                hub,
                hub_task,
                pump_task,
                watch,
            }),
        },
    ))
}

/// Turn every change batch into one broadcast until the watcher ends.
async fn pump(mut changes: ChangeStream, hub: HubHandle) {
    while let Some(item) = changes.next().await {
        if handle_change(item, &hub).await.is_break() {
            break;
        }
    }
    tracing::debug!("Live reload pump stopped");
}

/// Broadcast one reload for a batch. Breaks on watcher failure or hub shutdown.
async fn handle_change(item: Result<ChangeBatch, WatchError>, hub: &HubHandle) -> ControlFlow<()> {
    let batch = match item {
        Ok(batch) => batch,
        Err(e) => {
            tracing::error!(error = %e, "Change watcher terminated, live reload stopped");
            return ControlFlow::Break(());
        }
    };

    let start = Instant::now();
    match hub.broadcast(ReloadMessage::for_batch(&batch)).await {
        Ok(report) => {
            tracing::info!(
                changes = batch.len(),
                delivered = report.delivered,
                dropped = report.dropped.len(),
                elapsed_ms = start.elapsed().as_secs_f64() * 1000.0,
                "Live reload broadcast"
            );
            ControlFlow::Continue(())
        }
        Err(e) => {
            tracing::debug!(error = %e, "Skipping broadcast");
            ControlFlow::Break(())
        }
    }
}
