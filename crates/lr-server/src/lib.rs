//! Live reload notifier and development server for lr.
//!
//! The notifier watches a directory tree and pushes a reload signal to every
//! open browser page whenever something changes. It can be attached to any
//! axum router with [`attach`], or run as a standalone static file server
//! with [`run_server`].
//!
//! # Quick Start
//!
//! ```ignore
//! use lr_server::{Mode, attach};
//!
//! let router = axum::Router::new().route("/", get(index));
//! let (router, live_reload) = attach(router, "public", Mode::from_env())?;
//!
//! axum::serve(listener, router).await?;
//! live_reload.shutdown().await;
//! ```
//!
//! # Architecture
//!
//! ```text
//! Browser ──HTTP──► axum server (lr-server)
//!                        │
//!                        ├─► GET /__livereload (server-sent events)
//!                        │       │
//!                        │       └─► hub task ◄── pump ◄── ChangeWatcher (lr-watch)
//!                        │
//!                        └─► Static files (tower-http, script injected into HTML)
//! ```

mod app;
mod error;
mod live_reload;
mod middleware;
mod mode;
mod state;

use std::path::PathBuf;
use std::time::Duration;

pub use error::ServerError;
pub use live_reload::{
    BroadcastReport, ClientRegistry, ConnectionId, DEFAULT_ENDPOINT, HubHandle, LiveReload,
    LiveReloadOptions, ReloadContext, ReloadMessage, Subscription, attach, attach_with,
};
pub use mode::Mode;

/// Server configuration.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// Host address to bind to.
    pub host: String,
    /// Port to listen on.
    pub port: u16,
    /// Directory to serve and watch.
    pub root: PathBuf,
    /// Glob patterns that trigger a reload. Empty matches everything.
    pub patterns: Vec<String>,
    /// Debounce window in milliseconds.
    pub debounce_ms: u64,
    /// Push endpoint path.
    pub endpoint: String,
    /// Runtime mode.
    pub mode: Mode,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_owned(),
            port: 7878,
            root: PathBuf::from("."),
            patterns: Vec::new(),
            debounce_ms: 100,
            endpoint: DEFAULT_ENDPOINT.to_owned(),
            mode: Mode::Development,
        }
    }
}

impl ServerConfig {
    fn live_reload_options(&self) -> LiveReloadOptions {
        LiveReloadOptions::new(&self.root, self.mode)
            .with_endpoint(self.endpoint.clone())
            .with_patterns(self.patterns.clone())
            .with_debounce(Duration::from_millis(self.debounce_ms))
    }
}

/// Run the development server until Ctrl-C.
///
/// # Errors
///
/// Returns an error if the watcher cannot start or the listener cannot bind.
pub async fn run_server(config: ServerConfig) -> Result<(), ServerError> {
    let (app, live_reload) = app::create_router(&config.root, config.live_reload_options())?;

    let listener = tokio::net::TcpListener::bind((config.host.as_str(), config.port)).await?;
    tracing::info!(
        address = %listener.local_addr()?,
        root = %config.root.display(),
        mode = %config.mode,
        "Starting server"
    );

    // Open event streams never finish on their own, so the hub has to close
    // them before graceful shutdown can complete.
    let hub = live_reload.hub().cloned();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            if let Some(hub) = hub {
                hub.shutdown();
            }
        })
        .await?;

    live_reload.shutdown().await;
    Ok(())
}

/// Wait for shutdown signal (Ctrl-C).
async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install Ctrl+C handler");
    tracing::info!("Shutdown signal received, stopping server...");
}

/// Create server configuration from lr config.
///
/// # Arguments
///
/// * `config` - lr configuration
#[must_use]
pub fn server_config_from_lr_config(config: &lr_config::Config) -> ServerConfig {
    ServerConfig {
        host: config.server.host.clone(),
        port: config.server.port,
        root: config.watch_resolved.root.clone(),
        patterns: config.watch_resolved.patterns.clone(),
        debounce_ms: config.watch_resolved.debounce_ms,
        endpoint: config.live_reload.endpoint.clone(),
        mode: Mode::parse(&config.live_reload.environment),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_server_config_from_lr_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lr.toml");
        std::fs::write(
            &path,
            r#"
[server]
port = 9000

[watch]
root = "site"
patterns = ["**/*.html"]
debounce_ms = 250

[live_reload]
environment = "production"
endpoint = "/events"
"#,
        )
        .unwrap();

        let lr_config = lr_config::Config::load(Some(&path), None).unwrap();
        let config = server_config_from_lr_config(&lr_config);

        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, 9000);
        assert_eq!(config.root, dir.path().join("site"));
        assert_eq!(config.patterns, vec!["**/*.html".to_owned()]);
        assert_eq!(config.debounce_ms, 250);
        assert_eq!(config.endpoint, "/events");
        assert_eq!(config.mode, Mode::Production);
    }

    #[test]
    fn test_default_config_is_development() {
        let config = ServerConfig::default();

        assert_eq!(config.mode, Mode::Development);
        assert_eq!(config.endpoint, DEFAULT_ENDPOINT);
        assert_eq!(config.port, 7878);
    }
}
