//! Directory change watching for lr.
//!
//! [`ChangeWatcher`] watches a directory tree recursively through `notify`,
//! folds the burst of raw events an editor save produces into one change per
//! path, and delivers everything that settled together as a [`ChangeBatch`].
//!
//! # Example
//!
//! ```ignore
//! use std::time::Duration;
//! use lr_watch::ChangeWatcher;
//!
//! let (mut changes, _handle) = ChangeWatcher::new("public")
//!     .with_patterns(&["**/*.html", "**/*.css"])
//!     .with_debounce(Duration::from_millis(100))
//!     .watch()?;
//!
//! while let Some(batch) = changes.next().await {
//!     let batch = batch?;
//!     tracing::info!(changes = batch.len(), "Files changed");
//! }
//! ```
//!
//! # Termination
//!
//! A watch ends when its [`WatchHandle`] is dropped, when the consumer drops
//! the [`ChangeStream`], or when the backend fails. Failures are delivered
//! once as an `Err` item; there is no automatic retry.

mod debouncer;
mod error;
mod event;
mod watcher;

pub use error::WatchError;
pub use event::{ChangeBatch, ChangeEvent, ChangeKind, ChangeStream, WatchHandle};
pub use watcher::ChangeWatcher;
