//! Change notification types.
//!
//! A [`ChangeWatcher`](crate::ChangeWatcher) delivers [`ChangeBatch`]es through a
//! [`ChangeStream`] and is kept alive by a [`WatchHandle`].

use std::path::PathBuf;

use tokio::sync::{mpsc, oneshot};

use crate::WatchError;

/// Kind of filesystem change.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChangeKind {
    /// Path was created.
    Created,
    /// Path content or metadata changed.
    Modified,
    /// Path was removed.
    Removed,
}

/// One coalesced change to a single path.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChangeEvent {
    /// Path relative to the watched root (e.g. "index.html", "css/site.css").
    pub path: PathBuf,
    /// Kind of change.
    pub kind: ChangeKind,
}

/// Every change released by one debouncer drain.
///
/// A batch is never empty. Consumers that only care that *something*
/// changed should treat one batch as one notification.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChangeBatch {
    events: Vec<ChangeEvent>,
}

impl ChangeBatch {
    /// Create a batch, returning `None` for an empty event list.
    #[must_use]
    pub fn new(events: Vec<ChangeEvent>) -> Option<Self> {
        (!events.is_empty()).then_some(Self { events })
    }

    /// Changes in this batch, sorted by path.
    #[must_use]
    pub fn events(&self) -> &[ChangeEvent] {
        &self.events
    }

    /// Number of changed paths.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Always `false`; provided for API symmetry with [`len`](Self::len).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Whether any path in the batch was removed.
    #[must_use]
    pub fn has_removals(&self) -> bool {
        self.events.iter().any(|e| e.kind == ChangeKind::Removed)
    }
}

/// Asynchronous sequence of change batches.
///
/// Yields `Ok(batch)` for every batch until the watcher fails or is stopped.
/// A failure is yielded once as `Err`, after which the stream is finished
/// and [`next`](Self::next) returns `None` forever.
pub struct ChangeStream {
    rx: mpsc::Receiver<Result<ChangeBatch, WatchError>>,
    finished: bool,
}

impl ChangeStream {
    pub(crate) fn new(rx: mpsc::Receiver<Result<ChangeBatch, WatchError>>) -> Self {
        Self {
            rx,
            finished: false,
        }
    }

    /// Wait for the next batch.
    ///
    /// Returns `None` once the watcher has stopped.
    pub async fn next(&mut self) -> Option<Result<ChangeBatch, WatchError>> {
        if self.finished {
            return None;
        }
        let item = self.rx.recv().await;
        match &item {
            Some(Ok(_)) => {}
            Some(Err(_)) | None => {
                self.finished = true;
                self.rx.close();
            }
        }
        item
    }

    /// Whether the stream has ended.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.finished
    }
}

/// Keeps a watch running.
///
/// Dropping the handle (or calling [`stop`](Self::stop)) shuts down the
/// underlying notify watcher and drain task; the paired [`ChangeStream`]
/// then ends with `None`.
pub struct WatchHandle {
    shutdown: Option<oneshot::Sender<()>>,
}

impl WatchHandle {
    pub(crate) fn new(shutdown: oneshot::Sender<()>) -> Self {
        Self {
            shutdown: Some(shutdown),
        }
    }

    /// Stop watching immediately.
    pub fn stop(mut self) {
        self.shutdown.take();
    }
}
