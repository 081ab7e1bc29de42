//! Recursive directory watcher.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use glob::Pattern;
use notify::event::ModifyKind;
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::{mpsc, oneshot};
use tokio::time::MissedTickBehavior;

use crate::debouncer::EventDebouncer;
use crate::event::{ChangeBatch, ChangeKind, ChangeStream, WatchHandle};
use crate::WatchError;

/// Default debounce window.
const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(100);

/// How often the drain task checks for changes past their deadline.
const DRAIN_INTERVAL: Duration = Duration::from_millis(50);

/// How often the drain task confirms the root still exists.
///
/// Platform watchers do not reliably report the removal or rename of the
/// watched directory itself.
const ROOT_CHECK_INTERVAL: Duration = Duration::from_secs(1);

/// Buffered batches before the drain task waits on the consumer.
const BATCH_CHANNEL_CAPACITY: usize = 16;

/// Watches a directory tree and reports debounced change batches.
///
/// The watcher itself is just configuration: every call to
/// [`watch`](Self::watch) starts an independent watch with its own stream,
/// so a terminated watch can be restarted by calling it again.
#[derive(Clone, Debug)]
pub struct ChangeWatcher {
    root: PathBuf,
    patterns: Vec<Pattern>,
    debounce: Duration,
}

impl ChangeWatcher {
    /// Create a watcher for `root` that reports every change under it.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            patterns: Vec::new(),
            debounce: DEFAULT_DEBOUNCE,
        }
    }

    /// Only report paths (relative to the root) matching one of `patterns`.
    ///
    /// Invalid globs are logged and skipped. An empty list matches everything.
    #[must_use]
    pub fn with_patterns<S: AsRef<str>>(mut self, patterns: &[S]) -> Self {
        self.patterns = patterns
            .iter()
            .filter_map(|p| {
                Pattern::new(p.as_ref())
                    .inspect_err(|e| {
                        tracing::warn!(pattern = p.as_ref(), error = %e, "Ignoring invalid watch pattern");
                    })
                    .ok()
            })
            .collect();
        self
    }

    /// Set the debounce window.
    #[must_use]
    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    /// Root directory being watched.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Start watching.
    ///
    /// Must be called from within a Tokio runtime: the debounce drain runs
    /// as a spawned task.
    ///
    /// # Errors
    ///
    /// Returns [`WatchError::RootInaccessible`] if the root is missing, not a
    /// directory, or unreadable, and [`WatchError::Notify`] if the platform
    /// watcher cannot be created.
    pub fn watch(&self) -> Result<(ChangeStream, WatchHandle), WatchError> {
        let root = resolve_root(&self.root)?;

        let (batch_tx, batch_rx) = mpsc::channel(BATCH_CHANNEL_CAPACITY);
        let (error_tx, error_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let debouncer = Arc::new(EventDebouncer::new(self.debounce));

        let watcher_root = root.clone();
        let patterns = self.patterns.clone();
        let watcher_debouncer = Arc::clone(&debouncer);
        let root_touched = Arc::new(AtomicBool::new(false));
        let watcher_root_touched = Arc::clone(&root_touched);

        let mut watcher =
            notify::recommended_watcher(move |res: notify::Result<notify::Event>| match res {
                Ok(event) => {
                    if record_event(&event, &watcher_root, &patterns, &watcher_debouncer) {
                        watcher_root_touched.store(true, Ordering::Relaxed);
                    }
                }
                Err(e) => {
                    let _ = error_tx.send(e);
                }
            })?;

        watcher.watch(&root, RecursiveMode::Recursive)?;
        tracing::debug!(root = %root.display(), debounce = ?self.debounce, "Watching directory");

        tokio::spawn(drain_loop(
            root,
            debouncer,
            root_touched,
            watcher,
            batch_tx,
            error_rx,
            shutdown_rx,
        ));

        Ok((ChangeStream::new(batch_rx), WatchHandle::new(shutdown_tx)))
    }
}

/// Canonicalize the root and check that it is a readable directory.
fn resolve_root(root: &Path) -> Result<PathBuf, WatchError> {
    let canonical = root
        .canonicalize()
        .map_err(|e| WatchError::root_inaccessible(root, e))?;

    if !canonical.is_dir() {
        return Err(WatchError::root_inaccessible(
            root,
            std::io::Error::from(std::io::ErrorKind::NotADirectory),
        ));
    }

    std::fs::read_dir(&canonical).map_err(|e| WatchError::root_inaccessible(root, e))?;

    Ok(canonical)
}

/// Forward debounced batches until shutdown, consumer drop, or watcher failure.
///
/// Owns the notify watcher so that it lives exactly as long as this task.
async fn drain_loop(
    root: PathBuf,
    debouncer: Arc<EventDebouncer>,
    root_touched: Arc<AtomicBool>,
    watcher: RecommendedWatcher,
    batch_tx: mpsc::Sender<Result<ChangeBatch, WatchError>>,
    mut error_rx: mpsc::UnboundedReceiver<notify::Error>,
    mut shutdown_rx: oneshot::Receiver<()>,
) {
    let _watcher = watcher;
    let mut interval = tokio::time::interval(DRAIN_INTERVAL);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut root_check = tokio::time::interval(ROOT_CHECK_INTERVAL);
    root_check.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = &mut shutdown_rx => {
                tracing::debug!(root = %root.display(), "Watch stopped");
                break;
            }
            () = batch_tx.closed() => break,
            Some(err) = error_rx.recv() => {
                tracing::error!(root = %root.display(), error = %err, "File watcher failed");
                let _ = batch_tx.send(Err(WatchError::Notify(err))).await;
                break;
            }
            _ = root_check.tick() => {
                if let Err(err) = resolve_root(&root) {
                    report_root_lost(&root, err, &batch_tx).await;
                    break;
                }
            }
            _ = interval.tick() => {
                let batch = ChangeBatch::new(debouncer.drain_ready());
                let removals = batch.as_ref().is_some_and(ChangeBatch::has_removals);

                if (root_touched.swap(false, Ordering::Relaxed) || removals)
                    && let Err(err) = resolve_root(&root)
                {
                    report_root_lost(&root, err, &batch_tx).await;
                    break;
                }

                let Some(batch) = batch else {
                    continue;
                };

                tracing::debug!(
                    changes = batch.len(),
                    pending = debouncer.pending_len(),
                    "Change batch ready"
                );
                if batch_tx.send(Ok(batch)).await.is_err() {
                    break;
                }
            }
        }
    }
}

async fn report_root_lost(
    root: &Path,
    err: WatchError,
    batch_tx: &mpsc::Sender<Result<ChangeBatch, WatchError>>,
) {
    tracing::error!(root = %root.display(), error = %err, "Watch root disappeared");
    let _ = batch_tx.send(Err(err)).await;
}

/// Record a raw notify event into the debouncer.
///
/// Returns `true` when the event removed or renamed the root itself.
fn record_event(
    event: &notify::Event,
    root: &Path,
    patterns: &[Pattern],
    debouncer: &EventDebouncer,
) -> bool {
    let kind = match event.kind {
        EventKind::Create(_) => ChangeKind::Created,
        EventKind::Modify(_) => ChangeKind::Modified,
        EventKind::Remove(_) => ChangeKind::Removed,
        _ => return false,
    };

    let root_touched = matches!(
        event.kind,
        EventKind::Remove(_) | EventKind::Modify(ModifyKind::Name(_))
    ) && event.paths.iter().any(|p| p == root);

    for path in &event.paths {
        let Some(relative) = relative_match(path, root, patterns) else {
            continue;
        };
        tracing::trace!(path = %relative.display(), ?kind, "Recorded filesystem event");
        debouncer.record(relative, kind);
    }

    root_touched
}

/// Path relative to `root` if it lies below the root and matches the patterns.
fn relative_match(path: &Path, root: &Path, patterns: &[Pattern]) -> Option<PathBuf> {
    let relative = path.strip_prefix(root).ok()?;
    if relative.as_os_str().is_empty() {
        return None;
    }

    (patterns.is_empty() || patterns.iter().any(|p| p.matches_path(relative)))
        .then(|| relative.to_path_buf())
}
