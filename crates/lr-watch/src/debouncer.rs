//! Per-path event coalescing.
//!
//! Editors routinely emit several filesystem events for a single save
//! (truncate + write, or write temp file + rename). The debouncer folds
//! them into one pending change per path and releases it once the path
//! has been quiet for the debounce window.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use crate::event::{ChangeEvent, ChangeKind};

struct PendingChange {
    kind: ChangeKind,
    deadline: Instant,
}

/// Thread-safe change debouncer.
///
/// Written to from the notify callback thread, drained from the async
/// drain task.
pub(crate) struct EventDebouncer {
    pending: Mutex<HashMap<PathBuf, PendingChange>>,
    debounce_duration: Duration,
}

impl EventDebouncer {
    pub(crate) fn new(debounce_duration: Duration) -> Self {
        Self {
            pending: Mutex::new(HashMap::new()),
            debounce_duration,
        }
    }

    /// Record a raw change, folding it into any pending change for the same path.
    ///
    /// Every recorded change pushes the path's deadline out by the full window.
    pub(crate) fn record(&self, path: PathBuf, kind: ChangeKind) {
        use std::collections::hash_map::Entry;

        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        let deadline = Instant::now() + self.debounce_duration;

        match pending.entry(path) {
            Entry::Vacant(entry) => {
                entry.insert(PendingChange { kind, deadline });
            }
            Entry::Occupied(mut entry) => {
                if let Some(kind) = Self::coalesce(entry.get().kind, kind) {
                    *entry.get_mut() = PendingChange { kind, deadline };
                } else {
                    entry.remove();
                }
            }
        }
    }

    /// Fold two change kinds for the same path.
    ///
    /// Returns `None` when the pair cancels out (created then removed
    /// within one window).
    #[allow(clippy::match_same_arms)]
    fn coalesce(existing: ChangeKind, new: ChangeKind) -> Option<ChangeKind> {
        use ChangeKind::{Created, Modified, Removed};

        match (existing, new) {
            (Created, Created) => Some(Created),
            (Created, Modified) => Some(Created),
            (Created, Removed) => None,

            (Modified, Created) => Some(Created),
            (Modified, Modified) => Some(Modified),
            (Modified, Removed) => Some(Removed),

            // Replaced in place (editor rename-over-original)
            (Removed, Created) => Some(Modified),
            (Removed, Modified) => Some(Removed),
            (Removed, Removed) => Some(Removed),
        }
    }

    /// Remove and return every change whose deadline has passed, sorted by path.
    pub(crate) fn drain_ready(&self) -> Vec<ChangeEvent> {
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        let now = Instant::now();

        let mut ready: Vec<ChangeEvent> = pending
            .extract_if(|_, change| change.deadline <= now)
            .map(|(path, change)| ChangeEvent {
                path,
                kind: change.kind,
            })
            .collect();
        ready.sort_by(|a, b| a.path.cmp(&b.path));
        ready
    }

    /// Number of paths still waiting for their deadline.
    pub(crate) fn pending_len(&self) -> usize {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}
