//! Watch error types.

use std::path::PathBuf;

/// Error that terminates a watch.
#[derive(Debug, thiserror::Error)]
pub enum WatchError {
    /// The watched root is missing, unreadable, or not a directory.
    #[error("Watch root {} is not accessible: {source}", path.display())]
    RootInaccessible {
        /// Root directory that was requested.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// The notify backend reported an error.
    #[error("File watcher error: {0}")]
    Notify(#[from] notify::Error),
}

impl WatchError {
    pub(crate) fn root_inaccessible(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::RootInaccessible {
            path: path.into(),
            source,
        }
    }
}
