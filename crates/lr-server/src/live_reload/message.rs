//! Payload pushed to connected clients.

use lr_watch::ChangeBatch;
use serde::Serialize;

/// Text message sent over the push channel.
///
/// Serializes as `{"msg":"reload"}`, plus a `paths` list when the reload
/// was caused by known file changes. Clients look for the `reload`
/// substring and ignore the rest.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ReloadMessage {
    msg: &'static str,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    paths: Vec<String>,
}

impl ReloadMessage {
    /// A bare reload signal.
    #[must_use]
    pub fn reload() -> Self {
        Self {
            msg: "reload",
            paths: Vec::new(),
        }
    }

    /// Reload signal listing the changed paths of a batch.
    #[must_use]
    pub fn for_batch(batch: &ChangeBatch) -> Self {
        let paths = batch
            .events()
            .iter()
            .map(|e| e.path.to_string_lossy().replace('\\', "/"))
            .collect();
        Self {
            msg: "reload",
            paths,
        }
    }

    /// Changed paths, relative to the watched root.
    #[must_use]
    pub fn paths(&self) -> &[String] {
        &self.paths
    }
}
