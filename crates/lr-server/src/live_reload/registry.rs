//! Open push connections and best-effort fan-out.

use std::collections::HashMap;
use std::fmt;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use uuid::Uuid;

use super::message::ReloadMessage;

/// Opaque handle identifying one open connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Outcome of one [`ClientRegistry::broadcast`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Connections the message was written to.
    pub delivered: usize,
    /// Connections whose write failed; they are no longer registered.
    pub dropped: Vec<ConnectionId>,
}

/// Set of currently open connections.
///
/// Each connection is the sending half of a bounded channel drained by the
/// HTTP response stream. Writes never wait: a closed channel (client gone)
/// or a full one (client not reading) both count as a failed write, and the
/// connection is removed in the same pass.
///
/// Not synchronized. The hub task owns the only instance.
#[derive(Default)]
pub struct ClientRegistry {
    connections: HashMap<ConnectionId, mpsc::Sender<ReloadMessage>>,
}

impl ClientRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an open connection.
    pub fn subscribe(&mut self, sender: mpsc::Sender<ReloadMessage>) -> ConnectionId {
        let id = ConnectionId::new();
        self.connections.insert(id, sender);
        id
    }

    /// Remove a connection.
    ///
    /// Returns `false` if it was already gone; removing twice is harmless.
    pub fn unsubscribe(&mut self, id: ConnectionId) -> bool {
        self.connections.remove(&id).is_some()
    }

    /// Write `message` to every open connection, dropping those that fail.
    pub fn broadcast(&mut self, message: &ReloadMessage) -> BroadcastReport {
        let mut report = BroadcastReport::default();

        self.connections
            .retain(|id, sender| match sender.try_send(message.clone()) {
                Ok(()) => {
                    report.delivered += 1;
                    true
                }
                Err(TrySendError::Closed(_)) => {
                    tracing::debug!(%id, "Dropping closed live reload connection");
                    report.dropped.push(*id);
                    false
                }
                Err(TrySendError::Full(_)) => {
                    tracing::warn!(%id, "Dropping live reload connection that stopped reading");
                    report.dropped.push(*id);
                    false
                }
            });

        report
    }

    /// Whether `id` is still registered.
    #[must_use]
    pub fn contains(&self, id: ConnectionId) -> bool {
        self.connections.contains_key(&id)
    }

    /// Number of open connections.
    #[must_use]
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    /// Whether no connection is open.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Drop every connection, ending their response streams.
    pub fn clear(&mut self) {
        self.connections.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn connect(registry: &mut ClientRegistry) -> (ConnectionId, mpsc::Receiver<ReloadMessage>) {
        let (tx, rx) = mpsc::channel(4);
        (registry.subscribe(tx), rx)
    }

    #[test]
    fn test_broadcast_reaches_every_open_connection_once() {
        let mut registry = ClientRegistry::new();
        let mut receivers: Vec<_> = (0..5).map(|_| connect(&mut registry).1).collect();

        let report = registry.broadcast(&ReloadMessage::reload());

        assert_eq!(report.delivered, 5);
        assert!(report.dropped.is_empty());
        for rx in &mut receivers {
            assert_eq!(rx.try_recv().unwrap(), ReloadMessage::reload());
            assert!(rx.try_recv().is_err());
        }
    }

    #[test]
    fn test_unsubscribed_connection_receives_nothing() {
        let mut registry = ClientRegistry::new();
        let (kept, mut kept_rx) = connect(&mut registry);
        let (removed, mut removed_rx) = connect(&mut registry);

        assert!(registry.unsubscribe(removed));
        let report = registry.broadcast(&ReloadMessage::reload());

        assert_eq!(report.delivered, 1);
        assert!(registry.contains(kept));
        assert!(kept_rx.try_recv().is_ok());
        // Sender was dropped with the registry entry
        assert!(matches!(
            removed_rx.try_recv(),
            Err(mpsc::error::TryRecvError::Disconnected)
        ));
    }

    #[test]
    fn test_unsubscribe_is_idempotent() {
        let mut registry = ClientRegistry::new();
        let (id, _rx) = connect(&mut registry);
        let (other, _other_rx) = connect(&mut registry);

        assert!(registry.unsubscribe(id));
        assert!(!registry.unsubscribe(id));

        assert_eq!(registry.len(), 1);
        assert!(registry.contains(other));
    }

    #[test]
    fn test_closed_connection_removed_before_next_broadcast() {
        let mut registry = ClientRegistry::new();
        let (gone, gone_rx) = connect(&mut registry);
        let (_alive, mut alive_rx) = connect(&mut registry);
        drop(gone_rx);

        let first = registry.broadcast(&ReloadMessage::reload());
        assert_eq!(first.delivered, 1);
        assert_eq!(first.dropped, vec![gone]);
        assert!(!registry.contains(gone));

        let second = registry.broadcast(&ReloadMessage::reload());
        assert_eq!(second.delivered, 1);
        assert!(second.dropped.is_empty());
        assert_eq!(alive_rx.try_recv().unwrap(), ReloadMessage::reload());
        assert_eq!(alive_rx.try_recv().unwrap(), ReloadMessage::reload());
    }

    #[test]
    fn test_full_connection_is_dropped() {
        let mut registry = ClientRegistry::new();
        let (tx, mut rx) = mpsc::channel(1);
        let slow = registry.subscribe(tx);

        assert_eq!(registry.broadcast(&ReloadMessage::reload()).delivered, 1);
        let report = registry.broadcast(&ReloadMessage::reload());

        assert_eq!(report.delivered, 0);
        assert_eq!(report.dropped, vec![slow]);
        assert!(registry.is_empty());
        // The message that fit is still readable, then the stream ends
        assert!(rx.try_recv().is_ok());
        assert!(matches!(
            rx.try_recv(),
            Err(mpsc::error::TryRecvError::Disconnected)
        ));
    }

    #[test]
    fn test_broadcast_with_no_connections() {
        let mut registry = ClientRegistry::new();

        let report = registry.broadcast(&ReloadMessage::reload());

        assert_eq!(report, BroadcastReport::default());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_connection_ids_are_unique() {
        let mut registry = ClientRegistry::new();
        let (a, _a_rx) = connect(&mut registry);
        let (b, _b_rx) = connect(&mut registry);

        assert_ne!(a, b);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_clear_closes_all_streams() {
        let mut registry = ClientRegistry::new();
        let (_id, mut rx) = connect(&mut registry);

        registry.clear();

        assert!(registry.is_empty());
        assert!(matches!(
            rx.try_recv(),
            Err(mpsc::error::TryRecvError::Disconnected)
        ));
    }
}
