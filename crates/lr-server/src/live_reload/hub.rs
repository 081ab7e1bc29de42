//! Single task owning the client registry.
//!
//! HTTP handlers, the change pump and subscription guards all talk to the
//! registry through a [`HubHandle`]. Commands are applied one at a time on the
//! hub task, so the connection set has exactly one writer and needs no lock.

use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_stream::Stream;

use super::message::ReloadMessage;
use super::registry::{BroadcastReport, ClientRegistry, ConnectionId};
use crate::error::ServerError;

/// Messages buffered per connection before it counts as not reading.
const CONNECTION_BUFFER: usize = 16;

enum Command {
    Subscribe {
        sender: mpsc::Sender<ReloadMessage>,
        reply: oneshot::Sender<ConnectionId>,
    },
    Unsubscribe(ConnectionId),
    Broadcast {
        message: ReloadMessage,
        reply: oneshot::Sender<BroadcastReport>,
    },
    ClientCount {
        reply: oneshot::Sender<usize>,
    },
    Shutdown,
}

/// Cloneable handle to the hub task.
#[derive(Clone)]
pub struct HubHandle {
    commands: mpsc::UnboundedSender<Command>,
}

/// Start the hub task.
///
/// The task runs until [`HubHandle::shutdown`] is called or every handle
/// (including those held by live subscriptions) is dropped.
pub(crate) fn spawn_hub() -> (HubHandle, JoinHandle<()>) {
    let (commands, rx) = mpsc::unbounded_channel();
    let task = tokio::spawn(run_hub(rx));
    (HubHandle { commands }, task)
}

async fn run_hub(mut commands: mpsc::UnboundedReceiver<Command>) {
    let mut registry = ClientRegistry::new();

    while let Some(command) = commands.recv().await {
        match command {
            Command::Subscribe { sender, reply } => {
                let id = registry.subscribe(sender);
                tracing::debug!(%id, clients = registry.len(), "Live reload client connected");
                if reply.send(id).is_err() {
                    // Requester went away before getting its id
                    registry.unsubscribe(id);
                }
            }
            Command::Unsubscribe(id) => {
                if registry.unsubscribe(id) {
                    tracing::debug!(%id, clients = registry.len(), "Live reload client disconnected");
                }
            }
            Command::Broadcast { message, reply } => {
                let report = registry.broadcast(&message);
                let _ = reply.send(report);
            }
            Command::ClientCount { reply } => {
                let _ = reply.send(registry.len());
            }
            Command::Shutdown => break,
        }
    }

    tracing::debug!(clients = registry.len(), "Live reload hub stopped");
    registry.clear();
}

impl HubHandle {
    /// Open a new connection.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::HubClosed`] if the hub has shut down.
    pub async fn subscribe(&self) -> Result<Subscription, ServerError> {
        let (sender, messages) = mpsc::channel(CONNECTION_BUFFER);
        let (reply, id) = oneshot::channel();
        self.send(Command::Subscribe { sender, reply })?;
        let id = id.await.map_err(|_| ServerError::HubClosed)?;

        Ok(Subscription {
            id,
            messages,
            _guard: UnsubscribeOnDrop {
                id,
                commands: self.commands.clone(),
            },
        })
    }

    /// Remove a connection. Unknown or already removed ids are ignored.
    pub fn unsubscribe(&self, id: ConnectionId) {
        let _ = self.send(Command::Unsubscribe(id));
    }

    /// Write `message` to every open connection.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::HubClosed`] if the hub has shut down.
    pub async fn broadcast(&self, message: ReloadMessage) -> Result<BroadcastReport, ServerError> {
        let (reply, report) = oneshot::channel();
        self.send(Command::Broadcast { message, reply })?;
        report.await.map_err(|_| ServerError::HubClosed)
    }

    /// Number of open connections.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::HubClosed`] if the hub has shut down.
    pub async fn client_count(&self) -> Result<usize, ServerError> {
        let (reply, count) = oneshot::channel();
        self.send(Command::ClientCount { reply })?;
        count.await.map_err(|_| ServerError::HubClosed)
    }

    /// Stop the hub, closing every open connection.
    pub fn shutdown(&self) {
        let _ = self.send(Command::Shutdown);
    }

    fn send(&self, command: Command) -> Result<(), ServerError> {
        self.commands
            .send(command)
            .map_err(|_| ServerError::HubClosed)
    }
}

/// One open connection, as seen by the response that serves it.
///
/// Yields every message broadcast while it is registered. The stream ends
/// when the hub drops the connection (failed write or shutdown). Dropping
/// the subscription unregisters it.
pub struct Subscription {
    id: ConnectionId,
    messages: mpsc::Receiver<ReloadMessage>,
    _guard: UnsubscribeOnDrop,
}

impl Subscription {
    /// Connection id.
    #[must_use]
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Wait for the next message. Returns `None` once the connection is closed.
    pub async fn recv(&mut self) -> Option<ReloadMessage> {
        self.messages.recv().await
    }
}

impl Stream for Subscription {
    type Item = ReloadMessage;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().messages.poll_recv(cx)
    }
}

struct UnsubscribeOnDrop {
    id: ConnectionId,
    commands: mpsc::UnboundedSender<Command>,
}

impl Drop for UnsubscribeOnDrop {
    fn drop(&mut self) {
        let _ = self.commands.send(Command::Unsubscribe(self.id));
    }
}
