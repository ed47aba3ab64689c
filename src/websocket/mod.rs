pub mod handlers;
pub mod message_types;

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::ws::Message;
use tokio::sync::mpsc::UnboundedSender;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Application close codes, from the RFC 6455 private-use range.
pub const CLOSE_AUTH_TIMEOUT: u16 = 4408;
pub const CLOSE_AUTH_FAILED: u16 = 4401;
pub const CLOSE_PROTOCOL_VIOLATION: u16 = 4403;

/// Identifies one physical socket. A reconnecting user gets a fresh id, which
/// is how the registry tells a stale teardown from a current one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        ConnectionId(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

struct ConnectionHandle {
    id: ConnectionId,
    sender: UnboundedSender<Message>,
}

/// Maps a user id to their single live connection. Registering again replaces
/// the entry without closing the old socket; deregistration is guarded by
/// connection id so an old socket's teardown can never evict its replacement.
#[derive(Clone, Default)]
pub struct ConnectionRegistry {
    inner: Arc<RwLock<HashMap<Uuid, ConnectionHandle>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(
        &self,
        user_id: Uuid,
        connection_id: ConnectionId,
        sender: UnboundedSender<Message>,
    ) {
        let mut connections = self.inner.write().await;
        let handle = ConnectionHandle {
            id: connection_id,
            sender,
        };
        if let Some(previous) = connections.insert(user_id, handle) {
            tracing::debug!(%user_id, old = ?previous.id, new = ?connection_id, "replaced live connection");
        } else {
            tracing::debug!(%user_id, id = ?connection_id, "registered connection");
        }
    }

    /// Remove the user's entry only if it still belongs to `connection_id`.
    /// Returns whether an entry was removed.
    pub async fn unregister_if_current(&self, user_id: Uuid, connection_id: ConnectionId) -> bool {
        let mut connections = self.inner.write().await;
        match connections.get(&user_id) {
            Some(current) if current.id == connection_id => {
                connections.remove(&user_id);
                tracing::debug!(%user_id, id = ?connection_id, "unregistered connection");
                true
            }
            _ => false,
        }
    }

    /// Queue a frame for the user's live connection. Returns false when the
    /// user has no connection or its queue is already closed.
    pub async fn send_to(&self, user_id: Uuid, message: Message) -> bool {
        let connections = self.inner.read().await;
        match connections.get(&user_id) {
            Some(handle) => handle.sender.send(message).is_ok(),
            None => false,
        }
    }

    pub async fn is_registered(&self, user_id: Uuid) -> bool {
        self.inner.read().await.contains_key(&user_id)
    }
}
