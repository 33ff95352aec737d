use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

use crate::models::identity::Identity;
use crate::realtime::events::ServerEvent;

/// Handed to the websocket task on join: drain `events` into the socket.
pub struct Registration {
    pub conn_id: Uuid,
    pub events: mpsc::UnboundedReceiver<ServerEvent>,
}

struct Connection {
    conn_id: Uuid,
    tx: mpsc::UnboundedSender<ServerEvent>,
}

/// Maps logical identities to their live connection, independent of the
/// transport reconnecting. Delivery is best-effort: an identity with no live
/// connection simply misses the event and reconciles over REST.
pub struct Gateway {
    connections: DashMap<Identity, Connection>,
}

impl Gateway {
    pub fn new() -> Self {
        Self {
            connections: DashMap::new(),
        }
    }

    /// Registers a connection for the identity, replacing any prior one so a
    /// reconnect never produces duplicate deliveries.
    pub fn join(&self, identity: Identity) -> Registration {
        let (tx, events) = mpsc::unbounded_channel();
        let conn_id = Uuid::new_v4();

        self.connections
            .insert(identity, Connection { conn_id, tx });

        Registration { conn_id, events }
    }

    /// Removes the registration only if it still belongs to `conn_id`; a
    /// stale disconnect must not evict a newer connection for the same
    /// identity.
    pub fn leave(&self, identity: Identity, conn_id: Uuid) -> bool {
        self.connections
            .remove_if(&identity, |_, connection| connection.conn_id == conn_id)
            .is_some()
    }

    pub fn is_connected(&self, identity: &Identity) -> bool {
        self.connections.contains_key(identity)
    }

    pub fn emit_to_identity(&self, identity: Identity, event: ServerEvent) {
        let Some(connection) = self.connections.get(&identity) else {
            debug!(role = identity.role.as_str(), id = %identity.id, "no live connection; event dropped");
            return;
        };

        // A closed channel means the socket task is gone; the disconnect
        // handler will clean up the registration.
        let _ = connection.tx.send(event);
    }

    pub fn emit_to_set<I>(&self, identities: I, event: &ServerEvent)
    where
        I: IntoIterator<Item = Identity>,
    {
        for identity in identities {
            self.emit_to_identity(identity, event.clone());
        }
    }
}

impl Default for Gateway {
    fn default() -> Self {
        Self::new()
    }
}
