//! Registry of live connections and their delivery channels.

use std::collections::HashMap;

use tokio::sync::{Mutex, mpsc};

use super::canvas::{ClientIdentity, ConnectionId, Pixel};

/// Sending half of a connection's private delivery channel.
pub type DeliverySender = mpsc::Sender<Pixel>;
/// Receiving half handed to the connection's delivery forwarder.
pub type DeliveryReceiver = mpsc::Receiver<Pixel>;

struct Registration {
    identity: ClientIdentity,
    tx: DeliverySender,
}

/// Set of live connections guarded by a single lock.
///
/// The lock is only held to insert, remove or copy entries, never across I/O.
pub struct ConnectionHub {
    connections: Mutex<HashMap<ConnectionId, Registration>>,
    delivery_buffer: usize,
}

impl ConnectionHub {
    /// Create an empty hub whose delivery channels hold up to `delivery_buffer` pixels.
    pub fn new(delivery_buffer: usize) -> Self {
        Self {
            connections: Mutex::new(HashMap::new()),
            delivery_buffer: delivery_buffer.max(1),
        }
    }

    /// Register a connection and bind a fresh delivery channel to it.
    ///
    /// Re-registering an id replaces its previous channel, which closes the old receiver.
    pub async fn register(&self, id: ConnectionId, identity: ClientIdentity) -> DeliveryReceiver {
        let (tx, rx) = mpsc::channel(self.delivery_buffer);
        let mut guard = self.connections.lock().await;
        guard.insert(id, Registration { identity, tx });
        rx
    }

    /// Remove a connection and drop its delivery sender. Returns whether it was registered.
    pub async fn unregister(&self, id: ConnectionId) -> bool {
        let removed = {
            let mut guard = self.connections.lock().await;
            guard.remove(&id)
        };
        removed.is_some()
    }

    /// Copy of the current registrations so fan-out can run without holding the lock.
    pub async fn snapshot(&self) -> Vec<(ConnectionId, DeliverySender)> {
        let guard = self.connections.lock().await;
        guard.iter().map(|(id, reg)| (*id, reg.tx.clone())).collect()
    }

    /// Identity a live connection was registered with.
    pub async fn identity_of(&self, id: ConnectionId) -> Option<ClientIdentity> {
        let guard = self.connections.lock().await;
        guard.get(&id).map(|reg| reg.identity.clone())
    }

    /// Number of registered connections.
    pub async fn len(&self) -> usize {
        self.connections.lock().await.len()
    }
}
