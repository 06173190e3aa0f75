use std::collections::HashMap;

use bytes::Bytes;
use parking_lot::RwLock;

use crate::client::{ClientId, StreamClient};

/// Immediate fan-out of each encoded frame to every registered client.
/// Registration and dispatch run concurrently; a failing client is swept
/// out without delaying delivery to the rest.
pub struct Broadcaster {
    name: &'static str,
    clients: RwLock<HashMap<ClientId, StreamClient>>,
}

impl Broadcaster {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            clients: RwLock::new(HashMap::new()),
        }
    }

    pub fn register(&self, client: StreamClient) {
        tracing::info!(
            "{} client connected: {} ({})",
            self.name,
            client.addr,
            client.id
        );
        let mut clients = self.clients.write();
        clients.insert(client.id, client);
        tracing::debug!("{} clients registered: {}", self.name, clients.len());
    }

    /// Enqueues the frame for every client. Clients whose queue is full or
    /// whose connection is gone are removed after the fan-out completes.
    pub fn dispatch(&self, frame: &Bytes) {
        let failed: Vec<ClientId> = {
            let clients = self.clients.read();
            if clients.is_empty() {
                return;
            }
            clients
                .values()
                .filter(|client| !client.send(frame.clone()))
                .map(|client| client.id)
                .collect()
        };

        for id in failed {
            self.remove(id);
        }
    }

    /// Drops one client; its writer task ends when the queue sender goes.
    pub fn remove(&self, id: ClientId) {
        if let Some(client) = self.clients.write().remove(&id) {
            tracing::info!(
                "{} client disconnected: {} ({})",
                self.name,
                client.addr,
                client.id
            );
        }
    }

    /// Shutdown path: closes every connection by dropping its sender.
    pub fn unregister_all(&self) {
        let mut clients = self.clients.write();
        let dropped = clients.len();
        clients.clear();
        if dropped > 0 {
            tracing::info!("{} server closed {} client(s)", self.name, dropped);
        }
    }

    pub fn count(&self) -> usize {
        self.clients.read().len()
    }
}
