//! Connected application clients.
//!
//! Each client gets its own inbox so a broadcast reaches every connected
//! client exactly once.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use tokio::sync::{RwLock, mpsc};
use waypost_core::CacheVersion;

/// Identifier of a connected client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ClientId(u64);

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "client-{}", self.0)
    }
}

/// Messages the engine sends to clients.
///
/// Serializes as `{ "type": "CACHE_CLEARED" }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EngineMessage {
    CacheCleared,
}

/// The receiving end a client holds.
#[derive(Debug)]
pub struct ClientHandle {
    id: ClientId,
    inbox: mpsc::UnboundedReceiver<EngineMessage>,
}

impl ClientHandle {
    pub fn id(&self) -> ClientId {
        self.id
    }

    /// Wait for the next message. None once the client is disconnected.
    pub async fn recv(&mut self) -> Option<EngineMessage> {
        self.inbox.recv().await
    }

    /// Take every message already delivered, without waiting.
    pub fn drain(&mut self) -> Vec<EngineMessage> {
        let mut messages = Vec::new();
        while let Ok(message) = self.inbox.try_recv() {
            messages.push(message);
        }
        messages
    }
}

struct ClientSlot {
    sender: mpsc::UnboundedSender<EngineMessage>,
    controller: Option<CacheVersion>,
}

/// Registry of connected clients.
#[derive(Default)]
pub struct ClientRegistry {
    next_id: AtomicU64,
    clients: RwLock<HashMap<ClientId, ClientSlot>>,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new client. It starts uncontrolled.
    pub async fn connect(&self) -> ClientHandle {
        let id = ClientId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let (sender, inbox) = mpsc::unbounded_channel();
        self.clients
            .write()
            .await
            .insert(id, ClientSlot { sender, controller: None });
        tracing::debug!(client = %id, "client connected");
        ClientHandle { id, inbox }
    }

    pub async fn disconnect(&self, id: ClientId) -> bool {
        self.clients.write().await.remove(&id).is_some()
    }

    pub async fn len(&self) -> usize {
        self.clients.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.clients.read().await.is_empty()
    }

    /// Make `version` the controller of every connected client.
    ///
    /// Returns the number of clients claimed.
    pub async fn claim(&self, version: &CacheVersion) -> usize {
        let mut clients = self.clients.write().await;
        for slot in clients.values_mut() {
            slot.controller = Some(version.clone());
        }
        clients.len()
    }

    /// The version controlling a client, if any.
    pub async fn controller_of(&self, id: ClientId) -> Option<CacheVersion> {
        self.clients.read().await.get(&id).and_then(|slot| slot.controller.clone())
    }

    /// Deliver one copy of `message` to every connected client.
    ///
    /// Clients whose handle was dropped are removed. Returns the number
    /// of clients the message reached.
    pub async fn broadcast(&self, message: EngineMessage) -> usize {
        let mut clients = self.clients.write().await;
        clients.retain(|id, slot| {
            let delivered = slot.sender.send(message.clone()).is_ok();
            if !delivered {
                tracing::debug!(client = %id, "dropping closed client");
            }
            delivered
        });
        clients.len()
    }
}
