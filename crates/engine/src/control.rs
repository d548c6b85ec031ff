//! Out-of-band control messages from application clients.
//!
//! The wire value is untyped: the strings `"SKIP_WAITING"` and
//! `"CLEAR_CACHE"` are recognized, anything else is ignored.
//! `SKIP_WAITING` activates an installed controller on the spot.

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use waypost_core::{CacheDb, CacheVersion, Error};

use crate::clients::{ClientId, ClientRegistry, EngineMessage};
use crate::lifecycle::LifecycleController;

/// A recognized control message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlMessage {
    SkipWaiting,
    ClearCache,
}

impl ControlMessage {
    /// Recognize a wire value. Returns None for anything unrecognized.
    pub fn parse(value: &Value) -> Option<Self> {
        match value.as_str()? {
            "SKIP_WAITING" => Some(ControlMessage::SkipWaiting),
            "CLEAR_CACHE" => Some(ControlMessage::ClearCache),
            _ => None,
        }
    }
}

/// What handling a message did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ControlOutcome {
    Ignored,
    SkippedWaiting { activated: bool },
    CacheCleared { deleted: Vec<CacheVersion>, notified: usize },
}

/// Receives client messages and acts on the lifecycle and the store.
pub struct ControlChannel {
    db: CacheDb,
    lifecycle: Arc<LifecycleController>,
    clients: Arc<ClientRegistry>,
}

impl ControlChannel {
    pub fn new(db: CacheDb, lifecycle: Arc<LifecycleController>, clients: Arc<ClientRegistry>) -> Self {
        Self { db, lifecycle, clients }
    }

    /// Handle one message from `source`.
    ///
    /// # Errors
    ///
    /// Returns a storage error if `CLEAR_CACHE` could not delete the store;
    /// no acknowledgement is broadcast in that case. Returns
    /// `Error::Lifecycle` if a `SKIP_WAITING` activation lost a race with
    /// another activation.
    pub async fn on_message(&self, message: &Value, source: ClientId) -> Result<ControlOutcome, Error> {
        let Some(message) = ControlMessage::parse(message) else {
            tracing::debug!(client = %source, "ignoring unrecognized control message");
            return Ok(ControlOutcome::Ignored);
        };

        match message {
            ControlMessage::SkipWaiting => {
                tracing::info!(client = %source, "SKIP_WAITING received");
                self.lifecycle.skip_waiting().await;
                if !self.lifecycle.ready_to_activate().await {
                    return Ok(ControlOutcome::SkippedWaiting { activated: false });
                }
                self.lifecycle.activate().await?;
                Ok(ControlOutcome::SkippedWaiting { activated: true })
            }
            ControlMessage::ClearCache => {
                tracing::info!(client = %source, "CLEAR_CACHE received");
                let deleted = self.db.delete_versions_where(|_| true).await?;
                let notified = self.clients.broadcast(EngineMessage::CacheCleared).await;
                tracing::info!(deleted = ?deleted, notified, "cache cleared");
                Ok(ControlOutcome::CacheCleared { deleted, notified })
            }
        }
    }
}
