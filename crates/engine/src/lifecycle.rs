//! Engine lifecycle as an explicit state machine.
//!
//! ```text
//! Parsed --install--> Installing --> Installed --activate--> Activating --> Active
//! ```
//!
//! Install pre-warms the current version; activate evicts every other
//! version and claims connected clients. Active is terminal for an
//! instance: a newer deployment starts its own machine from Parsed.

use std::sync::Arc;

use futures_util::future::join_all;
use serde::Serialize;
use tokio::sync::RwLock;
use url::Url;
use waypost_core::{CacheDb, CacheStore, CacheVersion, Error};

use crate::clients::ClientRegistry;
use crate::fetch::{FetchMode, Transport, resolve};
use crate::request::EngineRequest;
use crate::strategy::is_cacheable;

/// Lifecycle phase of one engine instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Parsed,
    Installing,
    Installed,
    Activating,
    Active,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Parsed => "parsed",
            Phase::Installing => "installing",
            Phase::Installed => "installed",
            Phase::Activating => "activating",
            Phase::Active => "active",
        }
    }
}

#[derive(Debug)]
struct State {
    phase: Phase,
    skip_waiting: bool,
}

/// Outcome of the install event.
#[derive(Debug, Clone, Default, Serialize)]
pub struct InstallReport {
    /// Manifest entries fetched and stored.
    pub cached: usize,
    /// Manifest entries that could not be fetched or stored.
    pub failed: Vec<String>,
}

/// Outcome of the activate event.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ActivateReport {
    /// Stale versions removed.
    pub evicted: Vec<CacheVersion>,
    /// Clients now controlled by this instance.
    pub claimed: usize,
}

/// Owns install/activate for one cache version.
pub struct LifecycleController {
    db: CacheDb,
    store: CacheStore,
    transport: Arc<dyn Transport>,
    clients: Arc<ClientRegistry>,
    origin: Url,
    precache: Vec<String>,
    state: RwLock<State>,
}

impl LifecycleController {
    pub fn new(
        store: CacheStore, transport: Arc<dyn Transport>, clients: Arc<ClientRegistry>, origin: Url,
        precache: Vec<String>,
    ) -> Self {
        Self {
            db: store.db().clone(),
            store,
            transport,
            clients,
            origin,
            precache,
            state: RwLock::new(State { phase: Phase::Parsed, skip_waiting: false }),
        }
    }

    pub fn version(&self) -> &CacheVersion {
        self.store.version()
    }

    pub async fn phase(&self) -> Phase {
        self.state.read().await.phase
    }

    /// Installed and cleared to activate without waiting.
    pub async fn ready_to_activate(&self) -> bool {
        let state = self.state.read().await;
        state.phase == Phase::Installed && state.skip_waiting
    }

    /// Ask to activate as soon as installed, without waiting for old
    /// clients to go away. Safe to call in any phase.
    pub async fn skip_waiting(&self) {
        let mut state = self.state.write().await;
        if !state.skip_waiting {
            tracing::info!(version = %self.version(), phase = ?state.phase, "skip waiting requested");
        }
        state.skip_waiting = true;
    }

    async fn transition(&self, from: Phase, to: Phase) -> Result<(), Error> {
        let mut state = self.state.write().await;
        if state.phase != from {
            return Err(Error::Lifecycle(format!("cannot move to {to:?} from {:?}", state.phase)));
        }
        state.phase = to;
        Ok(())
    }

    /// Handle the install event.
    ///
    /// Pre-warm failures are reported, never fatal. Ends by requesting
    /// skip-waiting.
    ///
    /// # Errors
    ///
    /// Returns `Error::Lifecycle` if the instance was already installed.
    pub async fn install(&self) -> Result<InstallReport, Error> {
        self.transition(Phase::Parsed, Phase::Installing).await?;
        tracing::info!(version = %self.version(), "installing");

        if let Err(e) = self.db.open_store(self.version()).await {
            tracing::warn!(version = %self.version(), error = %e, "could not create cache version");
        }

        let results = join_all(self.precache.iter().map(|entry| self.prewarm(entry))).await;
        let mut report = InstallReport::default();
        for (entry, result) in self.precache.iter().zip(results) {
            match result {
                Ok(()) => report.cached += 1,
                Err(e) => {
                    tracing::warn!(entry = %entry, error = %e, "pre-cache failed");
                    report.failed.push(entry.clone());
                }
            }
        }

        self.transition(Phase::Installing, Phase::Installed).await?;
        tracing::info!(version = %self.version(), cached = report.cached, failed = report.failed.len(), "installed");
        self.skip_waiting().await;
        Ok(report)
    }

    async fn prewarm(&self, entry: &str) -> Result<(), Error> {
        let url = resolve(entry, &self.origin).map_err(|e| Error::InvalidUrl(e.to_string()))?;
        let request = EngineRequest::new(reqwest::Method::GET, url);
        let response = self.transport.fetch(&request, FetchMode::Standard).await?;
        if !is_cacheable(&request, &response) {
            return Err(Error::Network(format!("status {}", response.status.as_u16())));
        }
        let response = response.buffered().await?;
        let snapshot = response
            .to_cached()
            .ok_or_else(|| Error::InvalidInput("response body was not buffered".into()))?;
        self.store.try_put(&request.identity(&[]), snapshot).await
    }

    /// Handle the activate event.
    ///
    /// Removes every version other than the current one, then claims all
    /// connected clients. An eviction failure is logged and activation
    /// continues.
    ///
    /// # Errors
    ///
    /// Returns `Error::Lifecycle` unless the instance is installed.
    pub async fn activate(&self) -> Result<ActivateReport, Error> {
        self.transition(Phase::Installed, Phase::Activating).await?;
        tracing::info!(version = %self.version(), "activating");

        let current = self.version().clone();
        let evicted = match self.db.delete_versions_where(move |v| *v != current).await {
            Ok(evicted) => evicted,
            Err(e) => {
                tracing::warn!(version = %self.version(), error = %e, "stale version eviction failed");
                Vec::new()
            }
        };

        let claimed = self.clients.claim(self.version()).await;
        self.transition(Phase::Activating, Phase::Active).await?;
        tracing::info!(version = %self.version(), evicted = ?evicted, claimed, "active");
        Ok(ActivateReport { evicted, claimed })
    }
}
