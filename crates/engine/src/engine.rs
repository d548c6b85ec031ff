//! The engine context: one object holding route tables, the current
//! version's store, the transport and the client registry, passed to
//! every handler.

use std::sync::Arc;

use serde_json::Value;
use url::Url;
use waypost_core::{AppConfig, CacheDb, CacheStore, CacheVersion, Error};

use crate::classify::{Classifier, Disposition, InterceptFilter, Interception, PassThroughReason};
use crate::clients::{ClientHandle, ClientId, ClientRegistry};
use crate::control::{ControlChannel, ControlOutcome};
use crate::fetch::{FetchConfig, FetchMode, HttpTransport, Transport};
use crate::lifecycle::{ActivateReport, InstallReport, LifecycleController, Phase};
use crate::request::{EngineRequest, EngineResponse};
use crate::strategy::StrategyExecutor;

/// Result of offering a request to the engine.
#[derive(Debug)]
pub enum Handled {
    /// The engine produced the response.
    Response(Disposition, EngineResponse),
    /// The engine declined; the request should go to the network unmodified.
    PassThrough(PassThroughReason),
}

/// A request-interception and caching engine for one cache version.
pub struct Engine {
    classifier: Classifier,
    strategy: StrategyExecutor,
    lifecycle: Arc<LifecycleController>,
    control: ControlChannel,
    clients: Arc<ClientRegistry>,
    transport: Arc<dyn Transport>,
    db: CacheDb,
}

impl Engine {
    /// Build an engine over an opened database and a transport.
    pub fn new(config: &AppConfig, db: CacheDb, transport: Arc<dyn Transport>) -> Result<Self, Error> {
        let version = CacheVersion::new(config.cache_version.clone())?;
        let classifier = Classifier::from_config(config)?;
        let store = CacheStore::new(db.clone(), version).with_max_entry_bytes(config.max_entry_bytes);
        let clients = Arc::new(ClientRegistry::new());

        let lifecycle = Arc::new(LifecycleController::new(
            store.clone(),
            transport.clone(),
            clients.clone(),
            classifier.origin().clone(),
            config.precache.clone(),
        ));
        let control = ControlChannel::new(db.clone(), lifecycle.clone(), clients.clone());
        let strategy = StrategyExecutor::new(transport.clone(), store, config.vary_headers.clone());

        Ok(Self { classifier, strategy, lifecycle, control, clients, transport, db })
    }

    /// Open the configured database and build an HTTP-backed engine.
    pub async fn from_config(config: &AppConfig) -> Result<Self, Error> {
        let db = CacheDb::open(&config.db_path).await?;
        let transport = Arc::new(HttpTransport::new(&FetchConfig::from(config))?);
        Self::new(config, db, transport)
    }

    /// Replace the pass-through predicate.
    pub fn with_filter(mut self, filter: Arc<dyn InterceptFilter>) -> Self {
        self.classifier = self.classifier.with_filter(filter);
        self
    }

    pub fn version(&self) -> &CacheVersion {
        self.lifecycle.version()
    }

    pub fn origin(&self) -> &Url {
        self.classifier.origin()
    }

    pub fn classifier(&self) -> &Classifier {
        &self.classifier
    }

    pub fn lifecycle(&self) -> &LifecycleController {
        &self.lifecycle
    }

    pub fn db(&self) -> &CacheDb {
        &self.db
    }

    pub async fn phase(&self) -> Phase {
        self.lifecycle.phase().await
    }

    /// Runtime install event.
    pub async fn install(&self) -> Result<InstallReport, Error> {
        self.lifecycle.install().await
    }

    /// Runtime activate event.
    pub async fn activate(&self) -> Result<ActivateReport, Error> {
        self.lifecycle.activate().await
    }

    pub async fn connect(&self) -> ClientHandle {
        self.clients.connect().await
    }

    pub async fn client_count(&self) -> usize {
        self.clients.len().await
    }

    pub async fn disconnect(&self, id: ClientId) -> bool {
        self.clients.disconnect(id).await
    }

    /// Deliver a control message from a client.
    pub async fn on_message(&self, message: &Value, source: ClientId) -> Result<ControlOutcome, Error> {
        self.control.on_message(message, source).await
    }

    /// Offer a request to the engine.
    ///
    /// Only network failures on the CACHE_FIRST miss path and the BYPASS
    /// path come back as errors. Any other internal failure fails open:
    /// the request is handed back as a pass-through.
    pub async fn handle(&self, request: &EngineRequest) -> Result<Handled, Error> {
        if self.lifecycle.phase().await != Phase::Active {
            return Ok(Handled::PassThrough(PassThroughReason::NotActive));
        }

        let disposition = match self.classifier.intercept(request) {
            Interception::PassThrough(reason) => {
                tracing::debug!(url = %request.url, ?reason, "not intercepting");
                return Ok(Handled::PassThrough(reason));
            }
            Interception::Intercept(disposition) => disposition,
        };
        tracing::debug!(method = %request.method, url = %request.url, %disposition, "intercepting");

        match self.strategy.execute(request, disposition).await {
            Ok(response) => Ok(Handled::Response(disposition, response)),
            Err(e) if e.is_network() => Err(e),
            Err(e) => {
                tracing::warn!(url = %request.url, %disposition, error = %e, "engine failed, passing request through");
                Ok(Handled::PassThrough(PassThroughReason::InternalError))
            }
        }
    }

    /// Serve a request end to end: through the engine when it intercepts,
    /// otherwise with a plain, unmodified fetch.
    pub async fn fetch(&self, request: &EngineRequest) -> Result<(Option<Disposition>, EngineResponse), Error> {
        match self.handle(request).await? {
            Handled::Response(disposition, response) => Ok((Some(disposition), response)),
            Handled::PassThrough(_) => Ok((None, self.transport.fetch(request, FetchMode::Standard).await?)),
        }
    }
}
