//! Fetch/cache orchestration per disposition.
//!
//! - BYPASS: direct fetch, one plain retry, never touches the store.
//! - NETWORK_FIRST: network, store 200 GETs, fall back to the store, then 503.
//! - CACHE_FIRST: store, then network; store 200 GETs; network errors propagate.

use std::sync::Arc;

use reqwest::{Method, StatusCode};
use waypost_core::{CacheStore, Error};

use crate::classify::Disposition;
use crate::fetch::{FetchMode, Transport};
use crate::request::{EngineRequest, EngineResponse};

/// Runs the strategy a disposition selects against one cache version.
pub struct StrategyExecutor {
    transport: Arc<dyn Transport>,
    store: CacheStore,
    vary_headers: Vec<String>,
}

/// Only full 200 responses to GET become cache entries.
pub fn is_cacheable(request: &EngineRequest, response: &EngineResponse) -> bool {
    request.method == Method::GET && response.status == StatusCode::OK
}

impl StrategyExecutor {
    pub fn new(transport: Arc<dyn Transport>, store: CacheStore, vary_headers: Vec<String>) -> Self {
        Self { transport, store, vary_headers }
    }

    pub fn store(&self) -> &CacheStore {
        &self.store
    }

    /// Serve a request according to its disposition.
    pub async fn execute(&self, request: &EngineRequest, disposition: Disposition) -> Result<EngineResponse, Error> {
        match disposition {
            Disposition::Bypass => self.bypass(request).await,
            Disposition::NetworkFirst => self.network_first(request).await,
            Disposition::CacheFirst => self.cache_first(request).await,
        }
    }

    async fn bypass(&self, request: &EngineRequest) -> Result<EngineResponse, Error> {
        match self.transport.fetch(request, FetchMode::Direct).await {
            Ok(response) => Ok(response),
            Err(e) => {
                tracing::warn!(url = %request.url, error = %e, "direct fetch failed, retrying with plain fetch");
                self.transport.fetch(request, FetchMode::Standard).await
            }
        }
    }

    async fn network_first(&self, request: &EngineRequest) -> Result<EngineResponse, Error> {
        let identity = request.identity(&self.vary_headers);
        match self.transport.fetch(request, FetchMode::Standard).await {
            Ok(response) => {
                if !is_cacheable(request, &response) {
                    return Ok(response);
                }
                let response = response.buffered().await?;
                if let Some(snapshot) = response.to_cached() {
                    self.store.put(&identity, snapshot).await;
                }
                Ok(response)
            }
            Err(e) if e.is_network() => {
                tracing::debug!(url = %request.url, error = %e, "network failed, falling back to cache");
                match self.store.get(&identity).await {
                    Some(entry) => Ok(EngineResponse::from_cached(entry.response)),
                    None => {
                        tracing::info!(url = %request.url, "offline with no cached copy, serving 503");
                        Ok(EngineResponse::service_unavailable())
                    }
                }
            }
            Err(e) => Err(e),
        }
    }

    async fn cache_first(&self, request: &EngineRequest) -> Result<EngineResponse, Error> {
        let identity = request.identity(&self.vary_headers);
        if let Some(entry) = self.store.get(&identity).await {
            tracing::debug!(url = %request.url, "cache hit");
            return Ok(EngineResponse::from_cached(entry.response));
        }

        tracing::debug!(url = %request.url, "cache miss");
        let response = self.transport.fetch(request, FetchMode::Standard).await?;
        if !is_cacheable(request, &response) {
            return Ok(response);
        }
        let response = response.buffered().await?;
        if let Some(snapshot) = response.to_cached() {
            self.store.put(&identity, snapshot).await;
        }
        Ok(response)
    }
}
