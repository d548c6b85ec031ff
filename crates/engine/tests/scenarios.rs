//! End-to-end request scenarios against an in-memory cache.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::StatusCode;
use reqwest::header::HeaderMap;
use serde_json::json;
use waypost_core::{AppConfig, CacheDb, CacheVersion, CachedResponse, Error, RequestIdentity};
use waypost_engine::{
    Body, Disposition, Engine, EngineMessage, EngineRequest, EngineResponse, FetchMode, ResponseSource, Transport,
};

/// Serves canned bodies by URL; can be switched offline.
#[derive(Default)]
struct ScriptedTransport {
    routes: Mutex<HashMap<String, &'static str>>,
    offline: AtomicBool,
    calls: Mutex<Vec<(String, FetchMode)>>,
}

impl ScriptedTransport {
    fn with(routes: &[(&str, &'static str)]) -> Arc<Self> {
        let transport = Self::default();
        for (url, body) in routes {
            transport.routes.lock().unwrap().insert(url.to_string(), body);
        }
        Arc::new(transport)
    }

    fn go_offline(&self) {
        self.offline.store(true, Ordering::SeqCst);
    }

    fn calls(&self) -> Vec<(String, FetchMode)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn fetch(&self, request: &EngineRequest, mode: FetchMode) -> Result<EngineResponse, Error> {
        self.calls.lock().unwrap().push((request.url.to_string(), mode));
        if self.offline.load(Ordering::SeqCst) {
            return Err(Error::Network("network unreachable".into()));
        }
        let (status, body) = match self.routes.lock().unwrap().get(request.url.as_str()) {
            Some(body) => (StatusCode::OK, *body),
            None => (StatusCode::NOT_FOUND, "not found"),
        };
        Ok(EngineResponse {
            status,
            headers: HeaderMap::new(),
            body: Body::Full(Bytes::from_static(body.as_bytes())),
            source: ResponseSource::Network,
        })
    }
}

fn config(version: &str) -> AppConfig {
    AppConfig {
        cache_version: version.into(),
        origin: "https://app.example.com".into(),
        precache: vec!["/".into(), "/manifest.json".into()],
        ..Default::default()
    }
}

async fn start(db: CacheDb, transport: Arc<ScriptedTransport>, version: &str) -> Engine {
    let engine = Engine::new(&config(version), db, transport).unwrap();
    engine.install().await.unwrap();
    engine.activate().await.unwrap();
    engine
}

fn get(engine: &Engine, target: &str) -> EngineRequest {
    EngineRequest::get(target, engine.origin()).unwrap()
}

async fn text(response: EngineResponse) -> String {
    String::from_utf8(response.body.into_bytes().await.unwrap().to_vec()).unwrap()
}

#[tokio::test]
async fn static_asset_is_fetched_once_then_served_from_cache() {
    let transport = ScriptedTransport::with(&[("https://app.example.com/icon.png", "png")]);
    let db = CacheDb::open_in_memory().await.unwrap();
    let engine = start(db, transport.clone(), "app-v2").await;
    let before = transport.calls().len();

    let (disposition, first) = engine.fetch(&get(&engine, "/icon.png")).await.unwrap();
    assert_eq!(disposition, Some(Disposition::CacheFirst));
    assert_eq!(first.source, ResponseSource::Network);
    assert_eq!(text(first).await, "png");

    let (_, second) = engine.fetch(&get(&engine, "/icon.png")).await.unwrap();
    assert_eq!(second.source, ResponseSource::Cache);
    assert_eq!(text(second).await, "png");
    assert_eq!(transport.calls().len(), before + 1);
}

#[tokio::test]
async fn precached_manifest_needs_no_network() {
    let transport = ScriptedTransport::with(&[
        ("https://app.example.com/", "<html>"),
        ("https://app.example.com/manifest.json", "{}"),
    ]);
    let db = CacheDb::open_in_memory().await.unwrap();
    let engine = start(db, transport.clone(), "app-v2").await;
    let before = transport.calls().len();

    let (_, response) = engine.fetch(&get(&engine, "/manifest.json")).await.unwrap();
    assert_eq!(response.source, ResponseSource::Cache);
    assert_eq!(transport.calls().len(), before);
}

#[tokio::test]
async fn cross_origin_pdf_is_bypassed_and_never_stored() {
    let transport = ScriptedTransport::with(&[("https://storage.example.com/file.pdf", "%PDF")]);
    let db = CacheDb::open_in_memory().await.unwrap();
    let engine = start(db.clone(), transport.clone(), "app-v2").await;
    let entries_before = db.count_entries().await.unwrap();

    let (disposition, response) = engine.fetch(&get(&engine, "https://storage.example.com/file.pdf")).await.unwrap();

    assert_eq!(disposition, Some(Disposition::Bypass));
    assert_eq!(text(response).await, "%PDF");
    assert_eq!(transport.calls().last().unwrap().1, FetchMode::Direct);
    assert_eq!(db.count_entries().await.unwrap(), entries_before);
}

#[tokio::test]
async fn network_first_page_survives_going_offline() {
    let transport = ScriptedTransport::with(&[("https://app.example.com/app", "live app")]);
    let db = CacheDb::open_in_memory().await.unwrap();
    let engine = start(db, transport.clone(), "app-v2").await;

    let (disposition, live) = engine.fetch(&get(&engine, "/app")).await.unwrap();
    assert_eq!(disposition, Some(Disposition::NetworkFirst));
    assert_eq!(live.source, ResponseSource::Network);
    assert_eq!(text(live).await, "live app");

    transport.go_offline();

    let (_, cached) = engine.fetch(&get(&engine, "/app")).await.unwrap();
    assert_eq!(cached.source, ResponseSource::Cache);
    assert_eq!(text(cached).await, "live app");

    let (_, missing) = engine.fetch(&get(&engine, "/pricing")).await.unwrap();
    assert_eq!(missing.status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(missing.source, ResponseSource::Synthesized);
}

#[tokio::test]
async fn activation_evicts_every_stale_version() {
    let db = CacheDb::open_in_memory().await.unwrap();
    let stale = RequestIdentity::new("GET", "https://app.example.com/icon.png");
    for name in ["app-v1", "app-v0"] {
        let store = db.open_store(&CacheVersion::new(name).unwrap()).await.unwrap();
        store
            .try_put(&stale, CachedResponse { status: 200, headers: vec![], body: b"old".to_vec() })
            .await
            .unwrap();
    }

    let transport = ScriptedTransport::with(&[("https://app.example.com/icon.png", "new")]);
    let engine = start(db.clone(), transport, "app-v2").await;

    let versions = db.list_versions().await.unwrap();
    assert_eq!(versions, vec![CacheVersion::new("app-v2").unwrap()]);
    let v1 = CacheVersion::new("app-v1").unwrap();
    assert!(db.get_entry(&v1, &stale).await.unwrap().is_none());

    let (_, response) = engine.fetch(&get(&engine, "/icon.png")).await.unwrap();
    assert_eq!(text(response).await, "new");
}

#[tokio::test]
async fn clear_cache_empties_storage_and_notifies_clients() {
    let transport = ScriptedTransport::with(&[("https://app.example.com/icon.png", "png")]);
    let db = CacheDb::open_in_memory().await.unwrap();
    let engine = start(db.clone(), transport.clone(), "app-v2").await;
    let mut first = engine.connect().await;
    let mut second = engine.connect().await;
    engine.fetch(&get(&engine, "/icon.png")).await.unwrap();

    engine.on_message(&json!("CLEAR_CACHE"), first.id()).await.unwrap();

    assert!(db.list_versions().await.unwrap().is_empty());
    assert_eq!(db.count_entries().await.unwrap(), 0);
    assert_eq!(first.recv().await, Some(EngineMessage::CacheCleared));
    assert_eq!(second.recv().await, Some(EngineMessage::CacheCleared));

    let (_, refetched) = engine.fetch(&get(&engine, "/icon.png")).await.unwrap();
    assert_eq!(refetched.source, ResponseSource::Network);
    assert_eq!(db.count_entries().await.unwrap(), 1);
}

#[tokio::test]
async fn engine_passes_requests_through_before_activation() {
    let transport = ScriptedTransport::with(&[]);
    let db = CacheDb::open_in_memory().await.unwrap();
    let engine = Engine::new(&config("app-v2"), db, transport.clone()).unwrap();

    let (disposition, response) = engine.fetch(&get(&engine, "/icon.png")).await.unwrap();
    assert_eq!(disposition, None);
    assert_eq!(response.status, StatusCode::NOT_FOUND);
    assert_eq!(transport.calls(), vec![("https://app.example.com/icon.png".to_string(), FetchMode::Standard)]);
}
