//! waypost server entry point.
//!
//! Boots the engine for the configured cache version, runs install and
//! activate, then serves the engine tools over MCP stdio.
//! Logging goes to stderr to avoid interfering with the JSON-RPC protocol on stdout.

use std::sync::Arc;

use anyhow::{Context, Result};
use rmcp::service::serve_server;
use rmcp::transport::io::stdio;
use tracing_subscriber::EnvFilter;
use waypost_core::AppConfig;
use waypost_engine::Engine;

mod error;
mod handler;
mod tools;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .json()
        .init();

    let config = AppConfig::load().context("loading configuration")?;
    tracing::info!(version = %config.cache_version, origin = %config.origin, "starting waypost on stdio transport");

    let engine = Engine::from_config(&config).await.context("opening engine")?;
    let report = engine.install().await?;
    tracing::info!(cached = report.cached, failed = report.failed.len(), "install finished");

    let report = engine.activate().await?;
    tracing::info!(evicted = report.evicted.len(), claimed = report.claimed, "activated");

    let engine = Arc::new(engine);
    let client = engine.connect().await;
    let handler = handler::WaypostServer::new(engine, client);
    let server = serve_server(handler, stdio()).await?;

    server.waiting().await?;

    Ok(())
}
