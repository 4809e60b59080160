//! wbdiff server entry point.
//!
//! This is the main binary that boots the MCP server on stdio transport.
//! Logging goes to stderr to avoid interfering with the JSON-RPC protocol on stdout.

use std::sync::Arc;

use anyhow::{Context, Result};
use rmcp::service::serve_server;
use rmcp::transport::io::stdio;
use tracing_subscriber::EnvFilter;
use wbdiff_client::{ArchiveClient, ArchiveConfig, JobSettings, Orchestrator};
use wbdiff_core::{AppConfig, CacheDb, DigestCache, JobRegistry};

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
    tracing::info!(db_path = %config.db_path.display(), "Starting wbdiff server on stdio transport");

    let db = CacheDb::open(&config.db_path).await.context("opening result store")?;
    let purged = db.purge_expired_captures().await?;
    if purged > 0 {
        tracing::info!(purged, "removed expired result records");
    }

    let archive = ArchiveClient::new(ArchiveConfig::from(&config))?;
    let orchestrator = Arc::new(Orchestrator::new(
        Arc::new(archive),
        db.clone(),
        DigestCache::new(),
        JobRegistry::new(),
        JobSettings::from(&config),
    ));

    let handler = handler::WbdiffServer::new(orchestrator.clone(), &config);
    let transport = stdio();
    let server = serve_server(handler, transport).await?;

    server.waiting().await?;

    orchestrator.drain().await;
    db.close().await?;

    Ok(())
}
