//! casa-sw server entry point.
//!
//! Boots the worker and exposes its events as MCP tools on stdio transport.
//! Logging goes to stderr to avoid interfering with the JSON-RPC protocol on stdout.

use std::sync::Arc;

use anyhow::Result;
use casa_sw_client::ServiceWorkerState;
use casa_sw_core::{AppConfig, CacheDb};
use rmcp::service::serve_server;
use rmcp::transport::io::stdio;
use tracing_subscriber::EnvFilter;

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

    let config = AppConfig::load()?;
    tracing::info!(
        version = %config.version,
        origin = %config.origin,
        db = %config.db_path.display(),
        "starting casa-sw on stdio transport"
    );

    let db = CacheDb::open(&config.db_path).await?;
    let state = ServiceWorkerState::from_config(&config, db)?;

    let handler = handler::CasaSwServer::new(Arc::new(state));
    let server = serve_server(handler, stdio()).await?;

    server.waiting().await?;

    Ok(())
}
