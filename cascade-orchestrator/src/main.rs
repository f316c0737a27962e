//! Cascade Orchestrator
//!
//! The submission API process: connects to the store, exposes the workflow
//! API over HTTP, and shuts down gracefully on SIGINT. Task execution is the
//! worker daemon's job; this process never drives tasks.

pub mod api;

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cascade_engine::{Coordinator, EngineConfig};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cascade_orchestrator=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("starting cascade orchestrator");

    let config = EngineConfig::from_env();
    config.validate().map_err(anyhow::Error::msg)?;

    tracing::info!(store_url = %config.store_url, "connecting to store");
    let store = cascade_store::connect(&config.store_url)
        .await
        .context("failed to connect to store")?;

    let coordinator = Arc::new(Coordinator::new(store));
    let app = api::create_router(coordinator);

    let addr = config.bind_addr();
    tracing::info!(%addr, "listening");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    tracing::info!("orchestrator stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to install shutdown handler");
        return;
    }
    tracing::info!("shutdown signal received");
}
