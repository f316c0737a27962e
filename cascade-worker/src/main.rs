//! Cascade Worker Daemon
//!
//! Runs N worker loops that compete for task claims on the shared store,
//! plus the recovery sweeper that re-enqueues tasks whose claims expired.
//! Workers are stateless: everything they need is re-derivable from the
//! store, so any number of daemon replicas can run side by side.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::watch;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cascade_client::HttpControlClient;
use cascade_engine::{recovery, EngineConfig, Worker};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cascade_worker=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("starting cascade worker daemon");

    let config = EngineConfig::from_env();
    config.validate().map_err(anyhow::Error::msg)?;

    tracing::info!(store_url = %config.store_url, "connecting to store");
    let store = cascade_store::connect(&config.store_url)
        .await
        .context("failed to connect to store")?;

    let control = Arc::new(
        HttpControlClient::new(config.request_timeout)
            .context("failed to build control client")?,
    );

    tracing::info!(
        worker_id = %config.worker_id,
        worker_count = config.worker_count,
        poll_interval = ?config.poll_interval,
        claim_lease = ?config.claim_lease,
        "worker daemon configured"
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut handles = Vec::new();

    for index in 0..config.worker_count {
        let worker_id = if config.worker_count == 1 {
            config.worker_id.clone()
        } else {
            format!("{}-{}", config.worker_id, index)
        };
        let worker = Worker::new(worker_id, store.clone(), control.clone(), config.clone());
        let shutdown = shutdown_rx.clone();
        handles.push(tokio::spawn(async move { worker.run(shutdown).await }));
    }

    // sweep at the lease interval: anything older has expired for sure
    handles.push(tokio::spawn(recovery::run_sweeper(
        store.clone(),
        config.claim_lease,
        shutdown_rx.clone(),
    )));

    tokio::signal::ctrl_c()
        .await
        .context("failed to install shutdown handler")?;
    tracing::info!("shutdown signal received, stopping workers");

    shutdown_tx
        .send(true)
        .context("failed to signal shutdown")?;

    for handle in handles {
        if let Err(e) = handle.await {
            tracing::warn!(error = %e, "worker task panicked during shutdown");
        }
    }

    tracing::info!("worker daemon stopped");
    Ok(())
}
