//! Expired-claim recovery.
//!
//! A worker that dies mid-task leaves a claim behind. The sweeper
//! periodically resets tasks with expired claims back to `ready` and
//! re-enqueues them, which is the only recovery path the engine needs:
//! worker-local state is re-derivable from the store.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use cascade_store::Store;

/// Runs the recovery sweep every `interval` until shutdown is signalled.
pub async fn run_sweeper(
    store: Arc<dyn Store>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    tracing::info!(interval_secs = interval.as_secs(), "recovery sweeper started");

    loop {
        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = shutdown.changed() => {}
        }
        if *shutdown.borrow() {
            break;
        }

        match store.recover_expired().await {
            Ok(recovered) if !recovered.is_empty() => {
                tracing::warn!(count = recovered.len(), "recovered tasks with expired claims");
            }
            Ok(_) => {}
            Err(e) => {
                tracing::error!(error = %e, "recovery sweep failed");
            }
        }
    }

    tracing::info!("recovery sweeper stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use cascade_core::domain::{NodeKey, Task, TaskStatus};
    use cascade_store::MemoryStore;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_sweeper_recovers_and_stops_on_shutdown() {
        let store = Arc::new(MemoryStore::new());
        let task = Task::new_source(Uuid::new_v4(), NodeKey::new("a", "run"), &[]);
        store.put_task(&task).await.unwrap();
        store.enqueue_ready(task.id).await.unwrap();
        store
            .claim_one("dead-worker", Duration::from_millis(1))
            .await
            .unwrap()
            .unwrap();

        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(run_sweeper(store.clone(), Duration::from_millis(5), rx));

        tokio::time::sleep(Duration::from_millis(30)).await;

        let recovered = store.get_task(task.id).await.unwrap().unwrap();
        assert_eq!(recovered.status, TaskStatus::Ready);
        assert!(recovered.claim.is_none());
        assert_eq!(store.queue_len().await.unwrap(), 1);

        tx.send(true).unwrap();
        handle.await.unwrap();
    }
}
