//! Cascade Store
//!
//! The shared key/value store behind all cross-process coordination:
//! workflow records, task records, the FIFO ready queue, and the atomic
//! claim primitive that gives each ready task to exactly one worker.
//!
//! Two implementations are provided:
//! - [`MemoryStore`]: in-process, for tests and single-node development
//! - [`PgStore`]: Postgres via sqlx, for multi-worker deployments
//!
//! [`connect`] dispatches on the `STORE_URL` scheme.

pub mod memory;
pub mod postgres;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use cascade_core::domain::{DataReference, Task, Workflow, WorkflowStatus};

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Result of a claim heartbeat.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimOutcome {
    /// The lease was extended; the caller still owns the task.
    Held,
    /// Another worker owns the task now; the caller must abandon it.
    Lost,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("workflow not found: {0}")]
    WorkflowNotFound(Uuid),

    #[error("task not found: {0}")]
    TaskNotFound(Uuid),

    #[error("input slot {slot} out of range for task {task_id}")]
    InvalidInputSlot { task_id: Uuid, slot: usize },

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("encoding error: {0}")]
    Encoding(#[from] serde_json::Error),

    #[error("corrupt record: {0}")]
    Corrupt(String),

    #[error("unsupported store url: {0}")]
    UnsupportedUrl(String),
}

/// Persistence operations the engine relies on.
///
/// Every operation must be atomic with respect to concurrent callers:
/// [`Store::claim_one`] hands a queue head to exactly one worker,
/// [`Store::try_mark_ready`] promotes a task exactly once, and
/// [`Store::set_workflow_terminal`] records the terminal transition of a
/// workflow exactly once.
#[async_trait]
pub trait Store: Send + Sync {
    async fn put_workflow(&self, workflow: &Workflow) -> Result<(), StoreError>;
    async fn get_workflow(&self, id: Uuid) -> Result<Option<Workflow>, StoreError>;
    async fn list_workflows(&self) -> Result<Vec<Workflow>, StoreError>;

    /// Removes a workflow, its tasks, and any of its queued entries.
    /// Returns false when the workflow does not exist.
    async fn delete_workflow(&self, id: Uuid) -> Result<bool, StoreError>;

    /// Compare-and-set of the workflow's terminal status. Returns true when
    /// this call performed the transition, false when the workflow was
    /// already terminal.
    async fn set_workflow_terminal(
        &self,
        id: Uuid,
        status: WorkflowStatus,
        error: Option<String>,
    ) -> Result<bool, StoreError>;

    async fn put_task(&self, task: &Task) -> Result<(), StoreError>;
    async fn get_task(&self, id: Uuid) -> Result<Option<Task>, StoreError>;

    /// All tasks of a workflow, ordered by creation time.
    async fn list_tasks(&self, workflow_id: Uuid) -> Result<Vec<Task>, StoreError>;

    /// Writes a predecessor's output into one input slot and returns the
    /// updated task.
    async fn set_task_input(
        &self,
        task_id: Uuid,
        slot: usize,
        input: &DataReference,
    ) -> Result<Task, StoreError>;

    /// Compare-and-set `pending -> ready`, succeeding only when every input
    /// slot is resolved. Exactly one of several concurrent callers wins.
    async fn try_mark_ready(&self, task_id: Uuid) -> Result<bool, StoreError>;

    /// Appends a task to the FIFO ready queue.
    async fn enqueue_ready(&self, task_id: Uuid) -> Result<(), StoreError>;

    async fn queue_len(&self) -> Result<usize, StoreError>;

    /// Atomically pops the queue head and writes a claim
    /// `(owner, now + lease)` into the task record, incrementing its attempt
    /// counter. Returns `None` when the queue is empty.
    async fn claim_one(
        &self,
        worker_id: &str,
        lease: Duration,
    ) -> Result<Option<Task>, StoreError>;

    /// Heartbeat: pushes the lease expiry forward if the caller still owns
    /// the claim.
    async fn extend_claim(
        &self,
        task_id: Uuid,
        worker_id: &str,
        lease: Duration,
    ) -> Result<ClaimOutcome, StoreError>;

    /// Drops the claim if the caller owns it. Used on terminal transitions.
    async fn release_claim(&self, task_id: Uuid, worker_id: &str) -> Result<(), StoreError>;

    /// Resets every task whose claim has expired back to `ready` and
    /// re-enqueues it. Returns the recovered task ids.
    async fn recover_expired(&self) -> Result<Vec<Uuid>, StoreError>;
}

/// Opens the store selected by `store_url`.
///
/// `memory://` gives an in-process store; `postgres://` (or
/// `postgresql://`) connects to Postgres and runs migrations.
pub async fn connect(store_url: &str) -> Result<Arc<dyn Store>, StoreError> {
    if store_url.starts_with("memory://") {
        Ok(Arc::new(MemoryStore::new()))
    } else if store_url.starts_with("postgres://") || store_url.starts_with("postgresql://") {
        let store = PgStore::connect(store_url).await?;
        Ok(Arc::new(store))
    } else {
        Err(StoreError::UnsupportedUrl(store_url.to_string()))
    }
}
