//! Postgres-backed store.
//!
//! Task and workflow records live in JSONB-heavy rows; the ready queue is a
//! serial-keyed table whose head is popped under `FOR UPDATE SKIP LOCKED`,
//! which is what makes [`Store::claim_one`] safe across competing workers.
//! Promotion and terminal transitions are status-guarded `UPDATE`s, i.e.
//! per-row compare-and-set.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::types::Json;
use sqlx::PgPool;
use uuid::Uuid;

use cascade_core::domain::{
    Blueprint, Claim, DataReference, DockerInfo, NodeKey, Task, TaskStatus, Workflow,
    WorkflowStatus,
};
use cascade_core::error::TaskError;

use crate::{ClaimOutcome, Store, StoreError};

const TASK_COLUMNS: &str = "id, workflow_id, node_key, upstream, status, attempts, inputs, \
                            output, error, claim_owner, claim_expires_at, created_at, updated_at";

const WORKFLOW_COLUMNS: &str =
    "id, blueprint, dockerinfo, initial_inputs, status, error, created_at, terminal_at, task_ids";

pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Connects to Postgres and runs the idempotent migrations.
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .acquire_timeout(Duration::from_secs(5))
            .connect(database_url)
            .await?;
        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    async fn run_migrations(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS workflows (
                id UUID PRIMARY KEY,
                blueprint JSONB NOT NULL,
                dockerinfo JSONB NOT NULL,
                initial_inputs JSONB NOT NULL DEFAULT '[]',
                status VARCHAR(32) NOT NULL,
                error TEXT,
                created_at TIMESTAMPTZ NOT NULL,
                terminal_at TIMESTAMPTZ,
                task_ids JSONB NOT NULL DEFAULT '[]'
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS tasks (
                id UUID PRIMARY KEY,
                workflow_id UUID NOT NULL,
                node_key VARCHAR(512) NOT NULL,
                upstream JSONB NOT NULL DEFAULT '[]',
                status VARCHAR(32) NOT NULL,
                attempts INTEGER NOT NULL DEFAULT 0,
                inputs JSONB NOT NULL DEFAULT '[]',
                output JSONB,
                error JSONB,
                claim_owner VARCHAR(255),
                claim_expires_at TIMESTAMPTZ,
                created_at TIMESTAMPTZ NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS ready_queue (
                position BIGSERIAL PRIMARY KEY,
                task_id UUID NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_tasks_workflow_id ON tasks(workflow_id)")
            .execute(&self.pool)
            .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_tasks_claim_expires_at ON tasks(claim_expires_at)",
        )
        .execute(&self.pool)
        .await?;

        tracing::info!("store migrations completed");
        Ok(())
    }
}

fn lease_expiry(lease: Duration) -> DateTime<Utc> {
    Utc::now() + chrono::Duration::milliseconds(lease.as_millis() as i64)
}

#[async_trait]
impl Store for PgStore {
    async fn put_workflow(&self, workflow: &Workflow) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO workflows
                (id, blueprint, dockerinfo, initial_inputs, status, error, created_at,
                 terminal_at, task_ids)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (id) DO UPDATE SET
                status = EXCLUDED.status,
                error = EXCLUDED.error,
                terminal_at = EXCLUDED.terminal_at,
                task_ids = EXCLUDED.task_ids
            "#,
        )
        .bind(workflow.id)
        .bind(Json(&workflow.blueprint))
        .bind(Json(&workflow.dockerinfo))
        .bind(Json(&workflow.initial_inputs))
        .bind(workflow_status_to_str(workflow.status))
        .bind(&workflow.error)
        .bind(workflow.created_at)
        .bind(workflow.terminal_at)
        .bind(Json(&workflow.task_ids))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_workflow(&self, id: Uuid) -> Result<Option<Workflow>, StoreError> {
        let row = sqlx::query_as::<_, WorkflowRow>(&format!(
            "SELECT {WORKFLOW_COLUMNS} FROM workflows WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(Workflow::try_from).transpose()
    }

    async fn list_workflows(&self) -> Result<Vec<Workflow>, StoreError> {
        let rows = sqlx::query_as::<_, WorkflowRow>(&format!(
            "SELECT {WORKFLOW_COLUMNS} FROM workflows ORDER BY created_at ASC"
        ))
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Workflow::try_from).collect()
    }

    async fn delete_workflow(&self, id: Uuid) -> Result<bool, StoreError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query(
            "DELETE FROM ready_queue WHERE task_id IN (SELECT id FROM tasks WHERE workflow_id = $1)",
        )
        .bind(id)
        .execute(&mut *tx)
        .await?;
        sqlx::query("DELETE FROM tasks WHERE workflow_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        let result = sqlx::query("DELETE FROM workflows WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(result.rows_affected() > 0)
    }

    async fn set_workflow_terminal(
        &self,
        id: Uuid,
        status: WorkflowStatus,
        error: Option<String>,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE workflows SET status = $2, error = $3, terminal_at = $4
            WHERE id = $1 AND status NOT IN ('complete', 'failed', 'cancelled')
            "#,
        )
        .bind(id)
        .bind(workflow_status_to_str(status))
        .bind(error)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn put_task(&self, task: &Task) -> Result<(), StoreError> {
        let (claim_owner, claim_expires_at) = match &task.claim {
            Some(claim) => (Some(claim.owner.clone()), Some(claim.expires_at)),
            None => (None, None),
        };
        sqlx::query(
            r#"
            INSERT INTO tasks
                (id, workflow_id, node_key, upstream, status, attempts, inputs, output,
                 error, claim_owner, claim_expires_at, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            ON CONFLICT (id) DO UPDATE SET
                status = EXCLUDED.status,
                attempts = EXCLUDED.attempts,
                inputs = EXCLUDED.inputs,
                output = EXCLUDED.output,
                error = EXCLUDED.error,
                claim_owner = EXCLUDED.claim_owner,
                claim_expires_at = EXCLUDED.claim_expires_at,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(task.id)
        .bind(task.workflow_id)
        .bind(task.node_key.to_string())
        .bind(Json(&task.upstream))
        .bind(task_status_to_str(task.status))
        .bind(task.attempts as i32)
        .bind(Json(&task.inputs))
        .bind(task.output.as_ref().map(Json))
        .bind(task.error.as_ref().map(Json))
        .bind(claim_owner)
        .bind(claim_expires_at)
        .bind(task.created_at)
        .bind(task.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_task(&self, id: Uuid) -> Result<Option<Task>, StoreError> {
        let row = sqlx::query_as::<_, TaskRow>(&format!(
            "SELECT {TASK_COLUMNS} FROM tasks WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(Task::try_from).transpose()
    }

    async fn list_tasks(&self, workflow_id: Uuid) -> Result<Vec<Task>, StoreError> {
        let rows = sqlx::query_as::<_, TaskRow>(&format!(
            "SELECT {TASK_COLUMNS} FROM tasks WHERE workflow_id = $1 \
             ORDER BY created_at ASC, id ASC"
        ))
        .bind(workflow_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Task::try_from).collect()
    }

    async fn set_task_input(
        &self,
        task_id: Uuid,
        slot: usize,
        input: &DataReference,
    ) -> Result<Task, StoreError> {
        let row = sqlx::query_as::<_, TaskRow>(&format!(
            r#"
            UPDATE tasks SET inputs = jsonb_set(inputs, $2::text[], $3), updated_at = $4
            WHERE id = $1 AND jsonb_array_length(inputs) > $5
            RETURNING {TASK_COLUMNS}
            "#
        ))
        .bind(task_id)
        .bind(vec![slot.to_string()])
        .bind(Json(input))
        .bind(Utc::now())
        .bind(slot as i32)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Task::try_from(row),
            None => {
                // disambiguate: unknown task vs out-of-range slot
                if self.get_task(task_id).await?.is_some() {
                    Err(StoreError::InvalidInputSlot { task_id, slot })
                } else {
                    Err(StoreError::TaskNotFound(task_id))
                }
            }
        }
    }

    async fn try_mark_ready(&self, task_id: Uuid) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE tasks SET status = 'ready', updated_at = $2
            WHERE id = $1 AND status = 'pending'
              AND NOT EXISTS (
                  SELECT 1 FROM jsonb_array_elements(inputs) AS slot(value)
                  WHERE slot.value = 'null'::jsonb
              )
            "#,
        )
        .bind(task_id)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn enqueue_ready(&self, task_id: Uuid) -> Result<(), StoreError> {
        sqlx::query("INSERT INTO ready_queue (task_id) VALUES ($1)")
            .bind(task_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn queue_len(&self) -> Result<usize, StoreError> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM ready_queue")
            .fetch_one(&self.pool)
            .await?;
        Ok(count as usize)
    }

    async fn claim_one(
        &self,
        worker_id: &str,
        lease: Duration,
    ) -> Result<Option<Task>, StoreError> {
        loop {
            let mut tx = self.pool.begin().await?;

            let head: Option<(i64, Uuid)> = sqlx::query_as(
                "SELECT position, task_id FROM ready_queue \
                 ORDER BY position ASC LIMIT 1 FOR UPDATE SKIP LOCKED",
            )
            .fetch_optional(&mut *tx)
            .await?;

            let Some((position, task_id)) = head else {
                return Ok(None);
            };

            sqlx::query("DELETE FROM ready_queue WHERE position = $1")
                .bind(position)
                .execute(&mut *tx)
                .await?;

            let row = sqlx::query_as::<_, TaskRow>(&format!(
                r#"
                UPDATE tasks
                SET claim_owner = $2, claim_expires_at = $3, attempts = attempts + 1,
                    updated_at = $4
                WHERE id = $1 AND status = 'ready'
                RETURNING {TASK_COLUMNS}
                "#
            ))
            .bind(task_id)
            .bind(worker_id)
            .bind(lease_expiry(lease))
            .bind(Utc::now())
            .fetch_optional(&mut *tx)
            .await?;

            tx.commit().await?;

            // a stale queue entry (deleted or already-driven task) is dropped
            // and the next head is tried
            if let Some(row) = row {
                return Ok(Some(Task::try_from(row)?));
            }
        }
    }

    async fn extend_claim(
        &self,
        task_id: Uuid,
        worker_id: &str,
        lease: Duration,
    ) -> Result<ClaimOutcome, StoreError> {
        let result = sqlx::query(
            "UPDATE tasks SET claim_expires_at = $3, updated_at = $4 \
             WHERE id = $1 AND claim_owner = $2",
        )
        .bind(task_id)
        .bind(worker_id)
        .bind(lease_expiry(lease))
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() > 0 {
            Ok(ClaimOutcome::Held)
        } else {
            Ok(ClaimOutcome::Lost)
        }
    }

    async fn release_claim(&self, task_id: Uuid, worker_id: &str) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE tasks SET claim_owner = NULL, claim_expires_at = NULL, updated_at = $3 \
             WHERE id = $1 AND claim_owner = $2",
        )
        .bind(task_id)
        .bind(worker_id)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn recover_expired(&self) -> Result<Vec<Uuid>, StoreError> {
        let mut tx = self.pool.begin().await?;

        let recovered: Vec<(Uuid,)> = sqlx::query_as(
            r#"
            UPDATE tasks
            SET status = 'ready', claim_owner = NULL, claim_expires_at = NULL, updated_at = $1
            WHERE claim_expires_at IS NOT NULL AND claim_expires_at <= $2
              AND status IN ('ready', 'running_remote')
            RETURNING id
            "#,
        )
        .bind(Utc::now())
        .bind(Utc::now())
        .fetch_all(&mut *tx)
        .await?;

        let mut ids: Vec<Uuid> = recovered.into_iter().map(|(id,)| id).collect();
        ids.sort();

        for task_id in &ids {
            sqlx::query("INSERT INTO ready_queue (task_id) VALUES ($1)")
                .bind(task_id)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(ids)
    }
}

// =============================================================================
// Row types
// =============================================================================

#[derive(sqlx::FromRow)]
struct WorkflowRow {
    id: Uuid,
    blueprint: Json<Blueprint>,
    dockerinfo: Json<DockerInfo>,
    initial_inputs: Json<Vec<DataReference>>,
    status: String,
    error: Option<String>,
    created_at: DateTime<Utc>,
    terminal_at: Option<DateTime<Utc>>,
    task_ids: Json<Vec<Uuid>>,
}

impl TryFrom<WorkflowRow> for Workflow {
    type Error = StoreError;

    fn try_from(row: WorkflowRow) -> Result<Self, StoreError> {
        Ok(Workflow {
            id: row.id,
            blueprint: row.blueprint.0,
            dockerinfo: row.dockerinfo.0,
            initial_inputs: row.initial_inputs.0,
            status: workflow_status_from_str(&row.status)?,
            error: row.error,
            created_at: row.created_at,
            terminal_at: row.terminal_at,
            task_ids: row.task_ids.0,
        })
    }
}

#[derive(sqlx::FromRow)]
struct TaskRow {
    id: Uuid,
    workflow_id: Uuid,
    node_key: String,
    upstream: Json<Vec<NodeKey>>,
    status: String,
    attempts: i32,
    inputs: Json<Vec<Option<DataReference>>>,
    output: Option<Json<DataReference>>,
    error: Option<Json<TaskError>>,
    claim_owner: Option<String>,
    claim_expires_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<TaskRow> for Task {
    type Error = StoreError;

    fn try_from(row: TaskRow) -> Result<Self, StoreError> {
        let node_key: NodeKey = row
            .node_key
            .parse()
            .map_err(|_| StoreError::Corrupt(format!("bad node key: {}", row.node_key)))?;

        let claim = match (row.claim_owner, row.claim_expires_at) {
            (Some(owner), Some(expires_at)) => Some(Claim { owner, expires_at }),
            _ => None,
        };

        Ok(Task {
            id: row.id,
            workflow_id: row.workflow_id,
            node_key,
            upstream: row.upstream.0,
            status: task_status_from_str(&row.status)?,
            attempts: row.attempts as u32,
            inputs: row.inputs.0,
            output: row.output.map(|j| j.0),
            error: row.error.map(|j| j.0),
            claim,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

// =============================================================================
// Status encoding
// =============================================================================

fn workflow_status_to_str(status: WorkflowStatus) -> &'static str {
    match status {
        WorkflowStatus::Pending => "pending",
        WorkflowStatus::Running => "running",
        WorkflowStatus::Complete => "complete",
        WorkflowStatus::Failed => "failed",
        WorkflowStatus::Cancelled => "cancelled",
    }
}

fn workflow_status_from_str(s: &str) -> Result<WorkflowStatus, StoreError> {
    match s {
        "pending" => Ok(WorkflowStatus::Pending),
        "running" => Ok(WorkflowStatus::Running),
        "complete" => Ok(WorkflowStatus::Complete),
        "failed" => Ok(WorkflowStatus::Failed),
        "cancelled" => Ok(WorkflowStatus::Cancelled),
        other => Err(StoreError::Corrupt(format!(
            "unknown workflow status: {other}"
        ))),
    }
}

fn task_status_to_str(status: TaskStatus) -> &'static str {
    match status {
        TaskStatus::Pending => "pending",
        TaskStatus::Ready => "ready",
        TaskStatus::RunningRemote => "running_remote",
        TaskStatus::Complete => "complete",
        TaskStatus::Failed => "failed",
    }
}

fn task_status_from_str(s: &str) -> Result<TaskStatus, StoreError> {
    match s {
        "pending" => Ok(TaskStatus::Pending),
        "ready" => Ok(TaskStatus::Ready),
        "running_remote" => Ok(TaskStatus::RunningRemote),
        "complete" => Ok(TaskStatus::Complete),
        "failed" => Ok(TaskStatus::Failed),
        other => Err(StoreError::Corrupt(format!("unknown task status: {other}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_encoding_round_trip() {
        for status in [
            TaskStatus::Pending,
            TaskStatus::Ready,
            TaskStatus::RunningRemote,
            TaskStatus::Complete,
            TaskStatus::Failed,
        ] {
            assert_eq!(
                task_status_from_str(task_status_to_str(status)).unwrap(),
                status
            );
        }

        for status in [
            WorkflowStatus::Pending,
            WorkflowStatus::Running,
            WorkflowStatus::Complete,
            WorkflowStatus::Failed,
            WorkflowStatus::Cancelled,
        ] {
            assert_eq!(
                workflow_status_from_str(workflow_status_to_str(status)).unwrap(),
                status
            );
        }

        assert!(task_status_from_str("bogus").is_err());
        assert!(workflow_status_from_str("bogus").is_err());
    }
}
