//! In-process store for tests and single-node development.
//!
//! A single mutex guards all state, which makes every trait operation
//! trivially atomic. Not suitable for multi-process deployments.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;
use uuid::Uuid;

use cascade_core::domain::{Claim, DataReference, Task, TaskStatus, Workflow, WorkflowStatus};

use crate::{ClaimOutcome, Store, StoreError};

#[derive(Default)]
struct Inner {
    workflows: HashMap<Uuid, Workflow>,
    tasks: HashMap<Uuid, Task>,
    ready: VecDeque<Uuid>,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn lease_expiry(lease: Duration) -> chrono::DateTime<Utc> {
    Utc::now() + chrono::Duration::milliseconds(lease.as_millis() as i64)
}

#[async_trait]
impl Store for MemoryStore {
    async fn put_workflow(&self, workflow: &Workflow) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        inner.workflows.insert(workflow.id, workflow.clone());
        Ok(())
    }

    async fn get_workflow(&self, id: Uuid) -> Result<Option<Workflow>, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner.workflows.get(&id).cloned())
    }

    async fn list_workflows(&self) -> Result<Vec<Workflow>, StoreError> {
        let inner = self.inner.lock().await;
        let mut workflows: Vec<_> = inner.workflows.values().cloned().collect();
        workflows.sort_by_key(|w| w.created_at);
        Ok(workflows)
    }

    async fn delete_workflow(&self, id: Uuid) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock().await;
        let Some(workflow) = inner.workflows.remove(&id) else {
            return Ok(false);
        };
        for task_id in &workflow.task_ids {
            inner.tasks.remove(task_id);
        }
        inner.ready.retain(|task_id| !workflow.task_ids.contains(task_id));
        Ok(true)
    }

    async fn set_workflow_terminal(
        &self,
        id: Uuid,
        status: WorkflowStatus,
        error: Option<String>,
    ) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock().await;
        let workflow = inner
            .workflows
            .get_mut(&id)
            .ok_or(StoreError::WorkflowNotFound(id))?;
        if workflow.status.is_terminal() {
            return Ok(false);
        }
        workflow.status = status;
        workflow.error = error;
        workflow.terminal_at = Some(Utc::now());
        Ok(true)
    }

    async fn put_task(&self, task: &Task) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        inner.tasks.insert(task.id, task.clone());
        Ok(())
    }

    async fn get_task(&self, id: Uuid) -> Result<Option<Task>, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner.tasks.get(&id).cloned())
    }

    async fn list_tasks(&self, workflow_id: Uuid) -> Result<Vec<Task>, StoreError> {
        let inner = self.inner.lock().await;
        let mut tasks: Vec<_> = inner
            .tasks
            .values()
            .filter(|t| t.workflow_id == workflow_id)
            .cloned()
            .collect();
        tasks.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(tasks)
    }

    async fn set_task_input(
        &self,
        task_id: Uuid,
        slot: usize,
        input: &DataReference,
    ) -> Result<Task, StoreError> {
        let mut inner = self.inner.lock().await;
        let task = inner
            .tasks
            .get_mut(&task_id)
            .ok_or(StoreError::TaskNotFound(task_id))?;
        let slot_ref = task
            .inputs
            .get_mut(slot)
            .ok_or(StoreError::InvalidInputSlot { task_id, slot })?;
        *slot_ref = Some(input.clone());
        task.touch();
        Ok(task.clone())
    }

    async fn try_mark_ready(&self, task_id: Uuid) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock().await;
        let task = inner
            .tasks
            .get_mut(&task_id)
            .ok_or(StoreError::TaskNotFound(task_id))?;
        if task.status == TaskStatus::Pending && task.inputs_resolved() {
            task.status = TaskStatus::Ready;
            task.touch();
            Ok(true)
        } else {
            Ok(false)
        }
    }

    async fn enqueue_ready(&self, task_id: Uuid) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        inner.ready.push_back(task_id);
        Ok(())
    }

    async fn queue_len(&self) -> Result<usize, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner.ready.len())
    }

    async fn claim_one(
        &self,
        worker_id: &str,
        lease: Duration,
    ) -> Result<Option<Task>, StoreError> {
        let mut inner = self.inner.lock().await;
        while let Some(task_id) = inner.ready.pop_front() {
            let Some(task) = inner.tasks.get_mut(&task_id) else {
                continue;
            };
            // stale entries from deleted or already-driven tasks are skipped
            if task.status != TaskStatus::Ready {
                continue;
            }
            task.claim = Some(Claim {
                owner: worker_id.to_string(),
                expires_at: lease_expiry(lease),
            });
            task.attempts += 1;
            task.touch();
            return Ok(Some(task.clone()));
        }
        Ok(None)
    }

    async fn extend_claim(
        &self,
        task_id: Uuid,
        worker_id: &str,
        lease: Duration,
    ) -> Result<ClaimOutcome, StoreError> {
        let mut inner = self.inner.lock().await;
        let task = inner
            .tasks
            .get_mut(&task_id)
            .ok_or(StoreError::TaskNotFound(task_id))?;
        match &mut task.claim {
            Some(claim) if claim.owner == worker_id => {
                claim.expires_at = lease_expiry(lease);
                task.touch();
                Ok(ClaimOutcome::Held)
            }
            _ => Ok(ClaimOutcome::Lost),
        }
    }

    async fn release_claim(&self, task_id: Uuid, worker_id: &str) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        if let Some(task) = inner.tasks.get_mut(&task_id) {
            if task.claim.as_ref().is_some_and(|c| c.owner == worker_id) {
                task.claim = None;
                task.touch();
            }
        }
        Ok(())
    }

    async fn recover_expired(&self) -> Result<Vec<Uuid>, StoreError> {
        let mut inner = self.inner.lock().await;
        let now = Utc::now();
        let mut recovered = Vec::new();
        for task in inner.tasks.values_mut() {
            let expired = task.claim.as_ref().is_some_and(|c| c.is_expired(now));
            let recoverable =
                matches!(task.status, TaskStatus::Ready | TaskStatus::RunningRemote);
            if expired && recoverable {
                task.claim = None;
                task.status = TaskStatus::Ready;
                task.touch();
                recovered.push(task.id);
            }
        }
        recovered.sort();
        for task_id in &recovered {
            inner.ready.push_back(*task_id);
        }
        Ok(recovered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cascade_core::domain::NodeKey;

    fn task(workflow_id: Uuid, container: &str) -> Task {
        Task::new_source(workflow_id, NodeKey::new(container, "run"), &[])
    }

    #[tokio::test]
    async fn test_claim_is_fifo() {
        let store = MemoryStore::new();
        let workflow_id = Uuid::new_v4();

        let first = task(workflow_id, "a");
        let second = task(workflow_id, "b");
        store.put_task(&first).await.unwrap();
        store.put_task(&second).await.unwrap();
        store.enqueue_ready(first.id).await.unwrap();
        store.enqueue_ready(second.id).await.unwrap();

        let claimed = store
            .claim_one("worker-1", Duration::from_secs(30))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(claimed.id, first.id);
        assert_eq!(claimed.attempts, 1);
        assert_eq!(claimed.claim.as_ref().unwrap().owner, "worker-1");

        let claimed = store
            .claim_one("worker-2", Duration::from_secs(30))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(claimed.id, second.id);

        assert!(store
            .claim_one("worker-1", Duration::from_secs(30))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_stale_queue_entries_are_skipped() {
        let store = MemoryStore::new();
        let workflow_id = Uuid::new_v4();

        let mut stale = task(workflow_id, "a");
        stale.status = TaskStatus::Complete;
        let live = task(workflow_id, "b");
        store.put_task(&stale).await.unwrap();
        store.put_task(&live).await.unwrap();
        store.enqueue_ready(stale.id).await.unwrap();
        store.enqueue_ready(live.id).await.unwrap();

        let claimed = store
            .claim_one("worker-1", Duration::from_secs(30))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(claimed.id, live.id);
    }

    #[tokio::test]
    async fn test_extend_and_release_claim() {
        let store = MemoryStore::new();
        let t = task(Uuid::new_v4(), "a");
        store.put_task(&t).await.unwrap();
        store.enqueue_ready(t.id).await.unwrap();
        store
            .claim_one("worker-1", Duration::from_secs(30))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(
            store
                .extend_claim(t.id, "worker-1", Duration::from_secs(30))
                .await
                .unwrap(),
            ClaimOutcome::Held
        );
        assert_eq!(
            store
                .extend_claim(t.id, "worker-2", Duration::from_secs(30))
                .await
                .unwrap(),
            ClaimOutcome::Lost
        );

        store.release_claim(t.id, "worker-1").await.unwrap();
        assert!(store.get_task(t.id).await.unwrap().unwrap().claim.is_none());
        assert_eq!(
            store
                .extend_claim(t.id, "worker-1", Duration::from_secs(30))
                .await
                .unwrap(),
            ClaimOutcome::Lost
        );
    }

    #[tokio::test]
    async fn test_recover_expired_re_enqueues() {
        let store = MemoryStore::new();
        let t = task(Uuid::new_v4(), "a");
        store.put_task(&t).await.unwrap();
        store.enqueue_ready(t.id).await.unwrap();

        let mut claimed = store
            .claim_one("worker-1", Duration::from_millis(5))
            .await
            .unwrap()
            .unwrap();
        claimed.status = TaskStatus::RunningRemote;
        store.put_task(&claimed).await.unwrap();

        tokio::time::sleep(Duration::from_millis(20)).await;

        let recovered = store.recover_expired().await.unwrap();
        assert_eq!(recovered, vec![t.id]);

        let reloaded = store.get_task(t.id).await.unwrap().unwrap();
        assert_eq!(reloaded.status, TaskStatus::Ready);
        assert!(reloaded.claim.is_none());

        // the recovered task is claimable again, with its attempt counter
        // carrying over
        let reclaimed = store
            .claim_one("worker-2", Duration::from_secs(30))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(reclaimed.id, t.id);
        assert_eq!(reclaimed.attempts, 2);
    }

    #[tokio::test]
    async fn test_recover_ignores_live_claims() {
        let store = MemoryStore::new();
        let t = task(Uuid::new_v4(), "a");
        store.put_task(&t).await.unwrap();
        store.enqueue_ready(t.id).await.unwrap();
        store
            .claim_one("worker-1", Duration::from_secs(60))
            .await
            .unwrap()
            .unwrap();

        assert!(store.recover_expired().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_input_slots_and_promotion_cas() {
        let store = MemoryStore::new();
        let workflow_id = Uuid::new_v4();
        let upstream = vec![NodeKey::new("b", "run"), NodeKey::new("c", "run")];
        let join = Task::new(workflow_id, NodeKey::new("d", "join"), upstream);
        store.put_task(&join).await.unwrap();

        // not promotable with an unresolved slot
        assert!(!store.try_mark_ready(join.id).await.unwrap());

        let b_out = DataReference::from_inline_data(b"b", "json");
        let c_out = DataReference::from_inline_data(b"c", "json");
        store.set_task_input(join.id, 1, &c_out).await.unwrap();
        assert!(!store.try_mark_ready(join.id).await.unwrap());

        let updated = store.set_task_input(join.id, 0, &b_out).await.unwrap();
        assert!(updated.inputs_resolved());

        // exactly one promotion wins
        assert!(store.try_mark_ready(join.id).await.unwrap());
        assert!(!store.try_mark_ready(join.id).await.unwrap());

        let reloaded = store.get_task(join.id).await.unwrap().unwrap();
        assert_eq!(reloaded.status, TaskStatus::Ready);
        assert_eq!(reloaded.resolved_inputs(), vec![b_out, c_out]);
    }

    #[tokio::test]
    async fn test_set_task_input_rejects_bad_slot() {
        let store = MemoryStore::new();
        let t = Task::new(
            Uuid::new_v4(),
            NodeKey::new("d", "join"),
            vec![NodeKey::new("b", "run")],
        );
        store.put_task(&t).await.unwrap();

        let input = DataReference::from_inline_data(b"x", "json");
        let err = store.set_task_input(t.id, 5, &input).await.unwrap_err();
        assert!(matches!(err, StoreError::InvalidInputSlot { slot: 5, .. }));
    }

    #[tokio::test]
    async fn test_workflow_terminal_cas() {
        let store = MemoryStore::new();
        let workflow = Workflow::new(
            cascade_core::domain::Blueprint {
                name: "t".to_string(),
                pipeline_id: "p".to_string(),
                version: "1".to_string(),
                nodes: vec![],
            },
            Default::default(),
            vec![],
        );
        store.put_workflow(&workflow).await.unwrap();

        assert!(store
            .set_workflow_terminal(workflow.id, WorkflowStatus::Failed, Some("boom".into()))
            .await
            .unwrap());
        // second terminal write loses the race
        assert!(!store
            .set_workflow_terminal(workflow.id, WorkflowStatus::Complete, None)
            .await
            .unwrap());

        let reloaded = store.get_workflow(workflow.id).await.unwrap().unwrap();
        assert_eq!(reloaded.status, WorkflowStatus::Failed);
        assert_eq!(reloaded.error.as_deref(), Some("boom"));
        assert!(reloaded.terminal_at.is_some());
    }

    #[tokio::test]
    async fn test_delete_workflow_removes_tasks_and_queue_entries() {
        let store = MemoryStore::new();
        let mut workflow = Workflow::new(
            cascade_core::domain::Blueprint {
                name: "t".to_string(),
                pipeline_id: "p".to_string(),
                version: "1".to_string(),
                nodes: vec![],
            },
            Default::default(),
            vec![],
        );
        let t = task(workflow.id, "a");
        workflow.task_ids.push(t.id);
        store.put_workflow(&workflow).await.unwrap();
        store.put_task(&t).await.unwrap();
        store.enqueue_ready(t.id).await.unwrap();

        assert!(store.delete_workflow(workflow.id).await.unwrap());
        assert!(store.get_task(t.id).await.unwrap().is_none());
        assert_eq!(store.queue_len().await.unwrap(), 0);
        assert!(!store.delete_workflow(workflow.id).await.unwrap());
    }
}
