//! Task records: one node-operation invocation within a workflow.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::data_reference::DataReference;
use crate::domain::graph::NodeKey;
use crate::error::TaskError;

/// Task execution status.
///
/// `RunningRemote` means a worker holds the claim and is driving the task
/// against its service; the remote side may itself still be queued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Ready,
    RunningRemote,
    Complete,
    Failed,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Complete | TaskStatus::Failed)
    }
}

/// Reservation of a task by one worker for a bounded duration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claim {
    pub owner: String,
    pub expires_at: DateTime<Utc>,
}

impl Claim {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// One concrete execution of a node key within one workflow.
///
/// `upstream` is sorted by node key and `inputs` has one slot per upstream
/// entry; a predecessor's output lands in its slot, so the resolved input
/// list is ordered by producer node key regardless of completion order.
/// Source tasks have no upstream and carry the workflow's initial inputs
/// pre-resolved.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: Uuid,
    pub workflow_id: Uuid,
    pub node_key: NodeKey,
    pub upstream: Vec<NodeKey>,
    pub status: TaskStatus,
    pub attempts: u32,
    pub inputs: Vec<Option<DataReference>>,
    pub output: Option<DataReference>,
    pub error: Option<TaskError>,
    pub claim: Option<Claim>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Task {
    /// Creates a pending task with one unresolved input slot per predecessor.
    pub fn new(workflow_id: Uuid, node_key: NodeKey, upstream: Vec<NodeKey>) -> Self {
        let now = Utc::now();
        let slots = upstream.len();
        Self {
            id: Uuid::new_v4(),
            workflow_id,
            node_key,
            upstream,
            status: TaskStatus::Pending,
            attempts: 0,
            inputs: vec![None; slots],
            output: None,
            error: None,
            claim: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Creates a ready source task carrying the workflow's initial inputs.
    pub fn new_source(
        workflow_id: Uuid,
        node_key: NodeKey,
        initial_inputs: &[DataReference],
    ) -> Self {
        let mut task = Self::new(workflow_id, node_key, Vec::new());
        task.inputs = initial_inputs.iter().cloned().map(Some).collect();
        task.status = TaskStatus::Ready;
        task
    }

    /// The slot index a given predecessor's output belongs in.
    pub fn input_slot(&self, producer: &NodeKey) -> Option<usize> {
        self.upstream.iter().position(|key| key == producer)
    }

    /// Whether every input slot holds a value.
    pub fn inputs_resolved(&self) -> bool {
        self.inputs.iter().all(|slot| slot.is_some())
    }

    /// The resolved inputs in slot order. Unresolved slots are skipped, so
    /// callers should check [`Task::inputs_resolved`] first.
    pub fn resolved_inputs(&self) -> Vec<DataReference> {
        self.inputs.iter().flatten().cloned().collect()
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_task_has_one_slot_per_predecessor() {
        let upstream = vec![NodeKey::new("b", "run"), NodeKey::new("c", "run")];
        let task = Task::new(Uuid::new_v4(), NodeKey::new("d", "join"), upstream);

        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.inputs.len(), 2);
        assert!(!task.inputs_resolved());
        assert_eq!(task.input_slot(&NodeKey::new("c", "run")), Some(1));
        assert_eq!(task.input_slot(&NodeKey::new("x", "run")), None);
    }

    #[test]
    fn test_source_task_is_ready_with_initial_inputs() {
        let inputs = vec![DataReference::from_inline_data(b"seed", "json")];
        let task = Task::new_source(Uuid::new_v4(), NodeKey::new("a", "run"), &inputs);

        assert_eq!(task.status, TaskStatus::Ready);
        assert!(task.inputs_resolved());
        assert_eq!(task.resolved_inputs(), inputs);
    }

    #[test]
    fn test_source_task_with_no_inputs() {
        let task = Task::new_source(Uuid::new_v4(), NodeKey::new("a", "run"), &[]);
        assert!(task.inputs_resolved());
        assert!(task.resolved_inputs().is_empty());
    }

    #[test]
    fn test_claim_expiry() {
        let claim = Claim {
            owner: "worker-1".to_string(),
            expires_at: Utc::now() - chrono::Duration::seconds(1),
        };
        assert!(claim.is_expired(Utc::now()));

        let live = Claim {
            owner: "worker-1".to_string(),
            expires_at: Utc::now() + chrono::Duration::seconds(30),
        };
        assert!(!live.is_expired(Utc::now()));
    }
}
