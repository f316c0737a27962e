//! Workflow records: one submitted pipeline instance.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::blueprint::Blueprint;
use crate::domain::data_reference::DataReference;
use crate::domain::dockerinfo::DockerInfo;

/// Workflow lifecycle status.
///
/// `Cancelled` is part of the wire contract for a future cancellation verb;
/// the engine itself never sets it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkflowStatus {
    Pending,
    Running,
    Complete,
    Failed,
    Cancelled,
}

impl WorkflowStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            WorkflowStatus::Complete | WorkflowStatus::Failed | WorkflowStatus::Cancelled
        )
    }
}

/// A submitted pipeline instance.
///
/// The blueprint and dockerinfo are immutable after submit; workers re-derive
/// the execution graph from the blueprint whenever they need adjacency.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workflow {
    pub id: Uuid,
    pub blueprint: Blueprint,
    pub dockerinfo: DockerInfo,
    pub initial_inputs: Vec<DataReference>,
    pub status: WorkflowStatus,
    /// First failing task's error, recorded once when the workflow fails.
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub terminal_at: Option<DateTime<Utc>>,
    pub task_ids: Vec<Uuid>,
}

impl Workflow {
    pub fn new(
        blueprint: Blueprint,
        dockerinfo: DockerInfo,
        initial_inputs: Vec<DataReference>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            blueprint,
            dockerinfo,
            initial_inputs,
            status: WorkflowStatus::Pending,
            error: None,
            created_at: Utc::now(),
            terminal_at: None,
            task_ids: Vec::new(),
        }
    }
}
