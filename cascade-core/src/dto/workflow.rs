//! Wire shapes of the submission API.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::data_reference::DataReference;
use crate::domain::task::{Task, TaskStatus};
use crate::domain::workflow::WorkflowStatus;
use crate::error::TaskError;

/// Body of `POST /workflows`.
///
/// Blueprint and dockerinfo stay as raw JSON here; the coordinator parses
/// and validates them so that shape errors surface as submit-time 400s
/// rather than framework rejections.
#[derive(Debug, Clone, Deserialize)]
pub struct SubmitWorkflowRequest {
    pub blueprint: serde_json::Value,
    pub dockerinfo: serde_json::Value,
    #[serde(default)]
    pub inputs: Vec<DataReference>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SubmitWorkflowResponse {
    pub workflow_id: Uuid,
    pub status: WorkflowStatus,
}

/// Response of `GET /workflows/{id}` and the elements of `GET /workflows`.
#[derive(Debug, Clone, Serialize)]
pub struct WorkflowView {
    pub workflow_id: Uuid,
    pub status: WorkflowStatus,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub terminal_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// One task in `GET /workflows/{id}/tasks`.
#[derive(Debug, Clone, Serialize)]
pub struct TaskView {
    pub task_id: Uuid,
    pub node_key: String,
    pub status: TaskStatus,
    pub attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<TaskError>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<DataReference>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&Task> for TaskView {
    fn from(task: &Task) -> Self {
        Self {
            task_id: task.id,
            node_key: task.node_key.to_string(),
            status: task.status,
            attempts: task.attempts,
            error: task.error.clone(),
            output: task.output.clone(),
            created_at: task.created_at,
            updated_at: task.updated_at,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TaskListResponse {
    pub workflow_id: Uuid,
    pub tasks: Vec<TaskView>,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

impl HealthResponse {
    pub fn ok() -> Self {
        Self { status: "ok" }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::graph::NodeKey;

    #[test]
    fn test_task_view_from_task() {
        let task = Task::new(
            Uuid::new_v4(),
            NodeKey::new("clean", "scrub"),
            vec![NodeKey::new("ingest", "fetch")],
        );
        let view = TaskView::from(&task);

        assert_eq!(view.node_key, "clean:scrub");
        assert_eq!(view.status, TaskStatus::Pending);
        assert_eq!(view.attempts, 0);
        assert!(view.output.is_none());
    }

    #[test]
    fn test_submit_request_inputs_default_to_empty() {
        let request: SubmitWorkflowRequest = serde_json::from_value(serde_json::json!({
            "blueprint": {"name": "x"},
            "dockerinfo": {"docker_info_list": []}
        }))
        .unwrap();
        assert!(request.inputs.is_empty());
    }
}
