//! Wire shapes of the service control interface.
//!
//! Services expose three endpoints: `POST /control/execute`,
//! `GET /control/status/{task_id}` and `GET /control/output/{task_id}`.
//! The output endpoint returns a bare [`DataReference`].

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::data_reference::DataReference;

/// Request body for `POST /control/execute`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecuteRequest {
    /// Operation name of the node being invoked.
    pub method: String,
    pub workflow_id: Uuid,
    pub task_id: Uuid,
    pub inputs: Vec<DataReference>,
    #[serde(default)]
    pub parameters: serde_json::Map<String, serde_json::Value>,
}

/// Status reported by a service for an execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RemoteStatus {
    Complete,
    Running,
    Failed,
}

/// Response body of `POST /control/execute`.
///
/// `complete` implies `output` is present; `running` implies the service
/// assigned a `task_id` for polling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecuteResponse {
    pub status: RemoteStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<DataReference>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Response body of `GET /control/status/{task_id}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub status: RemoteStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
