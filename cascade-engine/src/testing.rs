//! Shared helpers for engine tests: blueprint builders and a scripted
//! control-interface fake.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use cascade_client::{ClientError, ControlApi, Result as ClientResult};
use cascade_core::domain::{DataReference, ServiceEndpoint, Workflow};
use cascade_core::dto::control::{ExecuteRequest, ExecuteResponse, RemoteStatus, StatusResponse};
use cascade_store::Store;

use crate::coordinator::Coordinator;

pub(crate) fn inline(payload: &str) -> DataReference {
    DataReference::from_inline_data(payload.as_bytes(), "json")
}

/// A chain of containers, each exposing operation `run` and feeding the next.
pub(crate) fn linear_blueprint(containers: &[&str]) -> serde_json::Value {
    let nodes: Vec<_> = containers
        .iter()
        .enumerate()
        .map(|(i, container)| {
            let connected_to: Vec<_> = containers
                .get(i + 1)
                .map(|next| {
                    vec![serde_json::json!({
                        "container_name": next,
                        "operation_signature": {"operation_name": "run"}
                    })]
                })
                .unwrap_or_default();
            serde_json::json!({
                "container_name": container,
                "operation_signature_list": [{
                    "operation_signature": {"operation_name": "run"},
                    "connected_to": connected_to
                }]
            })
        })
        .collect();

    serde_json::json!({
        "name": "test-pipeline",
        "pipeline_id": "p-test",
        "version": "1.0",
        "nodes": nodes
    })
}

/// `a -> {b, c} -> d`, every operation named `run`.
pub(crate) fn diamond_blueprint() -> serde_json::Value {
    let edge = |target: &str| {
        serde_json::json!({
            "container_name": target,
            "operation_signature": {"operation_name": "run"}
        })
    };
    serde_json::json!({
        "name": "diamond",
        "pipeline_id": "p-diamond",
        "version": "1.0",
        "nodes": [
            {
                "container_name": "a",
                "operation_signature_list": [{
                    "operation_signature": {"operation_name": "run"},
                    "connected_to": [edge("b"), edge("c")]
                }]
            },
            {
                "container_name": "b",
                "operation_signature_list": [{
                    "operation_signature": {"operation_name": "run"},
                    "connected_to": [edge("d")]
                }]
            },
            {
                "container_name": "c",
                "operation_signature_list": [{
                    "operation_signature": {"operation_name": "run"},
                    "connected_to": [edge("d")]
                }]
            },
            {
                "container_name": "d",
                "operation_signature_list": [{
                    "operation_signature": {"operation_name": "run"}
                }]
            }
        ]
    })
}

/// Dockerinfo where each container's address is its own name, so fakes can
/// tell containers apart by endpoint.
pub(crate) fn dockerinfo_json(containers: &[&str]) -> serde_json::Value {
    let entries: Vec<_> = containers
        .iter()
        .enumerate()
        .map(|(i, container)| {
            serde_json::json!({
                "container_name": container,
                "ip_address": container,
                "port": (9000 + i).to_string()
            })
        })
        .collect();
    serde_json::json!({"docker_info_list": entries})
}

pub(crate) async fn submit(
    store: Arc<dyn Store>,
    blueprint: serde_json::Value,
    dockerinfo: serde_json::Value,
    inputs: Vec<DataReference>,
) -> Workflow {
    Coordinator::new(store)
        .submit(blueprint, dockerinfo, inputs)
        .await
        .unwrap()
}

pub(crate) enum ScriptedExecute {
    Response(ExecuteResponse),
    TransportError(u16),
}

/// Scripted [`ControlApi`] implementation.
///
/// Execute responses are scripted per container (the endpoint address) and
/// consumed in order; an unscripted execute answers `complete` with an
/// inline output derived from the container name. Status responses are
/// scripted per remote task id; unscripted statuses answer `running`.
#[derive(Default)]
pub(crate) struct FakeControl {
    executes: Mutex<HashMap<String, VecDeque<ScriptedExecute>>>,
    statuses: Mutex<HashMap<String, VecDeque<StatusResponse>>>,
    outputs: Mutex<HashMap<String, DataReference>>,
    execute_log: Mutex<Vec<(String, ExecuteRequest)>>,
}

impl FakeControl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script_execute(&self, container: &str, scripted: ScriptedExecute) {
        self.executes
            .lock()
            .unwrap()
            .entry(container.to_string())
            .or_default()
            .push_back(scripted);
    }

    pub fn script_status(&self, remote_id: &str, status: StatusResponse) {
        self.statuses
            .lock()
            .unwrap()
            .entry(remote_id.to_string())
            .or_default()
            .push_back(status);
    }

    pub fn script_output(&self, remote_id: &str, output: DataReference) {
        self.outputs
            .lock()
            .unwrap()
            .insert(remote_id.to_string(), output);
    }

    /// Executed containers, in call order, as `execute:<container>`.
    pub fn calls(&self) -> Vec<String> {
        self.execute_log
            .lock()
            .unwrap()
            .iter()
            .map(|(container, _)| format!("execute:{container}"))
            .collect()
    }

    pub fn execute_requests(&self) -> Vec<ExecuteRequest> {
        self.execute_log
            .lock()
            .unwrap()
            .iter()
            .map(|(_, request)| request.clone())
            .collect()
    }
}

#[async_trait]
impl ControlApi for FakeControl {
    async fn execute(
        &self,
        endpoint: &ServiceEndpoint,
        request: &ExecuteRequest,
    ) -> ClientResult<ExecuteResponse> {
        let container = endpoint.address.clone();
        self.execute_log
            .lock()
            .unwrap()
            .push((container.clone(), request.clone()));

        let scripted = self
            .executes
            .lock()
            .unwrap()
            .get_mut(&container)
            .and_then(|queue| queue.pop_front());

        match scripted {
            Some(ScriptedExecute::Response(response)) => Ok(response),
            Some(ScriptedExecute::TransportError(status)) => {
                Err(ClientError::status(status, "scripted transport failure"))
            }
            None => Ok(ExecuteResponse {
                status: RemoteStatus::Complete,
                task_id: None,
                output: Some(inline(&container)),
                error: None,
            }),
        }
    }

    async fn status(
        &self,
        _endpoint: &ServiceEndpoint,
        remote_task_id: &str,
    ) -> ClientResult<StatusResponse> {
        let scripted = self
            .statuses
            .lock()
            .unwrap()
            .get_mut(remote_task_id)
            .and_then(|queue| queue.pop_front());

        Ok(scripted.unwrap_or(StatusResponse {
            status: RemoteStatus::Running,
            progress: None,
            error: None,
        }))
    }

    async fn output(
        &self,
        _endpoint: &ServiceEndpoint,
        remote_task_id: &str,
    ) -> ClientResult<DataReference> {
        let output = self.outputs.lock().unwrap().get(remote_task_id).cloned();
        Ok(output.unwrap_or_else(|| inline(remote_task_id)))
    }
}
