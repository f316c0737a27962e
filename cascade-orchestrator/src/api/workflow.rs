//! Workflow API handlers.
//!
//! Every handler is a thin adaptor over the coordinator: deserialize,
//! delegate, shape the view.

use axum::{
    extract::{Path, State},
    Json,
};
use uuid::Uuid;

use cascade_core::domain::Workflow;
use cascade_core::dto::workflow::{
    SubmitWorkflowRequest, SubmitWorkflowResponse, TaskListResponse, TaskView, WorkflowView,
};

use crate::api::error::ApiResult;
use crate::api::AppState;

fn workflow_view(workflow: &Workflow) -> WorkflowView {
    WorkflowView {
        workflow_id: workflow.id,
        status: workflow.status,
        created_at: workflow.created_at,
        terminal_at: workflow.terminal_at,
        error: workflow.error.clone(),
    }
}

/// POST /workflows
pub async fn submit_workflow(
    State(state): State<AppState>,
    Json(request): Json<SubmitWorkflowRequest>,
) -> ApiResult<Json<SubmitWorkflowResponse>> {
    let workflow = state
        .coordinator
        .submit(request.blueprint, request.dockerinfo, request.inputs)
        .await?;

    Ok(Json(SubmitWorkflowResponse {
        workflow_id: workflow.id,
        status: workflow.status,
    }))
}

/// GET /workflows
pub async fn list_workflows(
    State(state): State<AppState>,
) -> ApiResult<Json<Vec<WorkflowView>>> {
    let workflows = state.coordinator.list_workflows().await?;
    Ok(Json(workflows.iter().map(workflow_view).collect()))
}

/// GET /workflows/{id}
pub async fn get_workflow(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<WorkflowView>> {
    let workflow = state.coordinator.observe(id).await?;
    Ok(Json(workflow_view(&workflow)))
}

/// GET /workflows/{id}/tasks
pub async fn list_workflow_tasks(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<TaskListResponse>> {
    let tasks = state.coordinator.list_tasks(id).await?;
    Ok(Json(TaskListResponse {
        workflow_id: id,
        tasks: tasks.iter().map(TaskView::from).collect(),
    }))
}

/// GET /workflows/{id}/tasks/{task_id}
pub async fn get_workflow_task(
    State(state): State<AppState>,
    Path((id, task_id)): Path<(Uuid, Uuid)>,
) -> ApiResult<Json<TaskView>> {
    let task = state.coordinator.get_task(id, task_id).await?;
    Ok(Json(TaskView::from(&task)))
}

/// DELETE /workflows/{id}
pub async fn delete_workflow(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<serde_json::Value>> {
    state.coordinator.delete(id).await?;
    Ok(Json(serde_json::json!({"status": "deleted"})))
}
