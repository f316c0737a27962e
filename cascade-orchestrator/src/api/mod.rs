//! HTTP API layer of the orchestrator.

pub mod error;
pub mod health;
pub mod workflow;

use std::sync::Arc;

use axum::{
    routing::{delete, get, post},
    Router,
};
use tower_http::trace::TraceLayer;

use cascade_engine::Coordinator;

#[derive(Clone)]
pub struct AppState {
    pub coordinator: Arc<Coordinator>,
}

/// Builds the API router.
pub fn create_router(coordinator: Arc<Coordinator>) -> Router {
    Router::new()
        .route("/health", get(health::health_check))
        .route("/workflows", post(workflow::submit_workflow))
        .route("/workflows", get(workflow::list_workflows))
        .route("/workflows/{id}", get(workflow::get_workflow))
        .route("/workflows/{id}", delete(workflow::delete_workflow))
        .route("/workflows/{id}/tasks", get(workflow::list_workflow_tasks))
        .route(
            "/workflows/{id}/tasks/{task_id}",
            get(workflow::get_workflow_task),
        )
        .with_state(AppState { coordinator })
        .layer(TraceLayer::new_for_http())
}
