//! Health check endpoint.

use axum::Json;

use cascade_core::dto::workflow::HealthResponse;

pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse::ok())
}
