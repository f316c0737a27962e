//! API error handling.
//!
//! Engine errors map onto HTTP statuses: validation failures are 400s,
//! unknown identifiers are 404s, everything else is a 500 with the detail
//! kept out of the response body.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};

use cascade_engine::EngineError;

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    NotFound(String),
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::Internal(msg) => {
                tracing::error!("internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal server error".to_string(),
                )
            }
        };

        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::InvalidBlueprint(msg) => ApiError::BadRequest(msg),
            EngineError::WorkflowNotFound(id) => {
                ApiError::NotFound(format!("workflow {id} not found"))
            }
            EngineError::TaskNotFound(id) => ApiError::NotFound(format!("task {id} not found")),
            EngineError::Store(e) => ApiError::Internal(e.to_string()),
            EngineError::Internal(msg) => ApiError::Internal(msg),
        }
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
