//! Engine error type.

use thiserror::Error;
use uuid::Uuid;

use cascade_core::error::BlueprintError;
use cascade_store::StoreError;

#[derive(Debug, Error)]
pub enum EngineError {
    /// Submit-time validation failure; surfaced to API clients as HTTP 400.
    #[error("invalid blueprint: {0}")]
    InvalidBlueprint(String),

    #[error("workflow not found: {0}")]
    WorkflowNotFound(Uuid),

    #[error("task not found: {0}")]
    TaskNotFound(Uuid),

    #[error(transparent)]
    Store(#[from] StoreError),

    /// Invariant violation inside the engine.
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<BlueprintError> for EngineError {
    fn from(err: BlueprintError) -> Self {
        EngineError::InvalidBlueprint(err.to_string())
    }
}
