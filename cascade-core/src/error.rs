//! Error taxonomy shared by the worker loop and the coordinator.
//!
//! Every failure a task can experience is classified into one of the kinds
//! below. The kind decides the retry policy: transport failures are retried
//! up to the attempt cap, everything else is terminal for the task.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failure classification for tasks and submit-time validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Blueprint or dockerinfo failed submit-time validation.
    InvalidBlueprint,
    /// Unknown workflow or task identifier.
    NotFound,
    /// The service was unreachable, returned a non-success HTTP status, or
    /// produced a body that could not be decoded.
    TransportError,
    /// The service itself reported `status = failed`.
    ServiceError,
    /// A long-running task exceeded the configured remote timeout.
    RemoteTimeout,
    /// The worker lost its claim lease while driving the task.
    ClaimLost,
    /// Invariant violation or store failure inside the engine.
    InternalError,
}

impl ErrorKind {
    /// Whether a task failure of this kind may be retried (subject to the
    /// attempt cap).
    pub fn is_retriable(&self) -> bool {
        matches!(self, ErrorKind::TransportError)
    }
}

/// Error record persisted on a failed task: classification plus the message,
/// verbatim for service-reported failures.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskError {
    pub kind: ErrorKind,
    pub message: String,
}

impl TaskError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::TransportError, message)
    }

    pub fn service(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ServiceError, message)
    }
}

impl std::fmt::Display for TaskError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

/// Raised when a blueprint, dockerinfo document, or initial input fails
/// submit-time validation. Surfaced to API clients as HTTP 400.
#[derive(Debug, Error)]
pub enum BlueprintError {
    #[error("invalid blueprint structure: {0}")]
    InvalidStructure(String),

    #[error("invalid connection target: {0}")]
    UnknownConnectionTarget(String),

    #[error("duplicate node key: {0}")]
    DuplicateNodeKey(String),

    #[error("circular dependency detected")]
    CircularDependency,

    #[error("no source nodes found")]
    NoSourceNodes,

    #[error("no endpoint declared for container: {0}")]
    MissingEndpoint(String),

    #[error("invalid port for {container}: {port}")]
    InvalidPort { container: String, port: String },

    #[error("invalid data reference: {0}")]
    InvalidDataReference(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_transport_errors_are_retriable() {
        assert!(ErrorKind::TransportError.is_retriable());
        assert!(!ErrorKind::ServiceError.is_retriable());
        assert!(!ErrorKind::RemoteTimeout.is_retriable());
        assert!(!ErrorKind::InternalError.is_retriable());
        assert!(!ErrorKind::ClaimLost.is_retriable());
    }

    #[test]
    fn test_error_kind_wire_form() {
        let json = serde_json::to_string(&ErrorKind::ServiceError).unwrap();
        assert_eq!(json, "\"ServiceError\"");

        let kind: ErrorKind = serde_json::from_str("\"TransportError\"").unwrap();
        assert_eq!(kind, ErrorKind::TransportError);
    }
}
