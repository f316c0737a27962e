//! Error types for the control client.
//!
//! Everything here is a transport-level failure: the service was
//! unreachable, answered with a non-success status, or produced a body that
//! could not be decoded. Business failures (`status = failed` in a 2xx
//! body) are not errors at this layer; they are returned as regular
//! responses for the worker to classify.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ClientError>;

#[derive(Debug, Error)]
pub enum ClientError {
    /// The request could not be sent or the connection failed mid-flight.
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The service answered with a non-success HTTP status.
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// The response body did not match the control-interface wire form.
    #[error("invalid response body: {0}")]
    InvalidBody(String),
}

impl ClientError {
    pub fn status(status: u16, body: impl Into<String>) -> Self {
        Self::Status {
            status,
            body: body.into(),
        }
    }
}
