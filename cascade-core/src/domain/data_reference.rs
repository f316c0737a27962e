//! Protocol-agnostic references to artifact locations.
//!
//! The engine never reads artifact bodies. It carries references from an
//! upstream task's output into the input slots of downstream tasks; fetching
//! and interpreting the payload is entirely a service concern.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::error::BlueprintError;

/// Supported data transfer protocols.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    S3,
    Http,
    Https,
    Nfs,
    Grpc,
    Inline,
    File,
}

/// Reference to data at some location.
///
/// For `inline` the `uri` holds the base64-encoded payload itself. For
/// `grpc` the `uri` is a `host:port` pair and the `format` field carries the
/// method name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataReference {
    pub protocol: Protocol,
    pub uri: String,
    pub format: String,
}

impl DataReference {
    /// Builds an `inline` reference carrying `data` base64-encoded in the URI.
    pub fn from_inline_data(data: &[u8], format: impl Into<String>) -> Self {
        Self {
            protocol: Protocol::Inline,
            uri: BASE64.encode(data),
            format: format.into(),
        }
    }

    /// Decodes the payload of an `inline` reference.
    pub fn inline_data(&self) -> Result<Vec<u8>, BlueprintError> {
        if self.protocol != Protocol::Inline {
            return Err(BlueprintError::InvalidDataReference(format!(
                "inline_data is only valid for inline references, got {:?}",
                self.protocol
            )));
        }
        BASE64
            .decode(&self.uri)
            .map_err(|e| BlueprintError::InvalidDataReference(format!("invalid base64 uri: {e}")))
    }

    /// Validates that the URI shape matches the declared protocol.
    pub fn validate(&self) -> Result<(), BlueprintError> {
        if self.uri.trim().is_empty() {
            return Err(BlueprintError::InvalidDataReference(
                "uri must not be empty".to_string(),
            ));
        }

        let ok = match self.protocol {
            Protocol::S3 => self.uri.starts_with("s3://"),
            Protocol::Http => self.uri.starts_with("http://"),
            Protocol::Https => self.uri.starts_with("https://"),
            Protocol::Nfs => self.uri.contains(':'),
            Protocol::Inline => BASE64.decode(&self.uri).is_ok(),
            // grpc is host:port, file is any local path; no shape to enforce
            Protocol::Grpc => self.uri.contains(':'),
            Protocol::File => true,
        };

        if ok {
            Ok(())
        } else {
            Err(BlueprintError::InvalidDataReference(format!(
                "uri {:?} does not match protocol {:?}",
                self.uri, self.protocol
            )))
        }
    }
}
