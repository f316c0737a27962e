//! Blueprint wire schema.
//!
//! A blueprint declares the pipeline as a list of container nodes, each with
//! one or more operation signatures and their outgoing connections. The
//! schema here mirrors the submitted JSON; topology validation lives in
//! [`crate::domain::graph`].

use serde::{Deserialize, Serialize};

/// Declarative description of a pipeline: a directed graph of service
/// operations and their connections.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Blueprint {
    pub name: String,
    pub pipeline_id: String,
    pub version: String,
    pub nodes: Vec<BlueprintNode>,
}

/// One container participating in the pipeline. A container may expose
/// several operations, each of which is a distinct graph vertex.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlueprintNode {
    pub container_name: String,
    pub operation_signature_list: Vec<OperationEntry>,
}

/// An operation offered by a container, together with the downstream
/// operations its output feeds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationEntry {
    pub operation_signature: OperationSignature,
    #[serde(default)]
    pub connected_to: Vec<Connection>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationSignature {
    pub operation_name: String,
    #[serde(default)]
    pub input_message_name: String,
    #[serde(default)]
    pub output_message_name: String,
}

/// An outgoing edge: the target container and operation that consumes this
/// operation's output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Connection {
    pub container_name: String,
    pub operation_signature: OperationSignature,
}
