//! Execution graph built from a validated blueprint.
//!
//! Vertices are `(container, operation)` node keys. For each blueprint edge
//! `A.op_a -> B.op_b` the graph records that `B.op_b` consumes one input slot
//! holding the output of `A.op_a`. Adjacency lists are kept sorted so that
//! scheduling decisions derived from them are deterministic.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

use crate::domain::blueprint::Blueprint;
use crate::error::BlueprintError;

/// Identifies a graph vertex: one operation of one container.
///
/// Renders as `container:operation`; the total order (container first, then
/// operation) is the tie-break order used when several tasks become ready in
/// the same promotion.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeKey {
    pub container: String,
    pub operation: String,
}

impl NodeKey {
    pub fn new(container: impl Into<String>, operation: impl Into<String>) -> Self {
        Self {
            container: container.into(),
            operation: operation.into(),
        }
    }
}

impl fmt::Display for NodeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.container, self.operation)
    }
}

impl FromStr for NodeKey {
    type Err = BlueprintError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once(':') {
            Some((container, operation)) if !container.is_empty() && !operation.is_empty() => {
                Ok(Self::new(container, operation))
            }
            _ => Err(BlueprintError::InvalidStructure(format!(
                "invalid node key: {s:?}"
            ))),
        }
    }
}

impl Serialize for NodeKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for NodeKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}

/// One vertex with its immediate neighbors, both lists sorted by node key.
#[derive(Debug, Clone)]
pub struct GraphNode {
    pub key: NodeKey,
    /// Predecessors whose outputs fill this node's input slots, in slot order.
    pub upstream: Vec<NodeKey>,
    /// Successors consuming this node's output.
    pub downstream: Vec<NodeKey>,
}

/// The validated DAG of a blueprint, keyed by node key.
#[derive(Debug, Clone)]
pub struct ExecutionGraph {
    nodes: BTreeMap<NodeKey, GraphNode>,
}

impl ExecutionGraph {
    /// Builds and validates the graph.
    ///
    /// Rejects blueprints with duplicate node keys, connections to
    /// undeclared operations, cycles, or no source node.
    pub fn from_blueprint(blueprint: &Blueprint) -> Result<Self, BlueprintError> {
        if blueprint.nodes.is_empty() {
            return Err(BlueprintError::InvalidStructure(
                "blueprint has no nodes".to_string(),
            ));
        }

        let mut nodes: BTreeMap<NodeKey, GraphNode> = BTreeMap::new();

        for bp_node in &blueprint.nodes {
            if bp_node.container_name.trim().is_empty() {
                return Err(BlueprintError::InvalidStructure(
                    "container_name must not be empty".to_string(),
                ));
            }
            if bp_node.operation_signature_list.is_empty() {
                return Err(BlueprintError::InvalidStructure(format!(
                    "node {:?} declares no operations",
                    bp_node.container_name
                )));
            }
            for entry in &bp_node.operation_signature_list {
                let name = &entry.operation_signature.operation_name;
                if name.trim().is_empty() {
                    return Err(BlueprintError::InvalidStructure(format!(
                        "node {:?} declares an operation without a name",
                        bp_node.container_name
                    )));
                }
                let key = NodeKey::new(&bp_node.container_name, name);
                if nodes.contains_key(&key) {
                    return Err(BlueprintError::DuplicateNodeKey(key.to_string()));
                }
                nodes.insert(
                    key.clone(),
                    GraphNode {
                        key,
                        upstream: Vec::new(),
                        downstream: Vec::new(),
                    },
                );
            }
        }

        // Second pass: record edges in both directions.
        for bp_node in &blueprint.nodes {
            for entry in &bp_node.operation_signature_list {
                let source = NodeKey::new(
                    &bp_node.container_name,
                    &entry.operation_signature.operation_name,
                );
                for connection in &entry.connected_to {
                    let target = NodeKey::new(
                        &connection.container_name,
                        &connection.operation_signature.operation_name,
                    );
                    if !nodes.contains_key(&target) {
                        return Err(BlueprintError::UnknownConnectionTarget(target.to_string()));
                    }
                    if let Some(node) = nodes.get_mut(&source) {
                        if !node.downstream.contains(&target) {
                            node.downstream.push(target.clone());
                        }
                    }
                    if let Some(node) = nodes.get_mut(&target) {
                        if !node.upstream.contains(&source) {
                            node.upstream.push(source.clone());
                        }
                    }
                }
            }
        }

        for node in nodes.values_mut() {
            node.upstream.sort();
            node.downstream.sort();
        }

        let graph = Self { nodes };
        if graph.sources().next().is_none() {
            return Err(BlueprintError::NoSourceNodes);
        }
        graph.detect_cycles()?;
        Ok(graph)
    }

    /// Nodes without predecessors, in key order.
    pub fn sources(&self) -> impl Iterator<Item = &GraphNode> {
        self.nodes.values().filter(|n| n.upstream.is_empty())
    }

    pub fn node(&self, key: &NodeKey) -> Option<&GraphNode> {
        self.nodes.get(key)
    }

    /// All nodes in key order.
    pub fn nodes(&self) -> impl Iterator<Item = &GraphNode> {
        self.nodes.values()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Kahn's algorithm: if not every vertex can be peeled off in topological
    /// order, the remainder contains a cycle.
    fn detect_cycles(&self) -> Result<(), BlueprintError> {
        let mut in_degree: BTreeMap<&NodeKey, usize> = self
            .nodes
            .values()
            .map(|n| (&n.key, n.upstream.len()))
            .collect();

        let mut frontier: Vec<&NodeKey> = in_degree
            .iter()
            .filter(|(_, d)| **d == 0)
            .map(|(k, _)| *k)
            .collect();

        let mut processed = 0usize;
        while let Some(key) = frontier.pop() {
            processed += 1;
            if let Some(node) = self.nodes.get(key) {
                for successor in &node.downstream {
                    if let Some(degree) = in_degree.get_mut(successor) {
                        *degree -= 1;
                        if *degree == 0 {
                            frontier.push(successor);
                        }
                    }
                }
            }
        }

        if processed == self.nodes.len() {
            Ok(())
        } else {
            Err(BlueprintError::CircularDependency)
        }
    }
}
