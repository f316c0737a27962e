//! Domain types for the orchestration engine.

pub mod blueprint;
pub mod data_reference;
pub mod dockerinfo;
pub mod graph;
pub mod task;
pub mod workflow;

pub use blueprint::Blueprint;
pub use data_reference::{DataReference, Protocol};
pub use dockerinfo::{DockerInfo, ServiceEndpoint};
pub use graph::{ExecutionGraph, NodeKey};
pub use task::{Claim, Task, TaskStatus};
pub use workflow::{Workflow, WorkflowStatus};
