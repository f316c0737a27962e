//! Topological scheduling over the shared store.
//!
//! Seeding creates one task per graph vertex and enqueues the sources;
//! promotion runs after every task completion and moves successors whose
//! inputs just became complete from `pending` to `ready`. Promotion is
//! raced by concurrent completions of sibling predecessors, so the
//! `pending -> ready` transition goes through the store's compare-and-set
//! and exactly one completion wins the enqueue.

use std::collections::HashMap;
use std::sync::Arc;

use cascade_core::domain::{ExecutionGraph, NodeKey, Task, TaskStatus, Workflow};
use cascade_store::Store;

use crate::error::EngineError;

#[derive(Clone)]
pub struct Scheduler {
    store: Arc<dyn Store>,
}

impl Scheduler {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Creates the workflow's tasks and seeds the ready queue.
    ///
    /// One task per node key, in key order. Sources start `ready` carrying
    /// the workflow's initial inputs; all other tasks start `pending` with
    /// one unresolved input slot per predecessor. The workflow record is
    /// persisted with its task id list before any task becomes claimable.
    pub async fn seed(
        &self,
        workflow: &mut Workflow,
        graph: &ExecutionGraph,
    ) -> Result<(), EngineError> {
        let mut tasks = Vec::with_capacity(graph.len());
        for node in graph.nodes() {
            let task = if node.upstream.is_empty() {
                Task::new_source(workflow.id, node.key.clone(), &workflow.initial_inputs)
            } else {
                Task::new(workflow.id, node.key.clone(), node.upstream.clone())
            };
            workflow.task_ids.push(task.id);
            tasks.push(task);
        }

        self.store.put_workflow(workflow).await?;
        for task in &tasks {
            self.store.put_task(task).await?;
        }
        for task in tasks.iter().filter(|t| t.status == TaskStatus::Ready) {
            self.store.enqueue_ready(task.id).await?;
        }

        tracing::debug!(
            workflow_id = %workflow.id,
            tasks = tasks.len(),
            "workflow seeded"
        );
        Ok(())
    }

    /// Propagates a completed task's output to its successors and enqueues
    /// every successor whose input set just became complete.
    ///
    /// Successors are visited in node-key order, so tasks promoted by the
    /// same completion are enqueued deterministically.
    pub async fn on_task_complete(
        &self,
        completed: &Task,
        workflow: &Workflow,
    ) -> Result<(), EngineError> {
        let graph = ExecutionGraph::from_blueprint(&workflow.blueprint)
            .map_err(|e| EngineError::Internal(format!("stored blueprint no longer valid: {e}")))?;

        let node = graph.node(&completed.node_key).ok_or_else(|| {
            EngineError::Internal(format!(
                "node {} missing from workflow {} graph",
                completed.node_key, workflow.id
            ))
        })?;

        if node.downstream.is_empty() {
            return Ok(());
        }

        let output = completed.output.clone().ok_or_else(|| {
            EngineError::Internal(format!("completed task {} has no output", completed.id))
        })?;

        let tasks = self.store.list_tasks(workflow.id).await?;
        let by_key: HashMap<&NodeKey, &Task> =
            tasks.iter().map(|t| (&t.node_key, t)).collect();

        for successor_key in &node.downstream {
            let successor = by_key.get(successor_key).ok_or_else(|| {
                EngineError::Internal(format!(
                    "no task for node {successor_key} in workflow {}",
                    workflow.id
                ))
            })?;

            let slot = successor.input_slot(&completed.node_key).ok_or_else(|| {
                EngineError::Internal(format!(
                    "task {} has no input slot for predecessor {}",
                    successor.id, completed.node_key
                ))
            })?;

            let updated = self
                .store
                .set_task_input(successor.id, slot, &output)
                .await?;

            if updated.inputs_resolved() && self.store.try_mark_ready(successor.id).await? {
                self.store.enqueue_ready(successor.id).await?;
                tracing::debug!(
                    workflow_id = %workflow.id,
                    task_id = %successor.id,
                    node_key = %successor.node_key,
                    "task promoted to ready"
                );
            }
        }

        Ok(())
    }
}
