//! Workflow lifecycle coordination.
//!
//! The coordinator owns the three lifecycle verbs: submit (validate,
//! persist, seed), observe (aggregate task states into a workflow status),
//! and deletion. It is the only writer of a workflow record's terminal
//! status; the terminal transition is computed lazily on observe and
//! persisted through the store's compare-and-set, so concurrent observers
//! record it exactly once.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use uuid::Uuid;

use cascade_core::domain::dockerinfo::DockerInfoDoc;
use cascade_core::domain::{
    Blueprint, DataReference, DockerInfo, ExecutionGraph, NodeKey, Task, TaskStatus, Workflow,
    WorkflowStatus,
};
use cascade_core::error::BlueprintError;
use cascade_store::Store;

use crate::error::EngineError;
use crate::scheduler::Scheduler;

#[derive(Clone)]
pub struct Coordinator {
    store: Arc<dyn Store>,
    scheduler: Scheduler,
}

impl Coordinator {
    pub fn new(store: Arc<dyn Store>) -> Self {
        let scheduler = Scheduler::new(store.clone());
        Self { store, scheduler }
    }

    /// Validates and persists a workflow, seeding its ready queue.
    ///
    /// Validation covers blueprint structure and topology, dockerinfo
    /// coverage of every referenced container, and the shape of any initial
    /// input references. Nothing is written to the store until everything
    /// validates.
    pub async fn submit(
        &self,
        blueprint: serde_json::Value,
        dockerinfo: serde_json::Value,
        inputs: Vec<DataReference>,
    ) -> Result<Workflow, EngineError> {
        let blueprint: Blueprint = serde_json::from_value(blueprint)
            .map_err(|e| EngineError::InvalidBlueprint(format!("invalid blueprint structure: {e}")))?;
        let graph = ExecutionGraph::from_blueprint(&blueprint)?;

        let doc: DockerInfoDoc = serde_json::from_value(dockerinfo).map_err(|e| {
            EngineError::InvalidBlueprint(format!("invalid dockerinfo structure: {e}"))
        })?;
        let dockerinfo = DockerInfo::parse(&doc)?;

        for node in graph.nodes() {
            if dockerinfo.endpoint(&node.key.container).is_none() {
                return Err(BlueprintError::MissingEndpoint(node.key.container.clone()).into());
            }
        }

        for input in &inputs {
            input.validate()?;
        }

        let mut workflow = Workflow::new(blueprint, dockerinfo, inputs);
        self.scheduler.seed(&mut workflow, &graph).await?;

        tracing::info!(
            workflow_id = %workflow.id,
            pipeline = %workflow.blueprint.name,
            tasks = workflow.task_ids.len(),
            "workflow submitted"
        );
        Ok(workflow)
    }

    /// Current view of a workflow with its aggregate status.
    ///
    /// A terminal aggregate is persisted; the non-terminal `running` state
    /// is derived on the fly and only reflected in the returned record.
    pub async fn observe(&self, id: Uuid) -> Result<Workflow, EngineError> {
        let mut workflow = self
            .store
            .get_workflow(id)
            .await?
            .ok_or(EngineError::WorkflowNotFound(id))?;

        if workflow.status.is_terminal() {
            return Ok(workflow);
        }

        let tasks = self.store.list_tasks(id).await?;
        match aggregate_status(&tasks) {
            WorkflowStatus::Complete => {
                self.store
                    .set_workflow_terminal(id, WorkflowStatus::Complete, None)
                    .await?;
                tracing::info!(workflow_id = %id, "workflow complete");
                self.reload(id).await
            }
            WorkflowStatus::Failed => {
                let error = first_failure(&tasks)
                    .map(|task| match &task.error {
                        Some(e) => format!("task {} failed: {}", task.id, e.message),
                        None => format!("task {} failed", task.id),
                    });
                self.store
                    .set_workflow_terminal(id, WorkflowStatus::Failed, error)
                    .await?;
                tracing::warn!(workflow_id = %id, "workflow failed");
                self.reload(id).await
            }
            status => {
                workflow.status = status;
                Ok(workflow)
            }
        }
    }

    pub async fn list_workflows(&self) -> Result<Vec<Workflow>, EngineError> {
        Ok(self.store.list_workflows().await?)
    }

    /// Tasks of a workflow, in creation order.
    pub async fn list_tasks(&self, workflow_id: Uuid) -> Result<Vec<Task>, EngineError> {
        self.store
            .get_workflow(workflow_id)
            .await?
            .ok_or(EngineError::WorkflowNotFound(workflow_id))?;
        Ok(self.store.list_tasks(workflow_id).await?)
    }

    pub async fn get_task(&self, workflow_id: Uuid, task_id: Uuid) -> Result<Task, EngineError> {
        let task = self
            .store
            .get_task(task_id)
            .await?
            .filter(|t| t.workflow_id == workflow_id)
            .ok_or(EngineError::TaskNotFound(task_id))?;
        Ok(task)
    }

    /// Removes a workflow, its tasks, and their queue entries.
    pub async fn delete(&self, id: Uuid) -> Result<(), EngineError> {
        if self.store.delete_workflow(id).await? {
            tracing::info!(workflow_id = %id, "workflow deleted");
            Ok(())
        } else {
            Err(EngineError::WorkflowNotFound(id))
        }
    }

    async fn reload(&self, id: Uuid) -> Result<Workflow, EngineError> {
        self.store
            .get_workflow(id)
            .await?
            .ok_or(EngineError::WorkflowNotFound(id))
    }
}

/// Folds task states into the workflow lifecycle status.
///
/// - complete: every task is complete
/// - failed: some task failed and nothing can still make progress; tasks
///   downstream of a failure stay `pending` forever and are counted as
///   unable to progress
/// - running: some task has been claimed or has advanced past pending
/// - pending: otherwise
pub(crate) fn aggregate_status(tasks: &[Task]) -> WorkflowStatus {
    if tasks.is_empty() {
        return WorkflowStatus::Pending;
    }

    if tasks.iter().all(|t| t.status == TaskStatus::Complete) {
        return WorkflowStatus::Complete;
    }

    let any_failed = tasks.iter().any(|t| t.status == TaskStatus::Failed);
    if any_failed {
        let dead = dead_tasks(tasks);
        let nothing_can_progress = tasks
            .iter()
            .all(|t| t.status.is_terminal() || dead.contains(&t.node_key));
        if nothing_can_progress {
            return WorkflowStatus::Failed;
        }
    }

    let any_started = tasks.iter().any(|t| {
        t.claim.is_some() || t.status == TaskStatus::RunningRemote || t.status.is_terminal()
    });
    if any_started {
        WorkflowStatus::Running
    } else {
        WorkflowStatus::Pending
    }
}

/// Node keys of tasks that can never run because a (transitive) predecessor
/// failed.
fn dead_tasks(tasks: &[Task]) -> HashSet<NodeKey> {
    let status_by_key: HashMap<&NodeKey, TaskStatus> =
        tasks.iter().map(|t| (&t.node_key, t.status)).collect();

    let mut dead: HashSet<NodeKey> = HashSet::new();
    loop {
        let mut changed = false;
        for task in tasks {
            if task.status.is_terminal() || dead.contains(&task.node_key) {
                continue;
            }
            let blocked = task.upstream.iter().any(|key| {
                dead.contains(key)
                    || status_by_key.get(key).copied() == Some(TaskStatus::Failed)
            });
            if blocked {
                dead.insert(task.node_key.clone());
                changed = true;
            }
        }
        if !changed {
            return dead;
        }
    }
}

/// The earliest-failing task, used for the workflow's error record.
fn first_failure(tasks: &[Task]) -> Option<&Task> {
    tasks
        .iter()
        .filter(|t| t.status == TaskStatus::Failed)
        .min_by_key(|t| t.updated_at)
}
