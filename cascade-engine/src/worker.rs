//! Worker loop and per-task execution state machine.
//!
//! A worker competes for claims on the ready queue and drives one task at a
//! time from claim to terminal status: compose the execute request, call the
//! service, poll long-running executions, and write the outcome back to the
//! store. Workers never raise errors upward; every failure becomes a state
//! transition (retry, terminal failure, or silent abandonment when the
//! claim is lost).

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::watch;

use cascade_client::ControlApi;
use cascade_core::domain::{DataReference, ServiceEndpoint, Task, TaskStatus, Workflow};
use cascade_core::dto::control::{ExecuteRequest, RemoteStatus};
use cascade_core::error::{ErrorKind, TaskError};
use cascade_store::{ClaimOutcome, Store};

use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::scheduler::Scheduler;

/// Result of driving one claimed task.
enum Outcome {
    Complete(DataReference),
    Failed(TaskError),
    /// Another worker owns the claim now; leave the task alone.
    ClaimLost,
    /// Store failure mid-drive; leave the claim to expire so another worker
    /// picks the task up.
    Abandoned,
}

pub struct Worker {
    id: String,
    store: Arc<dyn Store>,
    control: Arc<dyn ControlApi>,
    scheduler: Scheduler,
    config: EngineConfig,
}

impl Worker {
    pub fn new(
        id: impl Into<String>,
        store: Arc<dyn Store>,
        control: Arc<dyn ControlApi>,
        config: EngineConfig,
    ) -> Self {
        let scheduler = Scheduler::new(store.clone());
        Self {
            id: id.into(),
            store,
            control,
            scheduler,
            config,
        }
    }

    /// Runs the claim loop until shutdown is signalled.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        tracing::info!(worker_id = %self.id, "worker loop started");

        loop {
            if *shutdown.borrow() {
                break;
            }

            match self.run_once().await {
                Ok(true) => continue,
                Ok(false) => {
                    tracing::trace!(worker_id = %self.id, "ready queue empty");
                }
                Err(e) => {
                    tracing::error!(worker_id = %self.id, error = %e, "claim cycle failed");
                }
            }

            tokio::select! {
                _ = tokio::time::sleep(self.config.poll_interval) => {}
                _ = shutdown.changed() => {}
            }
        }

        tracing::info!(worker_id = %self.id, "worker loop stopped");
    }

    /// Claims and drives at most one task. Returns false when the queue was
    /// empty.
    pub async fn run_once(&self) -> Result<bool, EngineError> {
        let Some(task) = self
            .store
            .claim_one(&self.id, self.config.claim_lease)
            .await?
        else {
            return Ok(false);
        };

        tracing::info!(
            worker_id = %self.id,
            task_id = %task.id,
            node_key = %task.node_key,
            attempt = task.attempts,
            "task claimed"
        );
        self.drive(task).await;
        Ok(true)
    }

    async fn drive(&self, mut task: Task) {
        let workflow = match self.store.get_workflow(task.workflow_id).await {
            Ok(Some(workflow)) => workflow,
            Ok(None) => {
                tracing::warn!(
                    task_id = %task.id,
                    workflow_id = %task.workflow_id,
                    "workflow gone, dropping claim"
                );
                let _ = self.store.release_claim(task.id, &self.id).await;
                return;
            }
            Err(e) => {
                tracing::error!(task_id = %task.id, error = %e, "workflow load failed, abandoning");
                return;
            }
        };

        // endpoint coverage was validated at submit; a miss here is an
        // invariant breach, handled by letting the claim expire
        let Some(endpoint) = workflow
            .dockerinfo
            .endpoint(&task.node_key.container)
            .cloned()
        else {
            tracing::error!(
                task_id = %task.id,
                container = %task.node_key.container,
                "no endpoint for claimed task, abandoning"
            );
            return;
        };

        task.status = TaskStatus::RunningRemote;
        task.touch();
        if let Err(e) = self.store.put_task(&task).await {
            tracing::error!(task_id = %task.id, error = %e, "status write failed, abandoning");
            return;
        }

        match self.execute_remote(&task, &endpoint).await {
            Outcome::Complete(output) => self.finish_complete(task, output, &workflow).await,
            Outcome::Failed(error)
                if error.kind.is_retriable() && task.attempts < self.config.max_attempts =>
            {
                self.requeue_for_retry(task, error).await
            }
            Outcome::Failed(error) => self.finish_failed(task, error).await,
            Outcome::ClaimLost => {
                tracing::warn!(
                    worker_id = %self.id,
                    task_id = %task.id,
                    "claim lost, abandoning task"
                );
            }
            Outcome::Abandoned => {
                tracing::error!(
                    worker_id = %self.id,
                    task_id = %task.id,
                    "abandoning task, claim will expire"
                );
            }
        }
    }

    /// Calls the service and, for long-running executions, polls it to a
    /// terminal answer.
    async fn execute_remote(&self, task: &Task, endpoint: &ServiceEndpoint) -> Outcome {
        let request = ExecuteRequest {
            method: task.node_key.operation.clone(),
            workflow_id: task.workflow_id,
            task_id: task.id,
            inputs: task.resolved_inputs(),
            parameters: serde_json::Map::new(),
        };

        let started = Instant::now();
        let response = match self.control.execute(endpoint, &request).await {
            Ok(response) => response,
            Err(e) => return Outcome::Failed(TaskError::transport(e.to_string())),
        };

        match response.status {
            RemoteStatus::Complete => match response.output {
                Some(output) => Outcome::Complete(output),
                // the control contract says complete implies output
                None => Outcome::Failed(TaskError::transport(
                    "service reported complete without an output",
                )),
            },
            RemoteStatus::Failed => Outcome::Failed(TaskError::service(
                response
                    .error
                    .unwrap_or_else(|| "service returned failed status".to_string()),
            )),
            RemoteStatus::Running => match response.task_id {
                Some(remote_id) => self.poll_remote(task, endpoint, &remote_id, started).await,
                None => Outcome::Failed(TaskError::transport(
                    "service reported running without a task id",
                )),
            },
        }
    }

    async fn poll_remote(
        &self,
        task: &Task,
        endpoint: &ServiceEndpoint,
        remote_id: &str,
        started: Instant,
    ) -> Outcome {
        let mut last_heartbeat = Instant::now();

        loop {
            tokio::time::sleep(self.config.poll_interval).await;

            if let Some(timeout) = self.config.remote_timeout {
                if started.elapsed() >= timeout {
                    return Outcome::Failed(TaskError::new(
                        ErrorKind::RemoteTimeout,
                        format!("remote execution exceeded {:?}", timeout),
                    ));
                }
            }

            if last_heartbeat.elapsed() >= self.config.claim_lease / 2 {
                match self
                    .store
                    .extend_claim(task.id, &self.id, self.config.claim_lease)
                    .await
                {
                    Ok(ClaimOutcome::Held) => last_heartbeat = Instant::now(),
                    Ok(ClaimOutcome::Lost) => return Outcome::ClaimLost,
                    Err(e) => {
                        tracing::error!(task_id = %task.id, error = %e, "heartbeat failed");
                        return Outcome::Abandoned;
                    }
                }
            }

            let status = match self.control.status(endpoint, remote_id).await {
                Ok(status) => status,
                Err(e) => return Outcome::Failed(TaskError::transport(e.to_string())),
            };

            match status.status {
                RemoteStatus::Running => {
                    if let Some(progress) = status.progress {
                        tracing::debug!(task_id = %task.id, progress, "remote progress");
                    }
                }
                RemoteStatus::Failed => {
                    return Outcome::Failed(TaskError::service(
                        status
                            .error
                            .unwrap_or_else(|| "remote task failed".to_string()),
                    ));
                }
                RemoteStatus::Complete => {
                    return match self.control.output(endpoint, remote_id).await {
                        Ok(output) => Outcome::Complete(output),
                        Err(e) => Outcome::Failed(TaskError::transport(e.to_string())),
                    };
                }
            }
        }
    }

    async fn finish_complete(&self, mut task: Task, output: DataReference, workflow: &Workflow) {
        task.output = Some(output);
        task.status = TaskStatus::Complete;
        task.error = None;
        task.touch();

        if let Err(e) = self.store.put_task(&task).await {
            tracing::error!(task_id = %task.id, error = %e, "result write failed, abandoning");
            return;
        }

        tracing::info!(
            worker_id = %self.id,
            task_id = %task.id,
            node_key = %task.node_key,
            "task complete"
        );

        if let Err(e) = self.scheduler.on_task_complete(&task, workflow).await {
            tracing::error!(
                task_id = %task.id,
                error = %e,
                "successor promotion failed"
            );
        }

        if let Err(e) = self.store.release_claim(task.id, &self.id).await {
            tracing::warn!(task_id = %task.id, error = %e, "claim release failed");
        }
    }

    async fn finish_failed(&self, mut task: Task, error: TaskError) {
        tracing::warn!(
            worker_id = %self.id,
            task_id = %task.id,
            node_key = %task.node_key,
            kind = ?error.kind,
            message = %error.message,
            "task failed"
        );

        task.status = TaskStatus::Failed;
        task.error = Some(error);
        task.claim = None;
        task.touch();

        if let Err(e) = self.store.put_task(&task).await {
            tracing::error!(task_id = %task.id, error = %e, "failure write failed, abandoning");
        }
    }

    /// Puts a transport-failed task back on the queue after an exponential
    /// backoff. The claim is stretched over the backoff sleep so the
    /// recovery sweeper cannot hand the task out early.
    async fn requeue_for_retry(&self, mut task: Task, error: TaskError) {
        let backoff = self.retry_backoff(task.attempts);
        tracing::warn!(
            worker_id = %self.id,
            task_id = %task.id,
            attempt = task.attempts,
            max_attempts = self.config.max_attempts,
            backoff_ms = backoff.as_millis() as u64,
            message = %error.message,
            "transport failure, requeueing"
        );

        let _ = self
            .store
            .extend_claim(task.id, &self.id, backoff + self.config.claim_lease)
            .await;
        tokio::time::sleep(backoff).await;

        task.status = TaskStatus::Ready;
        task.error = None;
        task.claim = None;
        task.touch();

        if let Err(e) = self.store.put_task(&task).await {
            tracing::error!(task_id = %task.id, error = %e, "requeue write failed, abandoning");
            return;
        }
        if let Err(e) = self.store.enqueue_ready(task.id).await {
            tracing::error!(task_id = %task.id, error = %e, "re-enqueue failed, abandoning");
        }
    }

    fn retry_backoff(&self, attempts: u32) -> std::time::Duration {
        let exponent = attempts.saturating_sub(1).min(16);
        let backoff = self
            .config
            .retry_backoff_base
            .saturating_mul(2u32.saturating_pow(exponent));
        backoff.min(self.config.retry_backoff_cap)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinator::Coordinator;
    use crate::testing::{
        diamond_blueprint, dockerinfo_json, inline, linear_blueprint, FakeControl,
        ScriptedExecute,
    };
    use cascade_core::domain::{NodeKey, Protocol, WorkflowStatus};
    use cascade_core::dto::control::{ExecuteResponse, StatusResponse};
    use cascade_store::MemoryStore;
    use std::time::Duration;

    fn test_config() -> EngineConfig {
        EngineConfig {
            poll_interval: Duration::from_millis(2),
            claim_lease: Duration::from_secs(5),
            max_attempts: 3,
            retry_backoff_base: Duration::from_millis(1),
            retry_backoff_cap: Duration::from_millis(4),
            ..Default::default()
        }
    }

    struct Harness {
        store: Arc<MemoryStore>,
        coordinator: Coordinator,
        control: Arc<FakeControl>,
        worker: Worker,
    }

    fn harness(config: EngineConfig) -> Harness {
        let store = Arc::new(MemoryStore::new());
        let coordinator = Coordinator::new(store.clone());
        let control = Arc::new(FakeControl::new());
        let worker = Worker::new("worker-1", store.clone(), control.clone(), config);
        Harness {
            store,
            coordinator,
            control,
            worker,
        }
    }

    async fn drain(worker: &Worker) {
        while worker.run_once().await.unwrap() {}
    }

    fn task_by_container<'a>(tasks: &'a [Task], container: &str) -> &'a Task {
        tasks
            .iter()
            .find(|t| t.node_key.container == container)
            .unwrap()
    }

    #[tokio::test]
    async fn test_linear_pipeline_completes() {
        let h = harness(test_config());
        let workflow = h
            .coordinator
            .submit(
                linear_blueprint(&["a", "b", "c"]),
                dockerinfo_json(&["a", "b", "c"]),
                vec![],
            )
            .await
            .unwrap();

        drain(&h.worker).await;

        let observed = h.coordinator.observe(workflow.id).await.unwrap();
        assert_eq!(observed.status, WorkflowStatus::Complete);
        assert!(observed.terminal_at.is_some());

        let tasks = h.store.list_tasks(workflow.id).await.unwrap();
        assert_eq!(tasks.len(), 3);
        assert!(tasks.iter().all(|t| t.status == TaskStatus::Complete));
        assert!(tasks.iter().all(|t| t.claim.is_none()));

        let (a, b, c) = (
            task_by_container(&tasks, "a"),
            task_by_container(&tasks, "b"),
            task_by_container(&tasks, "c"),
        );
        // sources execute with empty inputs on a zero-input submit
        assert!(a.resolved_inputs().is_empty());
        assert_eq!(b.resolved_inputs(), vec![a.output.clone().unwrap()]);
        assert_eq!(c.resolved_inputs(), vec![b.output.clone().unwrap()]);

        assert_eq!(
            h.control.calls(),
            vec!["execute:a", "execute:b", "execute:c"]
        );
    }

    #[tokio::test]
    async fn test_transport_error_retries_then_completes() {
        let h = harness(test_config());
        h.control
            .script_execute("b", ScriptedExecute::TransportError(503));

        let workflow = h
            .coordinator
            .submit(
                linear_blueprint(&["a", "b", "c"]),
                dockerinfo_json(&["a", "b", "c"]),
                vec![],
            )
            .await
            .unwrap();

        drain(&h.worker).await;

        let observed = h.coordinator.observe(workflow.id).await.unwrap();
        assert_eq!(observed.status, WorkflowStatus::Complete);

        let tasks = h.store.list_tasks(workflow.id).await.unwrap();
        let b = task_by_container(&tasks, "b");
        assert_eq!(b.status, TaskStatus::Complete);
        assert_eq!(b.attempts, 2);
        assert!(b.error.is_none());
    }

    #[tokio::test]
    async fn test_transport_errors_exhaust_attempt_cap() {
        let h = harness(test_config());
        for _ in 0..3 {
            h.control
                .script_execute("b", ScriptedExecute::TransportError(503));
        }

        let workflow = h
            .coordinator
            .submit(
                linear_blueprint(&["a", "b", "c"]),
                dockerinfo_json(&["a", "b", "c"]),
                vec![],
            )
            .await
            .unwrap();

        drain(&h.worker).await;

        let tasks = h.store.list_tasks(workflow.id).await.unwrap();
        let b = task_by_container(&tasks, "b");
        assert_eq!(b.status, TaskStatus::Failed);
        assert_eq!(b.attempts, 3);
        assert_eq!(b.error.as_ref().unwrap().kind, ErrorKind::TransportError);

        let observed = h.coordinator.observe(workflow.id).await.unwrap();
        assert_eq!(observed.status, WorkflowStatus::Failed);
    }

    #[tokio::test]
    async fn test_service_failure_is_terminal() {
        let h = harness(test_config());
        h.control.script_execute(
            "b",
            ScriptedExecute::Response(ExecuteResponse {
                status: RemoteStatus::Failed,
                task_id: None,
                output: None,
                error: Some("bad input".to_string()),
            }),
        );

        let workflow = h
            .coordinator
            .submit(
                linear_blueprint(&["a", "b", "c"]),
                dockerinfo_json(&["a", "b", "c"]),
                vec![],
            )
            .await
            .unwrap();

        drain(&h.worker).await;

        let tasks = h.store.list_tasks(workflow.id).await.unwrap();
        assert_eq!(task_by_container(&tasks, "a").status, TaskStatus::Complete);
        let b = task_by_container(&tasks, "b");
        assert_eq!(b.status, TaskStatus::Failed);
        assert_eq!(b.attempts, 1);
        let error = b.error.as_ref().unwrap();
        assert_eq!(error.kind, ErrorKind::ServiceError);
        assert_eq!(error.message, "bad input");
        // downstream of the failure stays pending forever
        assert_eq!(task_by_container(&tasks, "c").status, TaskStatus::Pending);

        let observed = h.coordinator.observe(workflow.id).await.unwrap();
        assert_eq!(observed.status, WorkflowStatus::Failed);
        let workflow_error = observed.error.unwrap();
        assert!(workflow_error.contains(&b.id.to_string()));
        assert!(workflow_error.contains("bad input"));
    }

    #[tokio::test]
    async fn test_long_running_task_polls_to_completion() {
        let h = harness(test_config());
        h.control.script_execute(
            "b",
            ScriptedExecute::Response(ExecuteResponse {
                status: RemoteStatus::Running,
                task_id: Some("rt-1".to_string()),
                output: None,
                error: None,
            }),
        );
        for progress in [33, 66, 99] {
            h.control.script_status(
                "rt-1",
                StatusResponse {
                    status: RemoteStatus::Running,
                    progress: Some(progress),
                    error: None,
                },
            );
        }
        h.control.script_status(
            "rt-1",
            StatusResponse {
                status: RemoteStatus::Complete,
                progress: None,
                error: None,
            },
        );
        let remote_output = DataReference {
            protocol: Protocol::Http,
            uri: "http://b/data/rt-1".to_string(),
            format: "csv".to_string(),
        };
        h.control.script_output("rt-1", remote_output.clone());

        let workflow = h
            .coordinator
            .submit(
                linear_blueprint(&["a", "b", "c"]),
                dockerinfo_json(&["a", "b", "c"]),
                vec![],
            )
            .await
            .unwrap();

        drain(&h.worker).await;

        let tasks = h.store.list_tasks(workflow.id).await.unwrap();
        let b = task_by_container(&tasks, "b");
        assert_eq!(b.status, TaskStatus::Complete);
        assert_eq!(b.output.as_ref(), Some(&remote_output));
        // the polled output propagates downstream
        assert_eq!(
            task_by_container(&tasks, "c").resolved_inputs(),
            vec![remote_output]
        );

        let observed = h.coordinator.observe(workflow.id).await.unwrap();
        assert_eq!(observed.status, WorkflowStatus::Complete);
    }

    #[tokio::test]
    async fn test_remote_poll_failure_is_service_error() {
        let h = harness(test_config());
        h.control.script_execute(
            "a",
            ScriptedExecute::Response(ExecuteResponse {
                status: RemoteStatus::Running,
                task_id: Some("rt-2".to_string()),
                output: None,
                error: None,
            }),
        );
        h.control.script_status(
            "rt-2",
            StatusResponse {
                status: RemoteStatus::Failed,
                progress: None,
                error: Some("crunch failed".to_string()),
            },
        );

        let workflow = h
            .coordinator
            .submit(linear_blueprint(&["a"]), dockerinfo_json(&["a"]), vec![])
            .await
            .unwrap();

        drain(&h.worker).await;

        let tasks = h.store.list_tasks(workflow.id).await.unwrap();
        let a = task_by_container(&tasks, "a");
        assert_eq!(a.status, TaskStatus::Failed);
        let error = a.error.as_ref().unwrap();
        assert_eq!(error.kind, ErrorKind::ServiceError);
        assert_eq!(error.message, "crunch failed");
    }

    #[tokio::test]
    async fn test_remote_timeout_is_non_retriable() {
        let mut config = test_config();
        config.remote_timeout = Some(Duration::from_millis(20));
        let h = harness(config);

        h.control.script_execute(
            "a",
            ScriptedExecute::Response(ExecuteResponse {
                status: RemoteStatus::Running,
                task_id: Some("rt-9".to_string()),
                output: None,
                error: None,
            }),
        );
        // no scripted statuses: the fake keeps answering running

        let workflow = h
            .coordinator
            .submit(linear_blueprint(&["a"]), dockerinfo_json(&["a"]), vec![])
            .await
            .unwrap();

        drain(&h.worker).await;

        let tasks = h.store.list_tasks(workflow.id).await.unwrap();
        let a = task_by_container(&tasks, "a");
        assert_eq!(a.status, TaskStatus::Failed);
        assert_eq!(a.error.as_ref().unwrap().kind, ErrorKind::RemoteTimeout);
        assert_eq!(a.attempts, 1);

        let observed = h.coordinator.observe(workflow.id).await.unwrap();
        assert_eq!(observed.status, WorkflowStatus::Failed);
    }

    #[tokio::test]
    async fn test_lease_recovery_hands_task_to_second_worker() {
        let h = harness(test_config());
        let workflow = h
            .coordinator
            .submit(linear_blueprint(&["b"]), dockerinfo_json(&["b"]), vec![])
            .await
            .unwrap();

        // worker-0 claims with a tiny lease and dies before doing anything
        let claimed = h
            .store
            .claim_one("worker-0", Duration::from_millis(5))
            .await
            .unwrap()
            .unwrap();
        tokio::time::sleep(Duration::from_millis(25)).await;

        let recovered = h.store.recover_expired().await.unwrap();
        assert_eq!(recovered, vec![claimed.id]);

        drain(&h.worker).await;

        let observed = h.coordinator.observe(workflow.id).await.unwrap();
        assert_eq!(observed.status, WorkflowStatus::Complete);

        let tasks = h.store.list_tasks(workflow.id).await.unwrap();
        let b = task_by_container(&tasks, "b");
        assert_eq!(b.status, TaskStatus::Complete);
        assert_eq!(b.attempts, 2);
    }

    #[tokio::test]
    async fn test_claim_lost_mid_poll_abandons_silently() {
        let mut config = test_config();
        config.claim_lease = Duration::from_millis(20);
        let h = harness(config);

        h.control.script_execute(
            "a",
            ScriptedExecute::Response(ExecuteResponse {
                status: RemoteStatus::Running,
                task_id: Some("rt-3".to_string()),
                output: None,
                error: None,
            }),
        );
        // unscripted statuses keep the worker polling until the heartbeat
        // notices the claim is gone

        let workflow = h
            .coordinator
            .submit(linear_blueprint(&["a"]), dockerinfo_json(&["a"]), vec![])
            .await
            .unwrap();
        let task_id = workflow.task_ids[0];

        let worker = h.worker;
        let store = h.store.clone();
        let handle = tokio::spawn(async move { worker.run_once().await });

        // steal the claim while the worker is polling
        tokio::time::sleep(Duration::from_millis(8)).await;
        let mut stolen = store.get_task(task_id).await.unwrap().unwrap();
        stolen.claim = Some(cascade_core::domain::Claim {
            owner: "worker-2".to_string(),
            expires_at: chrono::Utc::now() + chrono::Duration::seconds(60),
        });
        store.put_task(&stolen).await.unwrap();

        handle.await.unwrap().unwrap();

        // the abandoning worker must not have touched the record
        let task = store.get_task(task_id).await.unwrap().unwrap();
        assert_eq!(task.status, TaskStatus::RunningRemote);
        assert_eq!(task.claim.unwrap().owner, "worker-2");
    }

    #[tokio::test]
    async fn test_diamond_join_waits_for_both_branches() {
        let h = harness(test_config());
        let workflow = h
            .coordinator
            .submit(
                diamond_blueprint(),
                dockerinfo_json(&["a", "b", "c", "d"]),
                vec![],
            )
            .await
            .unwrap();

        // source first
        assert!(h.worker.run_once().await.unwrap());
        let tasks = h.store.list_tasks(workflow.id).await.unwrap();
        assert_eq!(task_by_container(&tasks, "a").status, TaskStatus::Complete);
        assert_eq!(task_by_container(&tasks, "d").status, TaskStatus::Pending);

        // one branch done: the join still has an unresolved slot
        assert!(h.worker.run_once().await.unwrap());
        let tasks = h.store.list_tasks(workflow.id).await.unwrap();
        let d = task_by_container(&tasks, "d");
        assert_eq!(d.status, TaskStatus::Pending);
        assert!(!d.inputs_resolved());

        drain(&h.worker).await;

        let observed = h.coordinator.observe(workflow.id).await.unwrap();
        assert_eq!(observed.status, WorkflowStatus::Complete);

        let tasks = h.store.list_tasks(workflow.id).await.unwrap();
        let d = task_by_container(&tasks, "d");
        let b_output = task_by_container(&tasks, "b").output.clone().unwrap();
        let c_output = task_by_container(&tasks, "c").output.clone().unwrap();
        // join inputs are ordered by producer node key, not completion order
        assert_eq!(d.inputs.len(), 2);
        assert_eq!(d.resolved_inputs(), vec![b_output, c_output]);
        assert_eq!(
            d.upstream,
            vec![NodeKey::new("b", "run"), NodeKey::new("c", "run")]
        );

        // execution order: source, branches in key order, then the join
        assert_eq!(
            h.control.calls(),
            vec!["execute:a", "execute:b", "execute:c", "execute:d"]
        );
    }

    #[tokio::test]
    async fn test_initial_inputs_reach_sources() {
        let h = harness(test_config());
        let seed = inline("seed");
        let workflow = h
            .coordinator
            .submit(
                linear_blueprint(&["a", "b"]),
                dockerinfo_json(&["a", "b"]),
                vec![seed.clone()],
            )
            .await
            .unwrap();

        drain(&h.worker).await;

        let requests = h.control.execute_requests();
        let a_request = requests
            .iter()
            .find(|r| r.method == "run" && r.inputs == vec![seed.clone()])
            .unwrap();
        assert_eq!(a_request.workflow_id, workflow.id);
    }
}
