//! Drives a whole scenario: jobs, waves, caching short-circuits and
//! fail-fast cancellation.
//!
//! Execution proceeds in waves. Each wave runs every task whose upstream
//! jobs have completed, joins them, writes their outputs into the scenario's
//! data nodes, then promotes newly unblocked tasks. Tasks marked as
//! satisfied from cache complete immediately without running. When a task
//! fails, its transitive dependents are cancelled while independent branches
//! keep running.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::Value;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::core::{
    Fingerprint, Job, JobStatus, Scenario, ScenarioError, ScenarioId, TaskId, TaskRunState,
};
use crate::events::{Event, EventBus};

use super::executor::{ExecuteError, TaskExecutor};
use super::ExecutionError;

/// Result of driving a scenario to completion.
#[derive(Debug)]
pub struct ScenarioOutcome {
    pub scenario_id: ScenarioId,
    /// True when every job completed (from execution or cache).
    pub success: bool,
    pub duration: Duration,
    /// Final jobs in topological order.
    pub jobs: Vec<Job>,
}

impl ScenarioOutcome {
    pub fn job(&self, task_id: &TaskId) -> Option<&Job> {
        self.jobs.iter().find(|j| j.task_id() == task_id)
    }

    pub fn failed_jobs(&self) -> impl Iterator<Item = &Job> {
        self.jobs
            .iter()
            .filter(|j| j.status() == JobStatus::Failed)
    }
}

/// Executes scenarios wave by wave.
pub struct ScenarioExecutor {
    tasks: TaskExecutor,
    bus: Arc<EventBus>,
}

impl ScenarioExecutor {
    pub fn new(tasks: TaskExecutor, bus: Arc<EventBus>) -> Self {
        Self { tasks, bus }
    }

    /// Run the scenario, mutating its data nodes with produced outputs.
    ///
    /// Task failures do not abort the run; they are recorded on the jobs and
    /// reflected in the outcome's `success` flag.
    pub async fn run(
        &self,
        scenario: &mut Scenario,
        cancel: CancellationToken,
    ) -> Result<ScenarioOutcome, ExecutionError> {
        let started = Instant::now();
        let order = scenario.topological_sort()?;
        info!(scenario = %scenario.id(), tasks = order.len(), "starting scenario run");

        let mut jobs: HashMap<TaskId, Job> = order
            .iter()
            .map(|id| (id.clone(), Job::new(id.clone(), scenario.id().clone())))
            .collect();

        // Initial classification in topological order. Cached tasks complete
        // on the spot, which lets their direct consumers start ready.
        for id in &order {
            if scenario.run_state(id) == Some(TaskRunState::FromCache) {
                let job = job_mut(&mut jobs, id)?;
                let from = job.status();
                job.complete_from_cache()?;
                self.emit_status(job, from).await;
                self.bus
                    .emit(Event::task_from_cache(id.clone(), scenario.id().clone()))
                    .await;
                continue;
            }
            let deps = scenario.dependencies(id)?;
            let all_done = deps
                .iter()
                .all(|d| status_of(&jobs, d) == Some(JobStatus::Completed));
            let job = job_mut(&mut jobs, id)?;
            let from = job.status();
            if all_done {
                job.ready()?;
            } else {
                job.block()?;
            }
            self.emit_status(job, from).await;
        }

        loop {
            if cancel.is_cancelled() {
                warn!(scenario = %scenario.id(), "run cancelled");
                for id in &order {
                    let job = job_mut(&mut jobs, id)?;
                    if !job.is_finished() {
                        let from = job.status();
                        job.cancel()?;
                        self.emit_status(job, from).await;
                    }
                }
                break;
            }

            // Promote blocked jobs whose upstreams finished; cancel those
            // whose upstreams failed or were cancelled.
            for id in &order {
                if status_of(&jobs, id) != Some(JobStatus::Blocked) {
                    continue;
                }
                let deps = scenario.dependencies(id)?;
                let upstream_broken = deps.iter().any(|d| {
                    matches!(
                        status_of(&jobs, d),
                        Some(JobStatus::Failed) | Some(JobStatus::Cancelled)
                    )
                });
                let all_done = deps
                    .iter()
                    .all(|d| status_of(&jobs, d) == Some(JobStatus::Completed));

                if upstream_broken {
                    let job = job_mut(&mut jobs, id)?;
                    let from = job.status();
                    job.cancel()?;
                    self.emit_status(job, from).await;
                } else if all_done {
                    let job = job_mut(&mut jobs, id)?;
                    let from = job.status();
                    job.ready()?;
                    self.emit_status(job, from).await;
                }
            }

            let wave: Vec<TaskId> = order
                .iter()
                .filter(|id| status_of(&jobs, id) == Some(JobStatus::Pending))
                .cloned()
                .collect();
            if wave.is_empty() {
                break;
            }

            let mut running = JoinSet::new();
            for id in wave {
                let task = scenario
                    .task(&id)
                    .cloned()
                    .ok_or_else(|| ScenarioError::TaskNotFound(id.clone()))?;
                let inputs = collect_values(scenario, task.inputs())?;

                let job = job_mut(&mut jobs, &id)?;
                let from = job.status();
                job.start()?;
                self.emit_status(job, from).await;

                let executor = self.tasks.clone();
                let token = cancel.clone();
                running.spawn(async move {
                    let result = executor.execute(&task, &inputs, &token).await;
                    (id, result)
                });
            }

            while let Some(joined) = running.join_next().await {
                let (id, result) = joined.map_err(|e| ExecutionError::Join(e.to_string()))?;
                match result {
                    Ok(outputs) => {
                        self.install_outputs(scenario, &id, outputs)?;
                        let job = job_mut(&mut jobs, &id)?;
                        let from = job.status();
                        job.complete()?;
                        self.emit_status(job, from).await;
                    }
                    Err(ExecuteError::Cancelled) => {
                        let job = job_mut(&mut jobs, &id)?;
                        let from = job.status();
                        job.cancel()?;
                        self.emit_status(job, from).await;
                    }
                    Err(error) => {
                        warn!(scenario = %scenario.id(), task = %id, %error, "task failed");
                        let job = job_mut(&mut jobs, &id)?;
                        let from = job.status();
                        job.fail(render_stack_trace(&error))?;
                        self.emit_status(job, from).await;
                    }
                }
            }
        }

        let success = jobs.values().all(|j| j.status() == JobStatus::Completed);
        let jobs = order
            .iter()
            .filter_map(|id| jobs.remove(id))
            .collect::<Vec<_>>();

        Ok(ScenarioOutcome {
            scenario_id: scenario.id().clone(),
            success,
            duration: started.elapsed(),
            jobs,
        })
    }

    /// Write a completed task's outputs into the scenario, fingerprinted
    /// with the task's current input lineage.
    fn install_outputs(
        &self,
        scenario: &mut Scenario,
        task_id: &TaskId,
        outputs: Vec<Value>,
    ) -> Result<(), ExecutionError> {
        let task = scenario
            .task(task_id)
            .cloned()
            .ok_or_else(|| ScenarioError::TaskNotFound(task_id.clone()))?;
        let lineage = collect_fingerprints(scenario, task.inputs())?;
        for (node_id, value) in task.outputs().iter().zip(outputs) {
            let node = scenario
                .data_node_mut(node_id)
                .ok_or_else(|| ScenarioError::DataNodeNotFound(node_id.clone()))?;
            node.write(value, &lineage);
        }
        Ok(())
    }

    async fn emit_status(&self, job: &Job, from: JobStatus) {
        self.bus
            .emit(Event::job_status_changed(
                job.id().clone(),
                job.task_id().clone(),
                job.scenario_id().clone(),
                from,
                job.status(),
            ))
            .await;
    }
}

fn job_mut<'a>(
    jobs: &'a mut HashMap<TaskId, Job>,
    id: &TaskId,
) -> Result<&'a mut Job, ExecutionError> {
    jobs.get_mut(id)
        .ok_or_else(|| ScenarioError::TaskNotFound(id.clone()).into())
}

fn status_of(jobs: &HashMap<TaskId, Job>, id: &TaskId) -> Option<JobStatus> {
    jobs.get(id).map(|j| j.status())
}

fn collect_values(scenario: &Scenario, nodes: &[crate::core::DataNodeId]) -> Result<Vec<Value>, ExecutionError> {
    nodes
        .iter()
        .map(|n| {
            scenario
                .data_node(n)
                .map(|d| d.value().clone())
                .ok_or_else(|| ScenarioError::DataNodeNotFound(n.clone()).into())
        })
        .collect()
}

fn collect_fingerprints(
    scenario: &Scenario,
    nodes: &[crate::core::DataNodeId],
) -> Result<Vec<Fingerprint>, ExecutionError> {
    nodes
        .iter()
        .map(|n| {
            scenario
                .data_node(n)
                .map(|d| d.fingerprint().clone())
                .ok_or_else(|| ScenarioError::DataNodeNotFound(n.clone()).into())
        })
        .collect()
}

/// Render an error and its cause chain as a job stack trace.
fn render_stack_trace(error: &ExecuteError) -> String {
    let mut out = error.to_string();
    let mut source = std::error::Error::source(error);
    while let Some(cause) = source {
        out.push_str("\ncaused by: ");
        out.push_str(&cause.to_string());
        source = cause.source();
    }
    out
}
