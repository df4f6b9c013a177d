//! The scenario manager: creation, change detection, cached-output reuse,
//! duplication, submission and cancellation.

use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument};

use crate::cache::{CacheEntry, CacheError, CacheStore};
use crate::config::{build_scenario, ConfigError, ScenarioConfig, WorkRegistry};
use crate::core::{
    Cycle, CycleId, DataNodeId, Fingerprint, Job, JobId, JobStatus, Scenario, ScenarioError,
    ScenarioId, TaskId, TaskRunState,
};
use crate::events::{Event, EventBus};
use crate::execution::{
    executor::DEFAULT_MAX_CONCURRENCY, ExecutionError, ScenarioExecutor, ScenarioOutcome,
    TaskExecutor,
};
use crate::storage::{Repository, StorageError, StoredScenario};

#[derive(Debug, Error)]
pub enum ManagerError {
    #[error("scenario not found: {0}")]
    ScenarioNotFound(ScenarioId),

    #[error("no cache entry for task: {0}")]
    CacheMiss(TaskId),

    #[error("cache entry for task '{0}' does not match its current inputs")]
    StaleCache(TaskId),

    #[error("data node '{0}' is produced by a task and cannot be written directly")]
    ProducedNode(DataNodeId),

    #[error("scenario is already running: {0}")]
    AlreadyRunning(ScenarioId),

    #[error("scenario is not running: {0}")]
    NotRunning(ScenarioId),

    #[error(transparent)]
    Graph(#[from] ScenarioError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Execution(#[from] ExecutionError),
}

/// Orchestrates the scenario lifecycle over a repository, a cache and an
/// executor.
pub struct ScenarioManager {
    repo: Arc<dyn Repository>,
    registry: Arc<WorkRegistry>,
    cache: CacheStore,
    executor: ScenarioExecutor,
    bus: Arc<EventBus>,
    active: Mutex<HashMap<ScenarioId, CancellationToken>>,
}

impl ScenarioManager {
    pub fn new(repo: Arc<dyn Repository>, registry: Arc<WorkRegistry>) -> Self {
        Self::with_concurrency(repo, registry, DEFAULT_MAX_CONCURRENCY)
    }

    pub fn with_concurrency(
        repo: Arc<dyn Repository>,
        registry: Arc<WorkRegistry>,
        max_concurrency: usize,
    ) -> Self {
        let bus = Arc::new(EventBus::new());
        Self {
            repo,
            registry,
            cache: CacheStore::new(),
            executor: ScenarioExecutor::new(TaskExecutor::new(max_concurrency), bus.clone()),
            bus,
            active: Mutex::new(HashMap::new()),
        }
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    pub fn cache(&self) -> &CacheStore {
        &self.cache
    }

    pub fn registry(&self) -> &Arc<WorkRegistry> {
        &self.registry
    }

    /// Build a scenario from a config and persist it.
    #[instrument(skip(self, config), fields(config_id = %config.id))]
    pub async fn create_scenario(
        &self,
        config: &ScenarioConfig,
    ) -> Result<Scenario, ManagerError> {
        let scenario = build_scenario(config, &self.registry)?;
        self.repo
            .save_scenario(StoredScenario::from_scenario(&scenario))
            .await?;
        info!(scenario = %scenario.id(), "scenario created");
        Ok(scenario)
    }

    /// Load a scenario, rebinding works through the registry.
    pub async fn get_scenario(&self, id: &ScenarioId) -> Result<Scenario, ManagerError> {
        let stored = self.repo.get_scenario(id).await.map_err(|e| match e {
            StorageError::NotFound(_) => ManagerError::ScenarioNotFound(id.clone()),
            other => ManagerError::Storage(other),
        })?;
        Ok(stored.into_scenario(&self.registry)?)
    }

    pub async fn list_scenarios(&self) -> Result<Vec<StoredScenario>, ManagerError> {
        Ok(self.repo.list_scenarios().await?)
    }

    pub async fn delete_scenario(&self, id: &ScenarioId) -> Result<(), ManagerError> {
        self.repo.delete_scenario(id).await.map_err(|e| match e {
            StorageError::NotFound(_) => ManagerError::ScenarioNotFound(id.clone()),
            other => ManagerError::Storage(other),
        })
    }

    /// Replace the value of a source data node and persist the scenario.
    ///
    /// Only source nodes may be written from outside; produced nodes belong
    /// to their producing task. The new value gets a fresh fingerprint, so
    /// consumers of the node will register as changed.
    pub async fn set_data_node_value(
        &self,
        id: &ScenarioId,
        node_id: &DataNodeId,
        value: serde_json::Value,
    ) -> Result<(), ManagerError> {
        let mut scenario = self.get_scenario(id).await?;
        if scenario.producer(node_id).is_some() {
            return Err(ManagerError::ProducedNode(node_id.clone()));
        }
        let node = scenario
            .data_node_mut(node_id)
            .ok_or_else(|| ScenarioError::DataNodeNotFound(node_id.clone()))?;
        node.write(value, &[]);
        self.repo
            .update_scenario(StoredScenario::from_scenario(&scenario))
            .await?;
        Ok(())
    }

    /// Whether a task's inputs differ from those recorded at its last
    /// successful execution.
    ///
    /// A task with no cache entry counts as changed: with nothing to reuse
    /// it must execute.
    pub fn has_data_node_changed(
        &self,
        scenario: &Scenario,
        task_id: &TaskId,
    ) -> Result<bool, ManagerError> {
        let Some(entry) = self.cache.get(task_id)? else {
            return Ok(true);
        };
        let current = self.input_fingerprints(scenario, task_id)?;
        Ok(!entry.matches(&current))
    }

    /// Satisfy a task from its cache entry instead of executing it.
    ///
    /// Installs the recorded outputs (with their recorded fingerprints) into
    /// the scenario's data nodes and marks the task as from-cache. Fails
    /// loudly when no entry exists or the entry no longer matches the task's
    /// current inputs; silently running stale data is worse than failing.
    pub fn add_task_with_cached_output(
        &self,
        scenario: &mut Scenario,
        task_id: &TaskId,
    ) -> Result<(), ManagerError> {
        let entry = self
            .cache
            .get(task_id)?
            .ok_or_else(|| ManagerError::CacheMiss(task_id.clone()))?;
        let current = self.input_fingerprints(scenario, task_id)?;
        if !entry.matches(&current) {
            return Err(ManagerError::StaleCache(task_id.clone()));
        }

        let outputs = scenario
            .task(task_id)
            .ok_or_else(|| ScenarioError::TaskNotFound(task_id.clone()))?
            .outputs()
            .to_vec();
        for ((node_id, value), fingerprint) in outputs
            .iter()
            .zip(entry.outputs)
            .zip(entry.output_fingerprints)
        {
            let node = scenario
                .data_node_mut(node_id)
                .ok_or_else(|| ScenarioError::DataNodeNotFound(node_id.clone()))?;
            node.write_cached(value, fingerprint);
        }
        scenario.mark_from_cache(task_id)?;
        Ok(())
    }

    /// Duplicate a scenario under a fresh id, reusing cached outputs for
    /// every task whose inputs are unchanged.
    ///
    /// Walks the copy in topological order. A task must re-execute when its
    /// inputs changed against the cache, or when any upstream producer is
    /// itself re-executing: a matching fingerprint is meaningless while the
    /// value it was computed from is about to be replaced. The original
    /// scenario is never modified. The copy is persisted before being
    /// returned, so a returned duplicate is always retrievable.
    #[instrument(skip(self))]
    pub async fn duplicate_scenario(&self, id: &ScenarioId) -> Result<Scenario, ManagerError> {
        let original = self.get_scenario(id).await?;
        let mut copy = original.fork(
            ScenarioId::random(),
            format!("Duplicate of {}", original.name()),
        );

        for task_id in copy.topological_sort()? {
            let producer_rerunning = copy
                .task(&task_id)
                .map(|t| t.inputs().to_vec())
                .unwrap_or_default()
                .iter()
                .any(|node| {
                    copy.producer(node)
                        .map(|p| copy.run_state(p) == Some(TaskRunState::Pending))
                        .unwrap_or(false)
                });

            if producer_rerunning || self.has_data_node_changed(&copy, &task_id)? {
                continue;
            }
            self.add_task_with_cached_output(&mut copy, &task_id)?;
        }

        self.repo
            .save_scenario(StoredScenario::from_scenario(&copy))
            .await?;
        info!(original = %id, duplicate = %copy.id(), "scenario duplicated");
        Ok(copy)
    }

    /// Submit a scenario for execution.
    ///
    /// Runs the scenario to completion, persists its jobs and updated data
    /// nodes, and records cache entries for every task that executed
    /// successfully. At most one run per scenario may be in flight.
    #[instrument(skip(self))]
    pub async fn submit(&self, id: &ScenarioId) -> Result<ScenarioOutcome, ManagerError> {
        let mut scenario = self.get_scenario(id).await?;

        let token = CancellationToken::new();
        {
            let mut active = self.active.lock().await;
            if active.contains_key(id) {
                return Err(ManagerError::AlreadyRunning(id.clone()));
            }
            active.insert(id.clone(), token.clone());
        }

        self.bus.emit(Event::scenario_submitted(id.clone())).await;
        let result = self.executor.run(&mut scenario, token).await;
        self.active.lock().await.remove(id);
        let outcome = result?;

        for job in &outcome.jobs {
            self.repo.save_job(job.clone()).await?;
        }
        for job in &outcome.jobs {
            if job.status() == JobStatus::Completed && !job.is_from_cache() {
                self.record_cache_entry(&scenario, job.task_id())?;
            }
        }
        self.repo
            .update_scenario(StoredScenario::from_scenario(&scenario))
            .await?;

        self.bus
            .emit(Event::scenario_completed(
                id.clone(),
                outcome.success,
                outcome.duration.as_millis() as u64,
            ))
            .await;
        info!(scenario = %id, success = outcome.success, "scenario run finished");
        Ok(outcome)
    }

    /// Cancel an in-flight run. Running jobs are interrupted; queued jobs
    /// never start.
    pub async fn cancel(&self, id: &ScenarioId) -> Result<(), ManagerError> {
        let active = self.active.lock().await;
        match active.get(id) {
            Some(token) => {
                token.cancel();
                Ok(())
            }
            None => Err(ManagerError::NotRunning(id.clone())),
        }
    }

    pub async fn get_job(&self, id: &JobId) -> Result<Job, ManagerError> {
        Ok(self.repo.get_job(id).await?)
    }

    pub async fn list_jobs(&self, scenario_id: &ScenarioId) -> Result<Vec<Job>, ManagerError> {
        Ok(self.repo.list_jobs(scenario_id).await?)
    }

    pub async fn save_cycle(&self, cycle: Cycle) -> Result<(), ManagerError> {
        Ok(self.repo.save_cycle(cycle).await?)
    }

    pub async fn update_cycle(&self, cycle: Cycle) -> Result<(), ManagerError> {
        Ok(self.repo.update_cycle(cycle).await?)
    }

    pub async fn get_cycle(&self, id: &CycleId) -> Result<Cycle, ManagerError> {
        Ok(self.repo.get_cycle(id).await?)
    }

    pub async fn list_cycles(&self) -> Result<Vec<Cycle>, ManagerError> {
        Ok(self.repo.list_cycles().await?)
    }

    pub async fn delete_cycle(&self, id: &CycleId) -> Result<(), ManagerError> {
        Ok(self.repo.delete_cycle(id).await?)
    }

    fn input_fingerprints(
        &self,
        scenario: &Scenario,
        task_id: &TaskId,
    ) -> Result<Vec<Fingerprint>, ManagerError> {
        let task = scenario
            .task(task_id)
            .ok_or_else(|| ScenarioError::TaskNotFound(task_id.clone()))?;
        task.inputs()
            .iter()
            .map(|n| {
                scenario
                    .data_node(n)
                    .map(|d| d.fingerprint().clone())
                    .ok_or_else(|| ScenarioError::DataNodeNotFound(n.clone()).into())
            })
            .collect()
    }

    fn record_cache_entry(
        &self,
        scenario: &Scenario,
        task_id: &TaskId,
    ) -> Result<(), ManagerError> {
        let task = scenario
            .task(task_id)
            .ok_or_else(|| ScenarioError::TaskNotFound(task_id.clone()))?;
        let input_fingerprints = self.input_fingerprints(scenario, task_id)?;
        let mut outputs = Vec::with_capacity(task.outputs().len());
        let mut output_fingerprints = Vec::with_capacity(task.outputs().len());
        for node_id in task.outputs() {
            let node = scenario
                .data_node(node_id)
                .ok_or_else(|| ScenarioError::DataNodeNotFound(node_id.clone()))?;
            outputs.push(node.value().clone());
            output_fingerprints.push(node.fingerprint().clone());
        }
        self.cache.record(CacheEntry::new(
            task_id.clone(),
            input_fingerprints,
            outputs,
            output_fingerprints,
        ))?;
        Ok(())
    }
}
