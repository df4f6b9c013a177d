//! Persistence: serializable scenario snapshots and the repository trait.
//!
//! Work functions are not serializable, so scenarios are stored as
//! [`StoredScenario`] snapshots that reference works by registry name.
//! Loading a snapshot rebinds each task to its work through a
//! [`WorkRegistry`].

pub mod memory;
#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use memory::InMemoryRepository;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteRepository;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::config::WorkRegistry;
use crate::core::{
    Cycle, CycleId, DataNode, Job, JobId, RetryPolicy, Scenario, ScenarioId, TaskId, TaskRunState,
    TaskSpec,
};

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("duplicate key: {0}")]
    DuplicateKey(String),

    #[error("storage lock poisoned")]
    LockPoisoned,

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("unknown work function: {0}")]
    UnknownWork(String),

    #[error("stored scenario is invalid: {0}")]
    InvalidScenario(String),

    #[error("storage error: {0}")]
    Other(String),
}

/// Serializable form of a task. The work is referenced by name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredTask {
    pub id: TaskId,
    pub inputs: Vec<crate::core::DataNodeId>,
    pub outputs: Vec<crate::core::DataNodeId>,
    pub work: String,
    pub retry: RetryPolicy,
    pub timeout_seconds: Option<u64>,
    pub run_state: TaskRunState,
}

/// Serializable snapshot of a scenario.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredScenario {
    pub id: ScenarioId,
    pub name: String,
    pub config_id: crate::core::ConfigId,
    pub created_at: DateTime<Utc>,
    pub data_nodes: Vec<DataNode>,
    pub tasks: Vec<StoredTask>,
}

impl StoredScenario {
    /// Snapshot a live scenario. Tasks and nodes are recorded in id order
    /// so snapshots of equal scenarios are byte-identical.
    pub fn from_scenario(scenario: &Scenario) -> Self {
        let mut data_nodes: Vec<DataNode> = scenario.data_nodes().cloned().collect();
        data_nodes.sort_by(|a, b| a.id().cmp(b.id()));

        let mut task_ids = scenario.task_ids();
        task_ids.sort();
        let tasks = task_ids
            .iter()
            .filter_map(|id| scenario.task(id))
            .map(|task| StoredTask {
                id: task.id().clone(),
                inputs: task.inputs().to_vec(),
                outputs: task.outputs().to_vec(),
                work: task.work_name().to_string(),
                retry: task.retry().clone(),
                timeout_seconds: task.timeout().map(|t| t.as_secs()),
                run_state: scenario.run_state(task.id()).unwrap_or_default(),
            })
            .collect();

        Self {
            id: scenario.id().clone(),
            name: scenario.name().to_string(),
            config_id: scenario.config_id().clone(),
            created_at: Utc::now(),
            data_nodes,
            tasks,
        }
    }

    /// Rebuild a live scenario, rebinding works through the registry.
    pub fn into_scenario(self, registry: &WorkRegistry) -> Result<Scenario, StorageError> {
        let mut scenario = Scenario::new(self.id, self.name, self.config_id);
        for node in self.data_nodes {
            scenario
                .add_data_node(node)
                .map_err(|e| StorageError::InvalidScenario(e.to_string()))?;
        }
        for stored in self.tasks {
            let work = registry
                .get(&stored.work)
                .ok_or_else(|| StorageError::UnknownWork(stored.work.clone()))?;
            let mut task = TaskSpec::new(
                stored.id.clone(),
                stored.inputs,
                stored.outputs,
                stored.work,
                work,
            )
            .with_retry(stored.retry);
            if let Some(secs) = stored.timeout_seconds {
                task = task.with_timeout(Duration::from_secs(secs));
            }
            scenario
                .add_task(task)
                .map_err(|e| StorageError::InvalidScenario(e.to_string()))?;
            if stored.run_state == TaskRunState::FromCache {
                scenario
                    .mark_from_cache(&stored.id)
                    .map_err(|e| StorageError::InvalidScenario(e.to_string()))?;
            }
        }
        Ok(scenario)
    }
}

/// Persistence backend for scenarios, jobs and cycles.
#[async_trait]
pub trait Repository: Send + Sync {
    /// Insert a new scenario. Fails with `DuplicateKey` if the id exists.
    async fn save_scenario(&self, scenario: StoredScenario) -> Result<(), StorageError>;

    /// Replace an existing scenario.
    async fn update_scenario(&self, scenario: StoredScenario) -> Result<(), StorageError>;

    async fn get_scenario(&self, id: &ScenarioId) -> Result<StoredScenario, StorageError>;

    async fn list_scenarios(&self) -> Result<Vec<StoredScenario>, StorageError>;

    async fn delete_scenario(&self, id: &ScenarioId) -> Result<(), StorageError>;

    async fn save_job(&self, job: Job) -> Result<(), StorageError>;

    async fn update_job(&self, job: Job) -> Result<(), StorageError>;

    async fn get_job(&self, id: &JobId) -> Result<Job, StorageError>;

    /// Jobs belonging to a scenario, oldest first.
    async fn list_jobs(&self, scenario_id: &ScenarioId) -> Result<Vec<Job>, StorageError>;

    async fn save_cycle(&self, cycle: Cycle) -> Result<(), StorageError>;

    async fn update_cycle(&self, cycle: Cycle) -> Result<(), StorageError>;

    async fn get_cycle(&self, id: &CycleId) -> Result<Cycle, StorageError>;

    async fn list_cycles(&self) -> Result<Vec<Cycle>, StorageError>;

    async fn delete_cycle(&self, id: &CycleId) -> Result<(), StorageError>;
}
