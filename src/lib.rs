//! tempo - a scenario orchestration engine with fingerprint-based caching.
//!
//! Scenarios are acyclic graphs of pure tasks exchanging JSON data nodes.
//! Every data node carries a fingerprint derived from its value and its
//! upstream lineage; the engine uses fingerprints to detect changed inputs,
//! reuse cached task outputs, and duplicate scenarios cheaply.

pub mod api;
pub mod cache;
pub mod config;
pub mod core;
pub mod events;
pub mod execution;
pub mod manager;
pub mod storage;
pub mod testing;

pub use cache::{CacheEntry, CacheStore};
pub use config::{build_scenario, ScenarioConfig, WorkRegistry};
pub use core::{
    Cycle, CycleId, DataNode, DataNodeId, Fingerprint, Frequency, Job, JobId, JobStatus,
    RetryCondition, RetryPolicy, Scenario, ScenarioBuilder, ScenarioId, TaskId, TaskRunState,
    TaskSpec, Work, WorkError,
};
pub use events::{Event, EventBus, EventHandler};
pub use execution::{ScenarioExecutor, ScenarioOutcome, TaskExecutor};
pub use manager::{ManagerError, ScenarioManager};
pub use storage::{InMemoryRepository, Repository, StoredScenario};
#[cfg(feature = "sqlite")]
pub use storage::SqliteRepository;
