//! Core domain model: identifiers, data nodes, tasks, jobs, scenarios and
//! cycles.

pub mod cycle;
pub mod data_node;
pub mod job;
pub mod scenario;
pub mod task;
pub mod types;

pub use cycle::{Cycle, Frequency};
pub use data_node::{DataNode, Fingerprint};
pub use job::{Job, JobStatus, TransitionError};
pub use scenario::{Scenario, ScenarioBuilder, ScenarioError, TaskRunState};
pub use task::{RetryCondition, RetryPolicy, TaskSpec, Work, WorkError};
pub use types::{ConfigId, CycleId, DataNodeId, JobId, ScenarioId, TaskId};
