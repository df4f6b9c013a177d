//! Scenario execution: a semaphore-limited task executor and a wave-based
//! scenario executor that honors the job state machine.

pub mod executor;
pub mod scenario_executor;

pub use executor::{ExecuteError, TaskExecutor};
pub use scenario_executor::{ScenarioExecutor, ScenarioOutcome};

use thiserror::Error;

use crate::core::{ScenarioError, TransitionError};

/// Errors surfaced while driving a scenario to completion.
///
/// Individual task failures are not errors at this level; they are recorded
/// on the corresponding jobs.
#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error(transparent)]
    Graph(#[from] ScenarioError),

    #[error(transparent)]
    Transition(#[from] TransitionError),

    #[error("task worker panicked: {0}")]
    Join(String),
}
