//! Task definitions: the pure computation steps of a scenario.
//!
//! A task declares ordered input and output data nodes and carries a
//! [`Work`] implementation that maps input values to output values. Tasks
//! must be pure: the same inputs always yield the same outputs, which is
//! what makes output caching sound.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use super::types::{DataNodeId, TaskId};

/// Errors raised by a task's work function.
#[derive(Debug, Error)]
pub enum WorkError {
    /// Work failed with a message.
    #[error("work failed: {0}")]
    Failed(String),

    /// A transient error that may succeed on retry.
    #[error("transient error: {0}")]
    Transient(String),

    /// Work exceeded the task's timeout.
    #[error("work timed out after {0:?}")]
    Timeout(Duration),

    /// Work returned the wrong number of outputs for the declared output nodes.
    #[error("expected {expected} outputs, work produced {actual}")]
    OutputArity { expected: usize, actual: usize },

    /// Generic error wrapper.
    #[error(transparent)]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

impl WorkError {
    /// Whether this error is considered transient (eligible for retry).
    pub fn is_transient(&self) -> bool {
        matches!(self, WorkError::Transient(_) | WorkError::Timeout(_))
    }
}

/// The executable part of a task.
///
/// Receives one value per declared input node, in declaration order, and
/// must return one value per declared output node, in declaration order.
#[async_trait]
pub trait Work: Send + Sync {
    async fn run(&self, inputs: &[Value]) -> Result<Vec<Value>, WorkError>;
}

/// Conditions under which a failed attempt is retried.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum RetryCondition {
    /// Retry on any error.
    #[default]
    Always,

    /// Retry only on transient errors (timeouts, temporary failures).
    TransientOnly,

    /// Never retry, regardless of `max_attempts`.
    Never,
}

/// Retry policy for a task.
///
/// `max_attempts` counts retries only; `max_attempts = 2` means up to three
/// total attempts (one initial plus two retries).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum number of retries after the initial attempt.
    pub max_attempts: u32,

    /// Fixed delay between attempts, in whole seconds when serialized.
    #[serde(with = "delay_seconds")]
    pub delay: Duration,

    /// When to retry.
    pub retry_on: RetryCondition,
}

impl RetryPolicy {
    /// No retries.
    pub fn none() -> Self {
        Self {
            max_attempts: 0,
            delay: Duration::ZERO,
            retry_on: RetryCondition::Never,
        }
    }

    /// Fixed-delay retries on any error.
    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            delay,
            retry_on: RetryCondition::Always,
        }
    }

    /// Builder: set the retry condition.
    pub fn with_condition(mut self, condition: RetryCondition) -> Self {
        self.retry_on = condition;
        self
    }

    /// Whether a retry is allowed for the given error after `attempts`
    /// attempts have already been made.
    pub fn allows_retry(&self, attempts: u32, error: &WorkError) -> bool {
        if attempts > self.max_attempts {
            return false;
        }
        match self.retry_on {
            RetryCondition::Always => true,
            RetryCondition::TransientOnly => error.is_transient(),
            RetryCondition::Never => false,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::none()
    }
}

mod delay_seconds {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        d.as_secs().serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs(u64::deserialize(d)?))
    }
}

/// A task: ordered input nodes, ordered output nodes, and a work function.
///
/// Inputs are read-only from the task's perspective. Two task specs with the
/// same id and declarations but different works are indistinguishable to the
/// engine; purity is the implementor's contract.
#[derive(Clone)]
pub struct TaskSpec {
    id: TaskId,
    inputs: Vec<DataNodeId>,
    outputs: Vec<DataNodeId>,
    work_name: String,
    work: Arc<dyn Work>,
    retry: RetryPolicy,
    timeout: Option<Duration>,
}

impl std::fmt::Debug for TaskSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskSpec")
            .field("id", &self.id)
            .field("inputs", &self.inputs)
            .field("outputs", &self.outputs)
            .field("work_name", &self.work_name)
            .field("retry", &self.retry)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl TaskSpec {
    /// Create a new task.
    pub fn new(
        id: impl Into<TaskId>,
        inputs: Vec<DataNodeId>,
        outputs: Vec<DataNodeId>,
        work_name: impl Into<String>,
        work: Arc<dyn Work>,
    ) -> Self {
        Self {
            id: id.into(),
            inputs,
            outputs,
            work_name: work_name.into(),
            work,
            retry: RetryPolicy::none(),
            timeout: None,
        }
    }

    /// Builder: set the retry policy.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Builder: set a per-attempt timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Get the task id.
    pub fn id(&self) -> &TaskId {
        &self.id
    }

    /// Ordered input data node ids.
    pub fn inputs(&self) -> &[DataNodeId] {
        &self.inputs
    }

    /// Ordered output data node ids.
    pub fn outputs(&self) -> &[DataNodeId] {
        &self.outputs
    }

    /// Registry name of the work function.
    pub fn work_name(&self) -> &str {
        &self.work_name
    }

    /// The work implementation.
    pub fn work(&self) -> &Arc<dyn Work> {
        &self.work
    }

    /// The retry policy.
    pub fn retry(&self) -> &RetryPolicy {
        &self.retry
    }

    /// The per-attempt timeout, if any.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }
}
