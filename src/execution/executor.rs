//! Single-task execution with concurrency limiting, retries and timeouts.

use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::core::{TaskSpec, WorkError};

/// Default number of tasks allowed to run concurrently.
pub const DEFAULT_MAX_CONCURRENCY: usize = 4;

/// Terminal outcome of executing one task, retries included.
#[derive(Debug, Error)]
pub enum ExecuteError {
    /// Execution was cancelled before completing.
    #[error("task cancelled")]
    Cancelled,

    /// All attempts failed.
    #[error("task failed after {attempts} attempt(s)")]
    Failed {
        attempts: u32,
        #[source]
        source: WorkError,
    },
}

/// Runs individual tasks under a shared concurrency limit.
#[derive(Clone)]
pub struct TaskExecutor {
    semaphore: Arc<Semaphore>,
}

impl TaskExecutor {
    pub fn new(max_concurrency: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(max_concurrency.max(1))),
        }
    }

    /// Run a task's work against the given input values.
    ///
    /// Applies the task's retry policy and per-attempt timeout. Returns the
    /// produced outputs in the task's declared output order.
    pub async fn execute(
        &self,
        task: &TaskSpec,
        inputs: &[Value],
        cancel: &CancellationToken,
    ) -> Result<Vec<Value>, ExecuteError> {
        let _permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|_| ExecuteError::Cancelled)?;

        let mut attempts: u32 = 0;
        loop {
            if cancel.is_cancelled() {
                return Err(ExecuteError::Cancelled);
            }
            attempts += 1;

            let result = tokio::select! {
                _ = cancel.cancelled() => return Err(ExecuteError::Cancelled),
                result = Self::attempt(task, inputs) => result,
            };

            match result {
                Ok(outputs) => return Ok(outputs),
                Err(error) => {
                    if task.retry().allows_retry(attempts, &error) {
                        warn!(
                            task = %task.id(),
                            attempt = attempts,
                            %error,
                            "task attempt failed, retrying"
                        );
                        tokio::time::sleep(task.retry().delay).await;
                        continue;
                    }
                    return Err(ExecuteError::Failed {
                        attempts,
                        source: error,
                    });
                }
            }
        }
    }

    /// One attempt: run the work under the optional timeout and validate the
    /// output arity against the task's declaration.
    async fn attempt(task: &TaskSpec, inputs: &[Value]) -> Result<Vec<Value>, WorkError> {
        let outputs = match task.timeout() {
            Some(limit) => tokio::time::timeout(limit, task.work().run(inputs))
                .await
                .map_err(|_| WorkError::Timeout(limit))??,
            None => task.work().run(inputs).await?,
        };
        if outputs.len() != task.outputs().len() {
            return Err(WorkError::OutputArity {
                expected: task.outputs().len(),
                actual: outputs.len(),
            });
        }
        Ok(outputs)
    }
}

impl Default for TaskExecutor {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_CONCURRENCY)
    }
}
