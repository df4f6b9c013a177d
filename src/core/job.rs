//! Jobs: single execution attempts of a task with a lifecycle state machine.
//!
//! A job is created when a scenario is submitted and moves through
//! `Submitted -> {Blocked | Pending} -> Running -> {Completed, Failed,
//! Cancelled}`. Terminal states are final; attempting a transition out of
//! one is an error.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::types::{JobId, ScenarioId, TaskId};

/// Illegal job state transition.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("illegal job transition: {from:?} -> {to:?}")]
pub struct TransitionError {
    pub from: JobStatus,
    pub to: JobStatus,
}

/// Lifecycle status of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobStatus {
    /// Accepted for execution, not yet classified as blocked or ready.
    Submitted,
    /// Waiting on upstream task completion.
    Blocked,
    /// Ready to run, not yet scheduled.
    Pending,
    /// Currently executing.
    Running,
    /// Finished successfully (possibly from cache).
    Completed,
    /// Finished with an error; a stack trace is recorded.
    Failed,
    /// Cancelled before reaching a terminal state on its own.
    Cancelled,
}

impl JobStatus {
    /// Whether this status is terminal.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }

    /// Whether a transition from `self` to `next` is legal.
    ///
    /// Running is only reachable from Pending; Cancelled is reachable from
    /// any non-terminal state; nothing leaves a terminal state.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        if next == JobStatus::Cancelled {
            return true;
        }
        matches!(
            (self, next),
            (JobStatus::Submitted, JobStatus::Blocked)
                | (JobStatus::Submitted, JobStatus::Pending)
                | (JobStatus::Blocked, JobStatus::Pending)
                | (JobStatus::Pending, JobStatus::Running)
                | (JobStatus::Running, JobStatus::Completed)
                | (JobStatus::Running, JobStatus::Failed)
        )
    }
}

/// One execution attempt of a task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    id: JobId,
    task_id: TaskId,
    scenario_id: ScenarioId,
    status: JobStatus,
    creation_date: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    ended_at: Option<DateTime<Utc>>,
    /// Set on failure; a rendering of the error chain.
    stack_trace: Option<String>,
    /// True if the job was completed from a cache entry without executing.
    from_cache: bool,
}

impl Job {
    /// Create a job for a task, in `Submitted` state.
    pub fn new(task_id: TaskId, scenario_id: ScenarioId) -> Self {
        Self {
            id: JobId::new(),
            task_id,
            scenario_id,
            status: JobStatus::Submitted,
            creation_date: Utc::now(),
            started_at: None,
            ended_at: None,
            stack_trace: None,
            from_cache: false,
        }
    }

    pub fn id(&self) -> &JobId {
        &self.id
    }

    pub fn task_id(&self) -> &TaskId {
        &self.task_id
    }

    pub fn scenario_id(&self) -> &ScenarioId {
        &self.scenario_id
    }

    pub fn status(&self) -> JobStatus {
        self.status
    }

    pub fn creation_date(&self) -> DateTime<Utc> {
        self.creation_date
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    pub fn ended_at(&self) -> Option<DateTime<Utc>> {
        self.ended_at
    }

    pub fn stack_trace(&self) -> Option<&str> {
        self.stack_trace.as_deref()
    }

    pub fn is_from_cache(&self) -> bool {
        self.from_cache
    }

    pub fn is_finished(&self) -> bool {
        self.status.is_terminal()
    }

    /// Apply a status transition, validating it against the state machine.
    pub fn transition(&mut self, next: JobStatus) -> Result<(), TransitionError> {
        if !self.status.can_transition_to(next) {
            return Err(TransitionError {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        Ok(())
    }

    /// Mark the job blocked on upstream completion.
    pub fn block(&mut self) -> Result<(), TransitionError> {
        self.transition(JobStatus::Blocked)
    }

    /// Mark the job ready to run.
    pub fn ready(&mut self) -> Result<(), TransitionError> {
        self.transition(JobStatus::Pending)
    }

    /// Mark the job running.
    pub fn start(&mut self) -> Result<(), TransitionError> {
        self.transition(JobStatus::Running)?;
        self.started_at = Some(Utc::now());
        Ok(())
    }

    /// Mark the job completed.
    pub fn complete(&mut self) -> Result<(), TransitionError> {
        self.transition(JobStatus::Completed)?;
        self.ended_at = Some(Utc::now());
        Ok(())
    }

    /// Complete the job from a cache entry without executing.
    ///
    /// Skips the Running state: the work never runs, the recorded output is
    /// supplied instead.
    pub fn complete_from_cache(&mut self) -> Result<(), TransitionError> {
        if self.status.is_terminal() {
            return Err(TransitionError {
                from: self.status,
                to: JobStatus::Completed,
            });
        }
        self.status = JobStatus::Completed;
        self.from_cache = true;
        self.ended_at = Some(Utc::now());
        Ok(())
    }

    /// Mark the job failed, recording the stack trace.
    pub fn fail(&mut self, stack_trace: impl Into<String>) -> Result<(), TransitionError> {
        self.transition(JobStatus::Failed)?;
        self.stack_trace = Some(stack_trace.into());
        self.ended_at = Some(Utc::now());
        Ok(())
    }

    /// Cancel the job. Legal from any non-terminal state.
    pub fn cancel(&mut self) -> Result<(), TransitionError> {
        self.transition(JobStatus::Cancelled)?;
        self.ended_at = Some(Utc::now());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job() -> Job {
        Job::new(TaskId::new("clean"), ScenarioId::new("s1"))
    }

    #[test]
    fn test_new_job_is_submitted() {
        let job = job();
        assert_eq!(job.status(), JobStatus::Submitted);
        assert!(!job.is_finished());
        assert!(job.stack_trace().is_none());
    }

    #[test]
    fn test_normal_lifecycle() {
        let mut job = job();
        job.block().unwrap();
        job.ready().unwrap();
        job.start().unwrap();
        job.complete().unwrap();

        assert_eq!(job.status(), JobStatus::Completed);
        assert!(job.started_at().is_some());
        assert!(job.ended_at().is_some());
    }

    #[test]
    fn test_running_only_from_pending() {
        let mut job = job();
        let err = job.start().unwrap_err();
        assert_eq!(err.from, JobStatus::Submitted);
        assert_eq!(err.to, JobStatus::Running);

        job.block().unwrap();
        assert!(job.start().is_err());

        job.ready().unwrap();
        assert!(job.start().is_ok());
    }

    #[test]
    fn test_failure_records_stack_trace() {
        let mut job = job();
        job.ready().unwrap();
        job.start().unwrap();
        job.fail("work failed: boom").unwrap();

        assert_eq!(job.status(), JobStatus::Failed);
        assert_eq!(job.stack_trace(), Some("work failed: boom"));
    }

    #[test]
    fn test_cancel_from_any_non_terminal_state() {
        for setup in [
            |_j: &mut Job| {},
            |j: &mut Job| j.block().unwrap(),
            |j: &mut Job| j.ready().unwrap(),
            |j: &mut Job| {
                j.ready().unwrap();
                j.start().unwrap();
            },
        ] {
            let mut job = job();
            setup(&mut job);
            assert!(job.cancel().is_ok());
            assert_eq!(job.status(), JobStatus::Cancelled);
        }
    }

    #[test]
    fn test_no_transition_out_of_terminal_states() {
        let mut completed = job();
        completed.ready().unwrap();
        completed.start().unwrap();
        completed.complete().unwrap();
        assert!(completed.cancel().is_err());
        assert!(completed.start().is_err());

        let mut failed = job();
        failed.ready().unwrap();
        failed.start().unwrap();
        failed.fail("boom").unwrap();
        assert!(failed.ready().is_err());
        assert!(failed.cancel().is_err());

        let mut cancelled = job();
        cancelled.cancel().unwrap();
        assert!(cancelled.ready().is_err());
        assert!(cancelled.complete().is_err());
    }

    #[test]
    fn test_complete_from_cache_skips_running() {
        let mut job = job();
        job.complete_from_cache().unwrap();

        assert_eq!(job.status(), JobStatus::Completed);
        assert!(job.is_from_cache());
        assert!(job.started_at().is_none());
        assert!(job.ended_at().is_some());
    }

    #[test]
    fn test_complete_from_cache_rejected_on_terminal_job() {
        let mut job = job();
        job.cancel().unwrap();
        assert!(job.complete_from_cache().is_err());
    }

    #[test]
    fn test_blocked_to_pending_when_upstream_completes() {
        let mut job = job();
        job.block().unwrap();
        job.ready().unwrap();
        assert_eq!(job.status(), JobStatus::Pending);
    }

    #[test]
    fn test_job_serde_round_trip() {
        let mut job = job();
        job.ready().unwrap();
        job.start().unwrap();
        job.fail("trace").unwrap();

        let encoded = serde_json::to_string(&job).unwrap();
        let decoded: Job = serde_json::from_str(&encoded).unwrap();

        assert_eq!(decoded.id(), job.id());
        assert_eq!(decoded.status(), JobStatus::Failed);
        assert_eq!(decoded.stack_trace(), Some("trace"));
    }
}
