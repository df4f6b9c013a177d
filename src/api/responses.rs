//! API response types.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::core::{Cycle, Job, Scenario, TaskRunState};
use crate::execution::ScenarioOutcome;
use crate::storage::StoredScenario;

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

impl Default for HealthResponse {
    fn default() -> Self {
        Self {
            status: "ok",
            version: env!("CARGO_PKG_VERSION"),
        }
    }
}

/// Generic message response.
#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

fn run_state_str(state: TaskRunState) -> &'static str {
    match state {
        TaskRunState::Pending => "pending",
        TaskRunState::FromCache => "from_cache",
    }
}

/// Per-task planned run state within a scenario response.
#[derive(Debug, Serialize)]
pub struct TaskPlanResponse {
    pub id: String,
    pub run_state: &'static str,
}

/// Scenario summary.
#[derive(Debug, Serialize)]
pub struct ScenarioResponse {
    pub id: String,
    pub name: String,
    pub config_id: String,
    pub data_node_count: usize,
    pub tasks: Vec<TaskPlanResponse>,
}

impl From<&Scenario> for ScenarioResponse {
    fn from(scenario: &Scenario) -> Self {
        let mut task_ids = scenario.task_ids();
        task_ids.sort();
        Self {
            id: scenario.id().to_string(),
            name: scenario.name().to_string(),
            config_id: scenario.config_id().to_string(),
            data_node_count: scenario.data_node_count(),
            tasks: task_ids
                .into_iter()
                .map(|id| TaskPlanResponse {
                    run_state: run_state_str(scenario.run_state(&id).unwrap_or_default()),
                    id: id.to_string(),
                })
                .collect(),
        }
    }
}

impl From<&StoredScenario> for ScenarioResponse {
    fn from(stored: &StoredScenario) -> Self {
        Self {
            id: stored.id.to_string(),
            name: stored.name.clone(),
            config_id: stored.config_id.to_string(),
            data_node_count: stored.data_nodes.len(),
            tasks: stored
                .tasks
                .iter()
                .map(|t| TaskPlanResponse {
                    id: t.id.to_string(),
                    run_state: run_state_str(t.run_state),
                })
                .collect(),
        }
    }
}

/// List of scenarios response.
#[derive(Debug, Serialize)]
pub struct ScenarioListResponse {
    pub scenarios: Vec<ScenarioResponse>,
    pub count: usize,
}

/// Job detail.
#[derive(Debug, Serialize)]
pub struct JobResponse {
    pub id: String,
    pub task_id: String,
    pub scenario_id: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub from_cache: bool,
    pub stack_trace: Option<String>,
}

impl From<&Job> for JobResponse {
    fn from(job: &Job) -> Self {
        Self {
            id: job.id().to_string(),
            task_id: job.task_id().to_string(),
            scenario_id: job.scenario_id().to_string(),
            status: format!("{:?}", job.status()).to_lowercase(),
            created_at: job.creation_date(),
            started_at: job.started_at(),
            ended_at: job.ended_at(),
            from_cache: job.is_from_cache(),
            stack_trace: job.stack_trace().map(String::from),
        }
    }
}

/// List of jobs response.
#[derive(Debug, Serialize)]
pub struct JobListResponse {
    pub jobs: Vec<JobResponse>,
    pub count: usize,
}

/// Result of a scenario submission.
#[derive(Debug, Serialize)]
pub struct SubmitResponse {
    pub scenario_id: String,
    pub success: bool,
    pub duration_ms: u64,
    pub jobs: Vec<JobResponse>,
}

impl From<&ScenarioOutcome> for SubmitResponse {
    fn from(outcome: &ScenarioOutcome) -> Self {
        Self {
            scenario_id: outcome.scenario_id.to_string(),
            success: outcome.success,
            duration_ms: outcome.duration.as_millis() as u64,
            jobs: outcome.jobs.iter().map(JobResponse::from).collect(),
        }
    }
}

/// Cycle detail.
#[derive(Debug, Serialize)]
pub struct CycleResponse {
    pub id: String,
    pub name: String,
    pub frequency: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub scenarios: Vec<String>,
}

impl From<&Cycle> for CycleResponse {
    fn from(cycle: &Cycle) -> Self {
        Self {
            id: cycle.id().to_string(),
            name: cycle.name().to_string(),
            frequency: format!("{:?}", cycle.frequency()).to_lowercase(),
            start: cycle.start(),
            end: cycle.end(),
            scenarios: cycle.scenarios().iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// List of cycles response.
#[derive(Debug, Serialize)]
pub struct CycleListResponse {
    pub cycles: Vec<CycleResponse>,
    pub count: usize,
}
