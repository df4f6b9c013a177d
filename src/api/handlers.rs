//! API request handlers.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;

use crate::config::ScenarioConfig;
use crate::core::{Cycle, CycleId, DataNodeId, Frequency, JobId, ScenarioId};
use crate::manager::ScenarioManager;

use super::errors::ApiError;
use super::responses::{
    CycleListResponse, CycleResponse, HealthResponse, JobListResponse, JobResponse,
    MessageResponse, ScenarioListResponse, ScenarioResponse, SubmitResponse,
};

/// Shared application state for API handlers.
#[derive(Clone)]
pub struct ApiState {
    pub manager: Arc<ScenarioManager>,
    /// Configs available for scenario creation, keyed by config id.
    pub configs: Arc<HashMap<String, ScenarioConfig>>,
}

impl ApiState {
    pub fn new(manager: Arc<ScenarioManager>, configs: Vec<ScenarioConfig>) -> Self {
        let configs = configs.into_iter().map(|c| (c.id.clone(), c)).collect();
        Self {
            manager,
            configs: Arc::new(configs),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateScenarioRequest {
    pub config_id: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct CreateScenarioQuery {
    pub config_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateCycleRequest {
    pub id: String,
    pub name: String,
    pub frequency: Frequency,
    pub start: DateTime<Utc>,
}

/// Health check endpoint.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse::default())
}

/// Create a scenario from a registered config.
///
/// The config id is taken from the `config_id` query parameter or, absent
/// that, from a JSON body.
pub async fn create_scenario(
    State(state): State<ApiState>,
    Query(query): Query<CreateScenarioQuery>,
    body: Option<Json<CreateScenarioRequest>>,
) -> Result<(StatusCode, Json<ScenarioResponse>), ApiError> {
    let config_id = query
        .config_id
        .or_else(|| body.map(|Json(request)| request.config_id))
        .ok_or_else(|| ApiError::BadRequest("missing config_id".to_string()))?;
    let config = state
        .configs
        .get(&config_id)
        .ok_or_else(|| ApiError::BadRequest(format!("unknown config: {config_id}")))?;
    let scenario = state.manager.create_scenario(config).await?;
    Ok((StatusCode::CREATED, Json(ScenarioResponse::from(&scenario))))
}

/// List all scenarios.
pub async fn list_scenarios(
    State(state): State<ApiState>,
) -> Result<Json<ScenarioListResponse>, ApiError> {
    let stored = state.manager.list_scenarios().await?;
    let scenarios: Vec<ScenarioResponse> = stored.iter().map(ScenarioResponse::from).collect();
    let count = scenarios.len();
    Ok(Json(ScenarioListResponse { scenarios, count }))
}

/// Get a scenario by id.
pub async fn get_scenario(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Result<Json<ScenarioResponse>, ApiError> {
    let scenario = state.manager.get_scenario(&ScenarioId::new(id)).await?;
    Ok(Json(ScenarioResponse::from(&scenario)))
}

/// Delete a scenario.
pub async fn delete_scenario(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Result<Json<MessageResponse>, ApiError> {
    let id = ScenarioId::new(id);
    state.manager.delete_scenario(&id).await?;
    Ok(Json(MessageResponse {
        message: format!("scenario {} deleted", id),
    }))
}

/// Duplicate a scenario, reusing cached outputs where inputs are unchanged.
pub async fn duplicate_scenario(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Result<(StatusCode, Json<ScenarioResponse>), ApiError> {
    let copy = state
        .manager
        .duplicate_scenario(&ScenarioId::new(id))
        .await?;
    Ok((StatusCode::CREATED, Json(ScenarioResponse::from(&copy))))
}

/// Submit a scenario for execution and wait for the outcome.
pub async fn submit_scenario(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Result<Json<SubmitResponse>, ApiError> {
    let outcome = state.manager.submit(&ScenarioId::new(id)).await?;
    Ok(Json(SubmitResponse::from(&outcome)))
}

/// Cancel an in-flight scenario run.
pub async fn cancel_scenario(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Result<Json<MessageResponse>, ApiError> {
    let id = ScenarioId::new(id);
    state.manager.cancel(&id).await?;
    Ok(Json(MessageResponse {
        message: format!("scenario {} cancellation requested", id),
    }))
}

#[derive(Debug, Deserialize)]
pub struct SetDataNodeRequest {
    pub value: serde_json::Value,
}

/// Write a new value into a source data node.
pub async fn set_data_node(
    State(state): State<ApiState>,
    Path((id, node_id)): Path<(String, String)>,
    Json(request): Json<SetDataNodeRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    let node_id = DataNodeId::new(node_id);
    state
        .manager
        .set_data_node_value(&ScenarioId::new(id), &node_id, request.value)
        .await?;
    Ok(Json(MessageResponse {
        message: format!("data node {} updated", node_id),
    }))
}

/// List the jobs of a scenario.
pub async fn list_scenario_jobs(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Result<Json<JobListResponse>, ApiError> {
    let id = ScenarioId::new(id);
    // Listing jobs of an unknown scenario is a 404, not an empty list.
    state.manager.get_scenario(&id).await?;
    let jobs: Vec<JobResponse> = state
        .manager
        .list_jobs(&id)
        .await?
        .iter()
        .map(JobResponse::from)
        .collect();
    let count = jobs.len();
    Ok(Json(JobListResponse { jobs, count }))
}

/// Get a job by id.
pub async fn get_job(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Result<Json<JobResponse>, ApiError> {
    let id = JobId::parse(&id).map_err(|_| ApiError::BadRequest(format!("invalid job id: {id}")))?;
    let job = state.manager.get_job(&id).await?;
    Ok(Json(JobResponse::from(&job)))
}

/// Create a cycle.
pub async fn create_cycle(
    State(state): State<ApiState>,
    Json(request): Json<CreateCycleRequest>,
) -> Result<(StatusCode, Json<CycleResponse>), ApiError> {
    if request.id.is_empty() {
        return Err(ApiError::BadRequest("cycle id is empty".to_string()));
    }
    let cycle = Cycle::new(request.id, request.name, request.frequency, request.start);
    state.manager.save_cycle(cycle.clone()).await?;
    Ok((StatusCode::CREATED, Json(CycleResponse::from(&cycle))))
}

/// List all cycles.
pub async fn list_cycles(
    State(state): State<ApiState>,
) -> Result<Json<CycleListResponse>, ApiError> {
    let cycles: Vec<CycleResponse> = state
        .manager
        .list_cycles()
        .await?
        .iter()
        .map(CycleResponse::from)
        .collect();
    let count = cycles.len();
    Ok(Json(CycleListResponse { cycles, count }))
}

/// Get a cycle by id.
pub async fn get_cycle(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Result<Json<CycleResponse>, ApiError> {
    let cycle = state.manager.get_cycle(&CycleId::new(id)).await?;
    Ok(Json(CycleResponse::from(&cycle)))
}

/// Delete a cycle.
pub async fn delete_cycle(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Result<Json<MessageResponse>, ApiError> {
    let id = CycleId::new(id);
    state.manager.delete_cycle(&id).await?;
    Ok(Json(MessageResponse {
        message: format!("cycle {} deleted", id),
    }))
}

/// Attach a scenario to a cycle.
pub async fn attach_scenario_to_cycle(
    State(state): State<ApiState>,
    Path((cycle_id, scenario_id)): Path<(String, String)>,
) -> Result<Json<CycleResponse>, ApiError> {
    let scenario_id = ScenarioId::new(scenario_id);
    // The scenario must exist before it can be attached.
    state.manager.get_scenario(&scenario_id).await?;

    let mut cycle = state.manager.get_cycle(&CycleId::new(cycle_id)).await?;
    cycle.add_scenario(scenario_id);
    state.manager.update_cycle(cycle.clone()).await?;
    Ok(Json(CycleResponse::from(&cycle)))
}

/// Detach a scenario from a cycle.
pub async fn detach_scenario_from_cycle(
    State(state): State<ApiState>,
    Path((cycle_id, scenario_id)): Path<(String, String)>,
) -> Result<Json<CycleResponse>, ApiError> {
    let mut cycle = state.manager.get_cycle(&CycleId::new(cycle_id)).await?;
    if !cycle.remove_scenario(&ScenarioId::new(scenario_id.clone())) {
        return Err(ApiError::NotFound(format!(
            "scenario {} is not attached to cycle {}",
            scenario_id,
            cycle.id()
        )));
    }
    state.manager.update_cycle(cycle.clone()).await?;
    Ok(Json(CycleResponse::from(&cycle)))
}
