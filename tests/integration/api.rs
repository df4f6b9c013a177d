//! HTTP API integration tests.

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tempo::api::{build_router, ApiState};
use tempo::config::ScenarioConfig;

use crate::common;

async fn api_state() -> (ApiState, common::Pipeline) {
    let pipeline = common::pipeline().await;
    let config = ScenarioConfig::from_str(common::PIPELINE_CONFIG).unwrap();
    let state = ApiState::new(pipeline.manager.clone(), vec![config]);
    (state, pipeline)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

fn send_json(method: Method, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn post(uri: &str) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

async fn call(state: &ApiState, request: Request<Body>) -> (StatusCode, Value) {
    use tower::ServiceExt;

    let response = build_router(state.clone()).oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}

#[tokio::test]
async fn test_health_endpoint() {
    let (state, _pipeline) = api_state().await;

    let (status, body) = call(&state, get("/api/health")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert!(body["version"].is_string());
}

#[tokio::test]
async fn test_create_scenario_from_config() {
    let (state, _pipeline) = api_state().await;

    let (status, body) = call(
        &state,
        send_json(
            Method::POST,
            "/api/v1/scenarios",
            json!({"config_id": "pipeline"}),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["name"], "Pipeline");
    assert_eq!(body["config_id"], "pipeline");
    assert_eq!(body["tasks"].as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn test_create_scenario_via_query_parameter() {
    let (state, _pipeline) = api_state().await;

    let (status, body) = call(&state, post("/api/v1/scenarios?config_id=pipeline")).await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["config_id"], "pipeline");
}

#[tokio::test]
async fn test_create_scenario_without_config_id() {
    let (state, _pipeline) = api_state().await;

    let (status, body) = call(&state, post("/api/v1/scenarios")).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "BAD_REQUEST");
}

#[tokio::test]
async fn test_create_scenario_with_unknown_config() {
    let (state, _pipeline) = api_state().await;

    let (status, body) = call(
        &state,
        send_json(
            Method::POST,
            "/api/v1/scenarios",
            json!({"config_id": "nope"}),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "BAD_REQUEST");
}

#[tokio::test]
async fn test_get_unknown_scenario_is_404() {
    let (state, _pipeline) = api_state().await;

    let (status, body) = call(&state, get("/api/v1/scenarios/ghost")).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_submit_and_list_jobs() {
    let (state, pipeline) = api_state().await;
    let id = pipeline.scenario_id.as_str();

    let (status, body) = call(&state, post(&format!("/api/v1/scenarios/{id}/submit"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["jobs"].as_array().unwrap().len(), 3);
    assert!(body["jobs"]
        .as_array()
        .unwrap()
        .iter()
        .all(|j| j["status"] == "completed"));

    let (status, body) = call(&state, get(&format!("/api/v1/scenarios/{id}/jobs"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 3);

    // Individual job lookup by id.
    let job_id = body["jobs"][0]["id"].as_str().unwrap().to_string();
    let (status, body) = call(&state, get(&format!("/api/v1/jobs/{job_id}"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "completed");
}

#[tokio::test]
async fn test_jobs_of_unknown_scenario_is_404() {
    let (state, _pipeline) = api_state().await;

    let (status, _body) = call(&state, get("/api/v1/scenarios/ghost/jobs")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_malformed_job_id_is_400() {
    let (state, _pipeline) = api_state().await;

    let (status, _body) = call(&state, get("/api/v1/jobs/not-a-uuid")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_duplicate_endpoint_returns_cached_plan() {
    let (state, pipeline) = api_state().await;
    let id = pipeline.scenario_id.as_str();

    call(&state, post(&format!("/api/v1/scenarios/{id}/submit"))).await;

    let (status, body) =
        call(&state, post(&format!("/api/v1/scenarios/{id}/duplicate"))).await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["name"], "Duplicate of Pipeline");
    assert!(body["tasks"]
        .as_array()
        .unwrap()
        .iter()
        .all(|t| t["run_state"] == "from_cache"));
}

#[tokio::test]
async fn test_cancel_without_active_run_is_409() {
    let (state, pipeline) = api_state().await;
    let id = pipeline.scenario_id.as_str();

    let (status, body) = call(&state, post(&format!("/api/v1/scenarios/{id}/cancel"))).await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "CONFLICT");
}

#[tokio::test]
async fn test_delete_scenario() {
    let (state, pipeline) = api_state().await;
    let id = pipeline.scenario_id.as_str();

    let (status, _body) = call(
        &state,
        Request::builder()
            .method(Method::DELETE)
            .uri(format!("/api/v1/scenarios/{id}"))
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _body) = call(&state, get(&format!("/api/v1/scenarios/{id}"))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_set_data_node_value() {
    let (state, pipeline) = api_state().await;
    let id = pipeline.scenario_id.as_str();

    let (status, _body) = call(
        &state,
        send_json(
            Method::PUT,
            &format!("/api/v1/scenarios/{id}/data_nodes/src"),
            json!({"value": 42}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    // Produced nodes cannot be written from outside.
    let (status, _body) = call(
        &state,
        send_json(
            Method::PUT,
            &format!("/api/v1/scenarios/{id}/data_nodes/cleaned"),
            json!({"value": 42}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_cycle_lifecycle() {
    let (state, pipeline) = api_state().await;

    let cycle = json!({
        "id": "close-2025-01",
        "name": "January close",
        "frequency": "monthly",
        "start": "2025-01-01T00:00:00Z"
    });

    let (status, body) = call(
        &state,
        send_json(Method::POST, "/api/v1/cycles", cycle.clone()),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["frequency"], "monthly");
    assert_eq!(body["end"], "2025-02-01T00:00:00Z");

    // Same id again conflicts.
    let (status, _body) = call(&state, send_json(Method::POST, "/api/v1/cycles", cycle)).await;
    assert_eq!(status, StatusCode::CONFLICT);

    // Attach the pipeline scenario, then an unknown one.
    let sid = pipeline.scenario_id.as_str();
    let (status, body) = call(
        &state,
        post(&format!("/api/v1/cycles/close-2025-01/scenarios/{sid}")),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["scenarios"], json!([sid]));

    let (status, _body) = call(
        &state,
        post("/api/v1/cycles/close-2025-01/scenarios/ghost"),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _body) = call(
        &state,
        Request::builder()
            .method(Method::DELETE)
            .uri("/api/v1/cycles/close-2025-01")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _body) = call(&state, get("/api/v1/cycles/close-2025-01")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
