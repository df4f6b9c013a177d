//! End-to-end workflow tests: YAML config to execution and persistence.

use std::sync::Arc;

use serde_json::json;
use tempo::config::ScenarioConfig;
use tempo::testing::FailingWork;
use tempo::{
    DataNodeId, InMemoryRepository, JobStatus, ScenarioManager, WorkRegistry,
};

use crate::common;

#[tokio::test]
async fn test_yaml_config_runs_to_completion() {
    let pipeline = common::pipeline().await;

    let outcome = pipeline.manager.submit(&pipeline.scenario_id).await.unwrap();

    assert!(outcome.success);
    assert_eq!(outcome.jobs.len(), 3);
    assert!(outcome.jobs.iter().all(|j| j.status() == JobStatus::Completed));

    // src=1 incremented three times down the chain.
    let scenario = pipeline
        .manager
        .get_scenario(&pipeline.scenario_id)
        .await
        .unwrap();
    assert_eq!(
        scenario.data_node(&DataNodeId::new("out")).unwrap().value(),
        &json!(4)
    );

    // Jobs are persisted and every executed task is cached.
    let jobs = pipeline
        .manager
        .list_jobs(&pipeline.scenario_id)
        .await
        .unwrap();
    assert_eq!(jobs.len(), 3);
    assert_eq!(pipeline.manager.cache().len().unwrap(), 3);
}

#[tokio::test]
async fn test_resubmission_reexecutes_every_task() {
    let pipeline = common::pipeline().await;

    pipeline.manager.submit(&pipeline.scenario_id).await.unwrap();
    pipeline.manager.submit(&pipeline.scenario_id).await.unwrap();

    // Caching applies to duplicates, not to resubmitting the scenario
    // itself: its tasks are still planned as pending.
    assert_eq!(pipeline.total_runs(), 6);
}

#[tokio::test]
async fn test_retry_policy_recovers_transient_failures() {
    let flaky = Arc::new(FailingWork::new(2));
    let mut registry = WorkRegistry::new();
    registry.register("flaky", flaky);

    let manager = ScenarioManager::new(
        Arc::new(InMemoryRepository::new()),
        Arc::new(registry),
    );

    let config = ScenarioConfig::from_str(
        r#"
id: flaky-pipeline
name: Flaky pipeline
data_nodes:
  - id: src
    value: 0
  - id: out
tasks:
  - id: wobble
    work: flaky
    inputs: [src]
    outputs: [out]
    retry:
      max_attempts: 3
      delay_seconds: 0
"#,
    )
    .unwrap();
    let scenario = manager.create_scenario(&config).await.unwrap();

    let outcome = manager.submit(scenario.id()).await.unwrap();

    assert!(outcome.success);
    let refreshed = manager.get_scenario(scenario.id()).await.unwrap();
    assert_eq!(
        refreshed.data_node(&DataNodeId::new("out")).unwrap().value(),
        &json!("ok")
    );
}

#[tokio::test]
async fn test_exhausted_retries_fail_the_job_with_trace() {
    let flaky = Arc::new(FailingWork::new(10));
    let mut registry = WorkRegistry::new();
    registry.register("flaky", flaky);

    let manager = ScenarioManager::new(
        Arc::new(InMemoryRepository::new()),
        Arc::new(registry),
    );

    let config = ScenarioConfig::from_str(
        r#"
id: broken
name: Broken
data_nodes:
  - id: src
    value: 0
  - id: out
tasks:
  - id: wobble
    work: flaky
    inputs: [src]
    outputs: [out]
    retry:
      max_attempts: 1
      delay_seconds: 0
"#,
    )
    .unwrap();
    let scenario = manager.create_scenario(&config).await.unwrap();

    let outcome = manager.submit(scenario.id()).await.unwrap();

    assert!(!outcome.success);
    let job = &outcome.jobs[0];
    assert_eq!(job.status(), JobStatus::Failed);
    let trace = job.stack_trace().unwrap();
    assert!(trace.contains("2 attempt(s)"));
    assert!(trace.contains("induced failure"));

    // Failed tasks leave no cache entry.
    assert_eq!(manager.cache().len().unwrap(), 0);
}
