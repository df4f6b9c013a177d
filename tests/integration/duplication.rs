//! Duplication and cached-output reuse across the manager surface.

use std::sync::Arc;

use serde_json::json;
use tempo::config::ScenarioConfig;
use tempo::testing::CountingWork;
use tempo::{
    DataNodeId, InMemoryRepository, ScenarioManager, TaskId, TaskRunState, WorkRegistry,
};

use crate::common;

#[tokio::test]
async fn test_duplicate_of_unchanged_run_executes_nothing() {
    let pipeline = common::pipeline().await;
    pipeline.manager.submit(&pipeline.scenario_id).await.unwrap();
    assert_eq!(pipeline.total_runs(), 3);

    let copy = pipeline
        .manager
        .duplicate_scenario(&pipeline.scenario_id)
        .await
        .unwrap();

    assert_eq!(copy.name(), "Duplicate of Pipeline");
    for task in ["clean", "aggregate", "report"] {
        assert_eq!(
            copy.run_state(&TaskId::new(task)),
            Some(TaskRunState::FromCache)
        );
    }

    let outcome = pipeline.manager.submit(copy.id()).await.unwrap();
    assert!(outcome.success);
    assert!(outcome.jobs.iter().all(|j| j.is_from_cache()));
    assert_eq!(pipeline.total_runs(), 3);

    // The cached duplicate still carries the original's outputs.
    let refreshed = pipeline.manager.get_scenario(copy.id()).await.unwrap();
    assert_eq!(
        refreshed.data_node(&DataNodeId::new("out")).unwrap().value(),
        &json!(4)
    );
}

#[tokio::test]
async fn test_duplication_leaves_original_untouched() {
    let pipeline = common::pipeline().await;
    pipeline.manager.submit(&pipeline.scenario_id).await.unwrap();

    let copy = pipeline
        .manager
        .duplicate_scenario(&pipeline.scenario_id)
        .await
        .unwrap();
    assert_ne!(copy.id(), &pipeline.scenario_id);

    let original = pipeline
        .manager
        .get_scenario(&pipeline.scenario_id)
        .await
        .unwrap();
    assert_eq!(original.name(), "Pipeline");
    for task in ["clean", "aggregate", "report"] {
        assert_eq!(
            original.run_state(&TaskId::new(task)),
            Some(TaskRunState::Pending)
        );
    }
}

/// Two independent sources feeding a join:
/// `src_a -[prepare]-> prepared`, then `prepared + src_b -[combine]-> out`.
/// Changing only `src_b` must re-execute `combine` while `prepare` reuses
/// its cached output.
#[tokio::test]
async fn test_changing_one_source_invalidates_only_its_consumers() {
    let prepare = Arc::new(CountingWork::increment());
    let combine = Arc::new(CountingWork::constant(vec![json!("combined")]));

    let mut registry = WorkRegistry::new();
    registry.register("prepare", prepare.clone());
    registry.register("combine", combine.clone());

    let manager = ScenarioManager::new(
        Arc::new(InMemoryRepository::new()),
        Arc::new(registry),
    );

    let config = ScenarioConfig::from_str(
        r#"
id: join
name: Join
data_nodes:
  - id: src_a
    value: 1
  - id: prepared
  - id: src_b
    value: 10
  - id: out
tasks:
  - id: prepare
    work: prepare
    inputs: [src_a]
    outputs: [prepared]
  - id: combine
    work: combine
    inputs: [prepared, src_b]
    outputs: [out]
"#,
    )
    .unwrap();
    let scenario = manager.create_scenario(&config).await.unwrap();
    manager.submit(scenario.id()).await.unwrap();
    assert_eq!(prepare.runs(), 1);
    assert_eq!(combine.runs(), 1);

    // New data arrives on src_b only.
    manager
        .set_data_node_value(scenario.id(), &DataNodeId::new("src_b"), json!(99))
        .await
        .unwrap();

    let copy = manager.duplicate_scenario(scenario.id()).await.unwrap();
    assert_eq!(
        copy.run_state(&TaskId::new("prepare")),
        Some(TaskRunState::FromCache)
    );
    assert_eq!(
        copy.run_state(&TaskId::new("combine")),
        Some(TaskRunState::Pending)
    );

    let outcome = manager.submit(copy.id()).await.unwrap();
    assert!(outcome.success);
    // prepare reused its cache; only combine re-executed.
    assert_eq!(prepare.runs(), 1);
    assert_eq!(combine.runs(), 2);
}

#[tokio::test]
async fn test_produced_nodes_reject_external_writes() {
    let pipeline = common::pipeline().await;

    let err = pipeline
        .manager
        .set_data_node_value(
            &pipeline.scenario_id,
            &DataNodeId::new("cleaned"),
            json!(123),
        )
        .await
        .unwrap_err();

    assert!(err.to_string().contains("produced by a task"));
}

#[tokio::test]
async fn test_duplicate_before_any_run_stays_fully_pending() {
    let pipeline = common::pipeline().await;

    let copy = pipeline
        .manager
        .duplicate_scenario(&pipeline.scenario_id)
        .await
        .unwrap();

    // Nothing is cached yet, so the duplicate plans a full run.
    for task in ["clean", "aggregate", "report"] {
        assert_eq!(
            copy.run_state(&TaskId::new(task)),
            Some(TaskRunState::Pending)
        );
    }
}
