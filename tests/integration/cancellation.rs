//! Cancellation of in-flight scenario runs.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tempo::config::ScenarioConfig;
use tempo::testing::CountingWork;
use tempo::{
    InMemoryRepository, JobStatus, ManagerError, ScenarioManager, TaskId, Work, WorkError,
    WorkRegistry,
};

use crate::common;

struct SlowWork;

#[async_trait]
impl Work for SlowWork {
    async fn run(&self, _inputs: &[Value]) -> Result<Vec<Value>, WorkError> {
        tokio::time::sleep(Duration::from_secs(30)).await;
        Ok(vec![json!("done")])
    }
}

async fn slow_pipeline() -> (Arc<ScenarioManager>, tempo::ScenarioId, Arc<CountingWork>) {
    let after = Arc::new(CountingWork::increment());
    let mut registry = WorkRegistry::new();
    registry.register("slow", Arc::new(SlowWork));
    registry.register("after", after.clone());

    let manager = Arc::new(ScenarioManager::new(
        Arc::new(InMemoryRepository::new()),
        Arc::new(registry),
    ));

    let config = ScenarioConfig::from_str(
        r#"
id: slow
name: Slow
data_nodes:
  - id: src
    value: 0
  - id: mid
  - id: out
tasks:
  - id: crawl
    work: slow
    inputs: [src]
    outputs: [mid]
  - id: follow_up
    work: after
    inputs: [mid]
    outputs: [out]
"#,
    )
    .unwrap();
    let scenario = manager.create_scenario(&config).await.unwrap();
    (manager, scenario.id().clone(), after)
}

#[tokio::test]
async fn test_cancel_interrupts_running_and_queued_jobs() {
    let (manager, id, after) = slow_pipeline().await;

    let submission = {
        let manager = manager.clone();
        let id = id.clone();
        tokio::spawn(async move { manager.submit(&id).await })
    };

    // Give the run time to start the slow task.
    tokio::time::sleep(Duration::from_millis(100)).await;
    manager.cancel(&id).await.unwrap();

    let outcome = submission.await.unwrap().unwrap();
    assert!(!outcome.success);
    assert_eq!(
        outcome.job(&TaskId::new("crawl")).unwrap().status(),
        JobStatus::Cancelled
    );
    assert_eq!(
        outcome.job(&TaskId::new("follow_up")).unwrap().status(),
        JobStatus::Cancelled
    );
    // The queued follow-up never started.
    assert_eq!(after.runs(), 0);

    // Cancelled jobs are persisted like any others.
    let jobs = manager.list_jobs(&id).await.unwrap();
    assert_eq!(jobs.len(), 2);
    assert!(jobs.iter().all(|j| j.status() == JobStatus::Cancelled));
}

#[tokio::test]
async fn test_cancel_after_completion_is_rejected() {
    let pipeline = common::pipeline().await;
    pipeline.manager.submit(&pipeline.scenario_id).await.unwrap();

    assert!(matches!(
        pipeline.manager.cancel(&pipeline.scenario_id).await,
        Err(ManagerError::NotRunning(_))
    ));
}

#[tokio::test]
async fn test_concurrent_submission_of_same_scenario_is_rejected() {
    let (manager, id, _after) = slow_pipeline().await;

    let submission = {
        let manager = manager.clone();
        let id = id.clone();
        tokio::spawn(async move { manager.submit(&id).await })
    };
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert!(matches!(
        manager.submit(&id).await,
        Err(ManagerError::AlreadyRunning(_))
    ));

    manager.cancel(&id).await.unwrap();
    submission.await.unwrap().unwrap();
}
