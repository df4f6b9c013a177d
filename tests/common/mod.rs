//! Common test utilities shared across integration tests.

use std::sync::Arc;

use tempo::config::ScenarioConfig;
use tempo::testing::CountingWork;
use tempo::{InMemoryRepository, ScenarioId, ScenarioManager, WorkRegistry};

/// A manager wired with a three-task chain scenario:
/// `src -[clean]-> cleaned -[aggregate]-> aggregated -[report]-> out`.
///
/// Each work adds one to its integer input and counts invocations.
pub struct Pipeline {
    pub manager: Arc<ScenarioManager>,
    pub scenario_id: ScenarioId,
    pub clean: Arc<CountingWork>,
    pub aggregate: Arc<CountingWork>,
    pub report: Arc<CountingWork>,
}

pub const PIPELINE_CONFIG: &str = r#"
id: pipeline
name: Pipeline
data_nodes:
  - id: src
    value: 1
  - id: cleaned
  - id: aggregated
  - id: out
tasks:
  - id: clean
    work: clean
    inputs: [src]
    outputs: [cleaned]
  - id: aggregate
    work: aggregate
    inputs: [cleaned]
    outputs: [aggregated]
  - id: report
    work: report
    inputs: [aggregated]
    outputs: [out]
"#;

pub async fn pipeline() -> Pipeline {
    let clean = Arc::new(CountingWork::increment());
    let aggregate = Arc::new(CountingWork::increment());
    let report = Arc::new(CountingWork::increment());

    let mut registry = WorkRegistry::new();
    registry.register("clean", clean.clone());
    registry.register("aggregate", aggregate.clone());
    registry.register("report", report.clone());

    let manager = Arc::new(ScenarioManager::new(
        Arc::new(InMemoryRepository::new()),
        Arc::new(registry),
    ));

    let config = ScenarioConfig::from_str(PIPELINE_CONFIG).unwrap();
    let scenario = manager.create_scenario(&config).await.unwrap();

    Pipeline {
        manager,
        scenario_id: scenario.id().clone(),
        clean,
        aggregate,
        report,
    }
}

impl Pipeline {
    /// Total work invocations across the chain.
    pub fn total_runs(&self) -> u32 {
        self.clean.runs() + self.aggregate.runs() + self.report.runs()
    }
}
