//! Building live scenarios from configs.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::core::{
    DataNode, DataNodeId, RetryPolicy, Scenario, ScenarioId, TaskSpec, Work,
};

use super::yaml::{ConfigError, RetryConfig, ScenarioConfig};

/// Maps work names from configs to executable implementations.
///
/// The registry is assembled once at startup and shared read-only.
#[derive(Default)]
pub struct WorkRegistry {
    works: HashMap<String, Arc<dyn Work>>,
}

impl WorkRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a work under a name, replacing any previous binding.
    pub fn register(&mut self, name: impl Into<String>, work: Arc<dyn Work>) {
        self.works.insert(name.into(), work);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Work>> {
        self.works.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.works.contains_key(name)
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.works.keys().map(String::as_str).collect();
        names.sort();
        names
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        RetryPolicy {
            max_attempts: config.max_attempts,
            delay: Duration::from_secs(config.delay_seconds),
            retry_on: config.retry_on,
        }
    }
}

/// Instantiate a scenario from a config under a fresh scenario id.
///
/// Data nodes with non-null values become sources; null-valued nodes await
/// their producing tasks. All works must resolve in the registry and the
/// resulting graph must validate.
pub fn build_scenario(
    config: &ScenarioConfig,
    registry: &WorkRegistry,
) -> Result<Scenario, ConfigError> {
    config.validate()?;

    let mut scenario = Scenario::new(
        ScenarioId::random(),
        config.name.clone(),
        config.id.clone(),
    );

    for node in &config.data_nodes {
        scenario
            .add_data_node(DataNode::new(node.id.clone(), node.value.clone()))
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;
    }

    for task in &config.tasks {
        let work = registry
            .get(&task.work)
            .ok_or_else(|| ConfigError::UnknownWork(task.work.clone()))?;
        let mut spec = TaskSpec::new(
            task.id.clone(),
            task.inputs.iter().map(DataNodeId::new).collect(),
            task.outputs.iter().map(DataNodeId::new).collect(),
            task.work.clone(),
            work,
        );
        if let Some(retry) = &task.retry {
            spec = spec.with_retry(retry.into());
        }
        if let Some(secs) = task.timeout_seconds {
            spec = spec.with_timeout(Duration::from_secs(secs));
        }
        scenario
            .add_task(spec)
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;
    }

    scenario
        .validate()
        .map_err(|e| ConfigError::Invalid(e.to_string()))?;

    Ok(scenario)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::WorkError;
    use async_trait::async_trait;
    use serde_json::{json, Value};

    struct Echo;

    #[async_trait]
    impl Work for Echo {
        async fn run(&self, inputs: &[Value]) -> Result<Vec<Value>, WorkError> {
            Ok(inputs.to_vec())
        }
    }

    fn registry() -> WorkRegistry {
        let mut registry = WorkRegistry::new();
        registry.register("echo", Arc::new(Echo));
        registry
    }

    fn config(yaml: &str) -> ScenarioConfig {
        ScenarioConfig::from_str(yaml).unwrap()
    }

    #[test]
    fn test_build_scenario_from_config() {
        let config = config(
            r#"
id: pipeline
name: Pipeline
data_nodes:
  - id: input
    value: 7
  - id: output
tasks:
  - id: copy
    work: echo
    inputs: [input]
    outputs: [output]
"#,
        );

        let scenario = build_scenario(&config, &registry()).unwrap();

        assert_eq!(scenario.name(), "Pipeline");
        assert_eq!(scenario.config_id().as_str(), "pipeline");
        assert_eq!(scenario.task_count(), 1);
        assert_eq!(
            scenario.data_node(&DataNodeId::new("input")).unwrap().value(),
            &json!(7)
        );
    }

    #[test]
    fn test_each_build_gets_fresh_scenario_id() {
        let config = config("id: p\nname: P\n");
        let a = build_scenario(&config, &registry()).unwrap();
        let b = build_scenario(&config, &registry()).unwrap();
        assert_ne!(a.id(), b.id());
        assert_eq!(a.config_id(), b.config_id());
    }

    #[test]
    fn test_unknown_work_rejected() {
        let config = config(
            r#"
id: p
name: P
data_nodes:
  - id: a
tasks:
  - id: t
    work: missing
    inputs: [a]
"#,
        );
        assert!(matches!(
            build_scenario(&config, &registry()),
            Err(ConfigError::UnknownWork(_))
        ));
    }

    #[test]
    fn test_cyclic_config_rejected_at_build() {
        let config = config(
            r#"
id: p
name: P
data_nodes:
  - id: x
  - id: y
tasks:
  - id: f
    work: echo
    inputs: [x]
    outputs: [y]
  - id: g
    work: echo
    inputs: [y]
    outputs: [x]
"#,
        );
        assert!(matches!(
            build_scenario(&config, &registry()),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn test_registry_lookup() {
        let registry = registry();
        assert!(registry.contains("echo"));
        assert!(registry.get("missing").is_none());
        assert_eq!(registry.names(), vec!["echo"]);
    }
}
