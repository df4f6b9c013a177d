//! YAML configuration types.
//!
//! A [`ScenarioConfig`] is the declarative template a scenario is built
//! from: data nodes with initial values, and tasks referencing works by
//! name. Configs are pure data and round-trip through YAML losslessly.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::core::RetryCondition;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("invalid config: {0}")]
    Invalid(String),

    #[error("unknown work function: {0}")]
    UnknownWork(String),
}

/// Declarative template for a scenario.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioConfig {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub data_nodes: Vec<DataNodeConfig>,
    #[serde(default)]
    pub tasks: Vec<TaskConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataNodeConfig {
    pub id: String,
    /// Initial value; defaults to null for nodes filled in by tasks.
    #[serde(default)]
    pub value: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskConfig {
    pub id: String,
    /// Registry name of the work function.
    pub work: String,
    #[serde(default)]
    pub inputs: Vec<String>,
    #[serde(default)]
    pub outputs: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry: Option<RetryConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_seconds: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    pub max_attempts: u32,
    #[serde(default)]
    pub delay_seconds: u64,
    #[serde(default)]
    pub retry_on: RetryCondition,
}

impl ScenarioConfig {
    pub fn from_str(yaml: &str) -> Result<Self, ConfigError> {
        let config: ScenarioConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_str(&contents)
    }

    pub fn to_yaml(&self) -> Result<String, ConfigError> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Structural validation: non-empty ids, unique ids, and task references
    /// that resolve to declared data nodes. Graph-level rules (cycles, the
    /// single-writer rule) are checked when the scenario is built.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.id.is_empty() {
            return Err(ConfigError::Invalid("scenario id is empty".into()));
        }
        if self.name.is_empty() {
            return Err(ConfigError::Invalid("scenario name is empty".into()));
        }

        let mut node_ids = HashSet::new();
        for node in &self.data_nodes {
            if node.id.is_empty() {
                return Err(ConfigError::Invalid("data node id is empty".into()));
            }
            if !node_ids.insert(node.id.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate data node id: {}",
                    node.id
                )));
            }
        }

        let mut task_ids = HashSet::new();
        for task in &self.tasks {
            if task.id.is_empty() {
                return Err(ConfigError::Invalid("task id is empty".into()));
            }
            if !task_ids.insert(task.id.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate task id: {}",
                    task.id
                )));
            }
            if task.work.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "task '{}' has no work function",
                    task.id
                )));
            }
            for node in task.inputs.iter().chain(&task.outputs) {
                if !node_ids.contains(node.as_str()) {
                    return Err(ConfigError::Invalid(format!(
                        "task '{}' references undeclared data node '{}'",
                        task.id, node
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Load every `*.yaml` / `*.yml` scenario config in a directory.
pub fn load_config_dir(dir: impl AsRef<Path>) -> Result<Vec<ScenarioConfig>, ConfigError> {
    let mut configs = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        let is_yaml = path
            .extension()
            .map(|ext| ext == "yaml" || ext == "yml")
            .unwrap_or(false);
        if is_yaml {
            configs.push(ScenarioConfig::from_file(&path)?);
        }
    }
    configs.sort_by(|a, b| a.id.cmp(&b.id));
    Ok(configs)
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_max_concurrency() -> usize {
    crate::execution::executor::DEFAULT_MAX_CONCURRENCY
}

/// Engine-level settings for the server binary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    /// Path to a SQLite database. None keeps everything in memory.
    #[serde(default)]
    pub database: Option<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            max_concurrency: default_max_concurrency(),
            database: None,
        }
    }
}

impl EngineConfig {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Ok(serde_yaml::from_str(&contents)?)
    }
}
