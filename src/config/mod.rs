//! Configuration: YAML scenario definitions, engine settings and the work
//! registry that binds task definitions to executable code.

pub mod builder;
pub mod yaml;

pub use builder::{build_scenario, WorkRegistry};
pub use yaml::{
    load_config_dir, ConfigError, DataNodeConfig, EngineConfig, RetryConfig, ScenarioConfig,
    TaskConfig,
};
