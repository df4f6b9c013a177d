//! tempo - scenario orchestration with fingerprint-based caching.
//!
//! Usage:
//!   tempo serve <configs-dir>     Serve the REST API with the given scenario configs
//!   tempo validate <configs-dir>  Validate scenario configs without running
//!   tempo list <configs-dir>      List all scenario configs in the directory
//!
//! The binary registers a small set of built-in works (identity, sum,
//! count). Library users register their own implementations of the `Work`
//! trait on a `WorkRegistry`.

use async_trait::async_trait;
use clap::{Parser, Subcommand};
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::Arc;
use tempo::api::{start_server, ApiState};
use tempo::config::{load_config_dir, EngineConfig, ScenarioConfig};
use tempo::events::LoggingEventHandler;
use tempo::storage::Repository;
use tempo::{build_scenario, InMemoryRepository, ScenarioManager, Work, WorkError, WorkRegistry};
use tracing::{info, warn};

/// tempo - a scenario orchestration engine
#[derive(Parser)]
#[command(name = "tempo")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the REST API with scenario configs from a directory
    Serve {
        /// Path to the directory containing scenario YAML files
        #[arg(value_name = "CONFIGS_DIR")]
        configs_dir: PathBuf,

        /// Host to bind to
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        /// Port to bind to
        #[arg(short, long, default_value = "3000")]
        port: u16,

        /// Maximum concurrent tasks per scenario run
        #[arg(short = 't', long, default_value = "4")]
        max_tasks: usize,

        /// Path to a SQLite database for persistence (in-memory otherwise)
        #[arg(long)]
        database: Option<PathBuf>,
    },

    /// Validate scenario configs without running
    Validate {
        /// Path to the directory containing scenario YAML files
        #[arg(value_name = "CONFIGS_DIR")]
        configs_dir: PathBuf,
    },

    /// List all scenario configs in the directory
    List {
        /// Path to the directory containing scenario YAML files
        #[arg(value_name = "CONFIGS_DIR")]
        configs_dir: PathBuf,
    },
}

/// Passes its inputs through unchanged.
struct Identity;

#[async_trait]
impl Work for Identity {
    async fn run(&self, inputs: &[Value]) -> Result<Vec<Value>, WorkError> {
        Ok(inputs.to_vec())
    }
}

/// Sums numeric inputs (arrays are summed elementwise into the total).
struct Sum;

#[async_trait]
impl Work for Sum {
    async fn run(&self, inputs: &[Value]) -> Result<Vec<Value>, WorkError> {
        let mut total = 0.0;
        for value in inputs {
            match value {
                Value::Number(n) => total += n.as_f64().unwrap_or(0.0),
                Value::Array(items) => {
                    total += items.iter().filter_map(Value::as_f64).sum::<f64>()
                }
                other => {
                    return Err(WorkError::Failed(format!("cannot sum value: {other}")));
                }
            }
        }
        Ok(vec![json!(total)])
    }
}

/// Counts the elements of each array input.
struct Count;

#[async_trait]
impl Work for Count {
    async fn run(&self, inputs: &[Value]) -> Result<Vec<Value>, WorkError> {
        inputs
            .iter()
            .map(|v| match v {
                Value::Array(items) => Ok(json!(items.len())),
                other => Err(WorkError::Failed(format!("cannot count value: {other}"))),
            })
            .collect()
    }
}

fn builtin_registry() -> WorkRegistry {
    let mut registry = WorkRegistry::new();
    registry.register("identity", Arc::new(Identity));
    registry.register("sum", Arc::new(Sum));
    registry.register("count", Arc::new(Count));
    registry
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve {
            configs_dir,
            host,
            port,
            max_tasks,
            database,
        } => {
            let config = EngineConfig {
                host,
                port,
                max_concurrency: max_tasks,
                database,
            };
            serve(configs_dir, config).await?;
        }
        Commands::Validate { configs_dir } => {
            validate_configs(configs_dir)?;
        }
        Commands::List { configs_dir } => {
            list_configs(configs_dir)?;
        }
    }

    Ok(())
}

async fn serve(
    configs_dir: PathBuf,
    config: EngineConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    info!("Loading scenario configs from: {}", configs_dir.display());
    let configs = load_config_dir(&configs_dir)?;
    if configs.is_empty() {
        warn!("No scenario configs found in {}", configs_dir.display());
    }
    for scenario in &configs {
        info!(
            "  - {} ({}): {} task(s), {} data node(s)",
            scenario.id,
            scenario.name,
            scenario.tasks.len(),
            scenario.data_nodes.len()
        );
    }

    let repo = build_repository(&config).await?;
    let manager = Arc::new(ScenarioManager::with_concurrency(
        repo,
        Arc::new(builtin_registry()),
        config.max_concurrency,
    ));
    manager.bus().subscribe(Arc::new(LoggingEventHandler)).await;

    let state = ApiState::new(manager, configs);
    let handle = start_server(&config, state).await?;

    tokio::select! {
        result = handle => result?,
        _ = tokio::signal::ctrl_c() => {
            info!("Shutting down");
        }
    }
    Ok(())
}

#[cfg(feature = "sqlite")]
async fn build_repository(
    config: &EngineConfig,
) -> Result<Arc<dyn Repository>, Box<dyn std::error::Error>> {
    match &config.database {
        Some(path) => {
            info!("Using SQLite database at {}", path.display());
            let repo: Arc<dyn Repository> = Arc::new(tempo::SqliteRepository::new(path).await?);
            Ok(repo)
        }
        None => {
            let repo: Arc<dyn Repository> = Arc::new(InMemoryRepository::new());
            Ok(repo)
        }
    }
}

#[cfg(not(feature = "sqlite"))]
async fn build_repository(
    config: &EngineConfig,
) -> Result<Arc<dyn Repository>, Box<dyn std::error::Error>> {
    if config.database.is_some() {
        return Err("this build has no SQLite support; rebuild with --features sqlite".into());
    }
    Ok(Arc::new(InMemoryRepository::new()))
}

/// Validate configs structurally and as graphs.
///
/// Work names are bound to placeholders so unknown works do not fail
/// validation; the serving environment decides which works exist.
fn validate_configs(configs_dir: PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    let configs = load_config_dir(&configs_dir)?;
    if configs.is_empty() {
        warn!("No scenario configs found in {}", configs_dir.display());
        return Ok(());
    }

    let mut failures = 0;
    for config in &configs {
        match check_graph(config) {
            Ok(()) => info!("{}: OK", config.id),
            Err(e) => {
                failures += 1;
                tracing::error!("{}: {}", config.id, e);
            }
        }
    }

    if failures > 0 {
        return Err(format!("{failures} config(s) failed validation").into());
    }
    Ok(())
}

fn check_graph(config: &ScenarioConfig) -> Result<(), Box<dyn std::error::Error>> {
    let mut registry = WorkRegistry::new();
    for task in &config.tasks {
        registry.register(&task.work, Arc::new(Identity));
    }
    build_scenario(config, &registry)?;
    Ok(())
}

fn list_configs(configs_dir: PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    let configs = load_config_dir(&configs_dir)?;
    if configs.is_empty() {
        warn!("No scenario configs found in {}", configs_dir.display());
        return Ok(());
    }
    for config in &configs {
        info!(
            "{} ({}): {} task(s), {} data node(s)",
            config.id,
            config.name,
            config.tasks.len(),
            config.data_nodes.len()
        );
    }
    Ok(())
}
