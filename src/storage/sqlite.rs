//! SQLite repository with automatic schema migration.
//!
//! Scenarios, jobs and cycles are persisted as JSON payloads alongside the
//! columns needed for lookups and ordering.

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;

use super::{Repository, StorageError, StoredScenario};
use crate::core::{Cycle, CycleId, Job, JobId, ScenarioId};

pub struct SqliteRepository {
    pool: SqlitePool,
}

impl SqliteRepository {
    /// Open (or create) a database file and run migrations.
    pub async fn new(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path_str = path.as_ref().to_string_lossy();
        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", path_str))
            .map_err(|e| StorageError::Other(e.to_string()))?
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| StorageError::Other(e.to_string()))?;

        let repo = Self { pool };
        repo.run_migrations().await?;
        Ok(repo)
    }

    /// In-memory database, useful for tests.
    pub async fn in_memory() -> Result<Self, StorageError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(|e| StorageError::Other(e.to_string()))?;

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(|e| StorageError::Other(e.to_string()))?;

        let repo = Self { pool };
        repo.run_migrations().await?;
        Ok(repo)
    }

    async fn run_migrations(&self) -> Result<(), StorageError> {
        let schema = include_str!("../../migrations/001_initial_schema.sql");
        sqlx::raw_sql(schema)
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::Other(format!("migration failed: {}", e)))?;
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl Repository for SqliteRepository {
    async fn save_scenario(&self, scenario: StoredScenario) -> Result<(), StorageError> {
        let payload = serde_json::to_string(&scenario)?;
        let result = sqlx::query(
            "INSERT INTO scenarios (id, name, created_at, payload) VALUES (?, ?, ?, ?)",
        )
        .bind(scenario.id.as_str())
        .bind(&scenario.name)
        .bind(scenario.created_at.to_rfc3339())
        .bind(payload)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => Err(
                StorageError::DuplicateKey(format!("scenario: {}", scenario.id)),
            ),
            Err(e) => Err(StorageError::Other(e.to_string())),
        }
    }

    async fn update_scenario(&self, scenario: StoredScenario) -> Result<(), StorageError> {
        let payload = serde_json::to_string(&scenario)?;
        let result = sqlx::query("UPDATE scenarios SET name = ?, payload = ? WHERE id = ?")
            .bind(&scenario.name)
            .bind(payload)
            .bind(scenario.id.as_str())
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::Other(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound(format!("scenario: {}", scenario.id)));
        }
        Ok(())
    }

    async fn get_scenario(&self, id: &ScenarioId) -> Result<StoredScenario, StorageError> {
        let row: (String,) = sqlx::query_as("SELECT payload FROM scenarios WHERE id = ?")
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StorageError::Other(e.to_string()))?
            .ok_or_else(|| StorageError::NotFound(format!("scenario: {}", id)))?;

        Ok(serde_json::from_str(&row.0)?)
    }

    async fn list_scenarios(&self) -> Result<Vec<StoredScenario>, StorageError> {
        let rows: Vec<(String,)> =
            sqlx::query_as("SELECT payload FROM scenarios ORDER BY created_at")
                .fetch_all(&self.pool)
                .await
                .map_err(|e| StorageError::Other(e.to_string()))?;

        rows.into_iter()
            .map(|row| serde_json::from_str(&row.0).map_err(StorageError::from))
            .collect()
    }

    async fn delete_scenario(&self, id: &ScenarioId) -> Result<(), StorageError> {
        let result = sqlx::query("DELETE FROM scenarios WHERE id = ?")
            .bind(id.as_str())
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::Other(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound(format!("scenario: {}", id)));
        }
        Ok(())
    }

    async fn save_job(&self, job: Job) -> Result<(), StorageError> {
        let payload = serde_json::to_string(&job)?;
        let result = sqlx::query(
            "INSERT INTO jobs (id, scenario_id, created_at, payload) VALUES (?, ?, ?, ?)",
        )
        .bind(job.id().to_string())
        .bind(job.scenario_id().as_str())
        .bind(job.creation_date().to_rfc3339())
        .bind(payload)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                Err(StorageError::DuplicateKey(format!("job: {}", job.id())))
            }
            Err(e) => Err(StorageError::Other(e.to_string())),
        }
    }

    async fn update_job(&self, job: Job) -> Result<(), StorageError> {
        let payload = serde_json::to_string(&job)?;
        let result = sqlx::query("UPDATE jobs SET payload = ? WHERE id = ?")
            .bind(payload)
            .bind(job.id().to_string())
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::Other(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound(format!("job: {}", job.id())));
        }
        Ok(())
    }

    async fn get_job(&self, id: &JobId) -> Result<Job, StorageError> {
        let row: (String,) = sqlx::query_as("SELECT payload FROM jobs WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StorageError::Other(e.to_string()))?
            .ok_or_else(|| StorageError::NotFound(format!("job: {}", id)))?;

        Ok(serde_json::from_str(&row.0)?)
    }

    async fn list_jobs(&self, scenario_id: &ScenarioId) -> Result<Vec<Job>, StorageError> {
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT payload FROM jobs WHERE scenario_id = ? ORDER BY created_at",
        )
        .bind(scenario_id.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::Other(e.to_string()))?;

        rows.into_iter()
            .map(|row| serde_json::from_str(&row.0).map_err(StorageError::from))
            .collect()
    }

    async fn save_cycle(&self, cycle: Cycle) -> Result<(), StorageError> {
        let payload = serde_json::to_string(&cycle)?;
        let result = sqlx::query("INSERT INTO cycles (id, payload) VALUES (?, ?)")
            .bind(cycle.id().as_str())
            .bind(payload)
            .execute(&self.pool)
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                Err(StorageError::DuplicateKey(format!("cycle: {}", cycle.id())))
            }
            Err(e) => Err(StorageError::Other(e.to_string())),
        }
    }

    async fn update_cycle(&self, cycle: Cycle) -> Result<(), StorageError> {
        let payload = serde_json::to_string(&cycle)?;
        let result = sqlx::query("UPDATE cycles SET payload = ? WHERE id = ?")
            .bind(payload)
            .bind(cycle.id().as_str())
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::Other(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound(format!("cycle: {}", cycle.id())));
        }
        Ok(())
    }

    async fn get_cycle(&self, id: &CycleId) -> Result<Cycle, StorageError> {
        let row: (String,) = sqlx::query_as("SELECT payload FROM cycles WHERE id = ?")
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StorageError::Other(e.to_string()))?
            .ok_or_else(|| StorageError::NotFound(format!("cycle: {}", id)))?;

        Ok(serde_json::from_str(&row.0)?)
    }

    async fn list_cycles(&self) -> Result<Vec<Cycle>, StorageError> {
        let rows: Vec<(String,)> = sqlx::query_as("SELECT payload FROM cycles ORDER BY id")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StorageError::Other(e.to_string()))?;

        rows.into_iter()
            .map(|row| serde_json::from_str(&row.0).map_err(StorageError::from))
            .collect()
    }

    async fn delete_cycle(&self, id: &CycleId) -> Result<(), StorageError> {
        let result = sqlx::query("DELETE FROM cycles WHERE id = ?")
            .bind(id.as_str())
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::Other(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound(format!("cycle: {}", id)));
        }
        Ok(())
    }
}
