//! In-memory repository, the default backend and the one tests use.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use crate::core::{Cycle, CycleId, Job, JobId, ScenarioId};

use super::{Repository, StorageError, StoredScenario};

#[derive(Default)]
pub struct InMemoryRepository {
    scenarios: RwLock<HashMap<ScenarioId, StoredScenario>>,
    jobs: RwLock<HashMap<JobId, Job>>,
    cycles: RwLock<HashMap<CycleId, Cycle>>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Repository for InMemoryRepository {
    async fn save_scenario(&self, scenario: StoredScenario) -> Result<(), StorageError> {
        let mut scenarios = self
            .scenarios
            .write()
            .map_err(|_| StorageError::LockPoisoned)?;
        if scenarios.contains_key(&scenario.id) {
            return Err(StorageError::DuplicateKey(scenario.id.to_string()));
        }
        scenarios.insert(scenario.id.clone(), scenario);
        Ok(())
    }

    async fn update_scenario(&self, scenario: StoredScenario) -> Result<(), StorageError> {
        let mut scenarios = self
            .scenarios
            .write()
            .map_err(|_| StorageError::LockPoisoned)?;
        if !scenarios.contains_key(&scenario.id) {
            return Err(StorageError::NotFound(scenario.id.to_string()));
        }
        scenarios.insert(scenario.id.clone(), scenario);
        Ok(())
    }

    async fn get_scenario(&self, id: &ScenarioId) -> Result<StoredScenario, StorageError> {
        let scenarios = self
            .scenarios
            .read()
            .map_err(|_| StorageError::LockPoisoned)?;
        scenarios
            .get(id)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(id.to_string()))
    }

    async fn list_scenarios(&self) -> Result<Vec<StoredScenario>, StorageError> {
        let scenarios = self
            .scenarios
            .read()
            .map_err(|_| StorageError::LockPoisoned)?;
        let mut all: Vec<StoredScenario> = scenarios.values().cloned().collect();
        all.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(all)
    }

    async fn delete_scenario(&self, id: &ScenarioId) -> Result<(), StorageError> {
        let mut scenarios = self
            .scenarios
            .write()
            .map_err(|_| StorageError::LockPoisoned)?;
        scenarios
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| StorageError::NotFound(id.to_string()))
    }

    async fn save_job(&self, job: Job) -> Result<(), StorageError> {
        let mut jobs = self.jobs.write().map_err(|_| StorageError::LockPoisoned)?;
        if jobs.contains_key(job.id()) {
            return Err(StorageError::DuplicateKey(job.id().to_string()));
        }
        jobs.insert(job.id().clone(), job);
        Ok(())
    }

    async fn update_job(&self, job: Job) -> Result<(), StorageError> {
        let mut jobs = self.jobs.write().map_err(|_| StorageError::LockPoisoned)?;
        if !jobs.contains_key(job.id()) {
            return Err(StorageError::NotFound(job.id().to_string()));
        }
        jobs.insert(job.id().clone(), job);
        Ok(())
    }

    async fn get_job(&self, id: &JobId) -> Result<Job, StorageError> {
        let jobs = self.jobs.read().map_err(|_| StorageError::LockPoisoned)?;
        jobs.get(id)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(id.to_string()))
    }

    async fn list_jobs(&self, scenario_id: &ScenarioId) -> Result<Vec<Job>, StorageError> {
        let jobs = self.jobs.read().map_err(|_| StorageError::LockPoisoned)?;
        let mut matching: Vec<Job> = jobs
            .values()
            .filter(|j| j.scenario_id() == scenario_id)
            .cloned()
            .collect();
        matching.sort_by_key(|j| j.creation_date());
        Ok(matching)
    }

    async fn save_cycle(&self, cycle: Cycle) -> Result<(), StorageError> {
        let mut cycles = self.cycles.write().map_err(|_| StorageError::LockPoisoned)?;
        if cycles.contains_key(cycle.id()) {
            return Err(StorageError::DuplicateKey(cycle.id().to_string()));
        }
        cycles.insert(cycle.id().clone(), cycle);
        Ok(())
    }

    async fn update_cycle(&self, cycle: Cycle) -> Result<(), StorageError> {
        let mut cycles = self.cycles.write().map_err(|_| StorageError::LockPoisoned)?;
        if !cycles.contains_key(cycle.id()) {
            return Err(StorageError::NotFound(cycle.id().to_string()));
        }
        cycles.insert(cycle.id().clone(), cycle);
        Ok(())
    }

    async fn get_cycle(&self, id: &CycleId) -> Result<Cycle, StorageError> {
        let cycles = self.cycles.read().map_err(|_| StorageError::LockPoisoned)?;
        cycles
            .get(id)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(id.to_string()))
    }

    async fn list_cycles(&self) -> Result<Vec<Cycle>, StorageError> {
        let cycles = self.cycles.read().map_err(|_| StorageError::LockPoisoned)?;
        let mut all: Vec<Cycle> = cycles.values().cloned().collect();
        all.sort_by(|a, b| a.id().cmp(b.id()));
        Ok(all)
    }

    async fn delete_cycle(&self, id: &CycleId) -> Result<(), StorageError> {
        let mut cycles = self.cycles.write().map_err(|_| StorageError::LockPoisoned)?;
        cycles
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| StorageError::NotFound(id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Frequency, Scenario, ScenarioBuilder, TaskId};
    use chrono::Utc;
    use serde_json::json;

    fn scenario(id: &str) -> Scenario {
        ScenarioBuilder::new(id, format!("Scenario {id}"), "cfg")
            .data_node("raw", json!([1, 2]))
            .build()
            .unwrap()
    }

    fn stored(id: &str) -> StoredScenario {
        StoredScenario::from_scenario(&scenario(id))
    }

    #[tokio::test]
    async fn test_scenario_crud() {
        let repo = InMemoryRepository::new();

        repo.save_scenario(stored("s1")).await.unwrap();
        let found = repo.get_scenario(&ScenarioId::new("s1")).await.unwrap();
        assert_eq!(found.name, "Scenario s1");

        let mut updated = stored("s1");
        updated.name = "Renamed".to_string();
        repo.update_scenario(updated).await.unwrap();
        let found = repo.get_scenario(&ScenarioId::new("s1")).await.unwrap();
        assert_eq!(found.name, "Renamed");

        repo.delete_scenario(&ScenarioId::new("s1")).await.unwrap();
        assert!(matches!(
            repo.get_scenario(&ScenarioId::new("s1")).await,
            Err(StorageError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_save_duplicate_scenario_rejected() {
        let repo = InMemoryRepository::new();
        repo.save_scenario(stored("s1")).await.unwrap();
        assert!(matches!(
            repo.save_scenario(stored("s1")).await,
            Err(StorageError::DuplicateKey(_))
        ));
    }

    #[tokio::test]
    async fn test_update_missing_scenario_rejected() {
        let repo = InMemoryRepository::new();
        assert!(matches!(
            repo.update_scenario(stored("ghost")).await,
            Err(StorageError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_jobs_listed_by_scenario() {
        let repo = InMemoryRepository::new();
        let s1 = ScenarioId::new("s1");
        let s2 = ScenarioId::new("s2");

        repo.save_job(Job::new(TaskId::new("a"), s1.clone())).await.unwrap();
        repo.save_job(Job::new(TaskId::new("b"), s1.clone())).await.unwrap();
        repo.save_job(Job::new(TaskId::new("c"), s2.clone())).await.unwrap();

        assert_eq!(repo.list_jobs(&s1).await.unwrap().len(), 2);
        assert_eq!(repo.list_jobs(&s2).await.unwrap().len(), 1);
        assert!(repo.list_jobs(&ScenarioId::new("none")).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_job_update_persists_status() {
        let repo = InMemoryRepository::new();
        let mut job = Job::new(TaskId::new("a"), ScenarioId::new("s1"));
        repo.save_job(job.clone()).await.unwrap();

        job.ready().unwrap();
        job.start().unwrap();
        job.complete().unwrap();
        repo.update_job(job.clone()).await.unwrap();

        let found = repo.get_job(job.id()).await.unwrap();
        assert!(found.is_finished());
    }

    #[tokio::test]
    async fn test_cycle_crud() {
        let repo = InMemoryRepository::new();
        let cycle = Cycle::new("c1", "Monthly close", Frequency::Monthly, Utc::now());

        repo.save_cycle(cycle.clone()).await.unwrap();
        assert!(matches!(
            repo.save_cycle(cycle.clone()).await,
            Err(StorageError::DuplicateKey(_))
        ));

        let found = repo.get_cycle(&CycleId::new("c1")).await.unwrap();
        assert_eq!(found.name(), "Monthly close");

        repo.delete_cycle(&CycleId::new("c1")).await.unwrap();
        assert!(repo.list_cycles().await.unwrap().is_empty());
    }
}
