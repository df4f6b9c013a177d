//! Task output cache.
//!
//! The cache remembers, per task, the most recent successful execution: the
//! fingerprints of the inputs it consumed and the outputs it produced along
//! with their recorded fingerprints. Because tasks are pure, an entry whose
//! input fingerprints match the current inputs can stand in for a run.
//!
//! Recording a new entry for a task replaces the previous one, so at most
//! one authoritative entry exists per task.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::core::{Fingerprint, TaskId};

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache lock poisoned")]
    LockPoisoned,
}

/// One recorded successful execution of a task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub task_id: TaskId,
    /// Fingerprints of the inputs, in the task's declared input order.
    pub input_fingerprints: Vec<Fingerprint>,
    /// Produced values, in the task's declared output order.
    pub outputs: Vec<Value>,
    /// Fingerprints the outputs carried when produced, in the same order.
    pub output_fingerprints: Vec<Fingerprint>,
    pub recorded_at: DateTime<Utc>,
}

impl CacheEntry {
    pub fn new(
        task_id: TaskId,
        input_fingerprints: Vec<Fingerprint>,
        outputs: Vec<Value>,
        output_fingerprints: Vec<Fingerprint>,
    ) -> Self {
        Self {
            task_id,
            input_fingerprints,
            outputs,
            output_fingerprints,
            recorded_at: Utc::now(),
        }
    }

    /// Whether this entry was produced from the given input fingerprints.
    pub fn matches(&self, input_fingerprints: &[Fingerprint]) -> bool {
        self.input_fingerprints == input_fingerprints
    }
}

/// Shared store of the latest cache entry per task.
///
/// Cheap to clone; all clones see the same entries.
#[derive(Debug, Clone, Default)]
pub struct CacheStore {
    entries: Arc<RwLock<HashMap<TaskId, CacheEntry>>>,
}

impl CacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// The latest entry for a task, if one has been recorded.
    pub fn get(&self, task_id: &TaskId) -> Result<Option<CacheEntry>, CacheError> {
        let entries = self.entries.read().map_err(|_| CacheError::LockPoisoned)?;
        Ok(entries.get(task_id).cloned())
    }

    /// Record a successful execution, replacing any previous entry for the
    /// task.
    pub fn record(&self, entry: CacheEntry) -> Result<(), CacheError> {
        let mut entries = self.entries.write().map_err(|_| CacheError::LockPoisoned)?;
        entries.insert(entry.task_id.clone(), entry);
        Ok(())
    }

    /// Drop the entry for a task. Returns whether one existed.
    pub fn invalidate(&self, task_id: &TaskId) -> Result<bool, CacheError> {
        let mut entries = self.entries.write().map_err(|_| CacheError::LockPoisoned)?;
        Ok(entries.remove(task_id).is_some())
    }

    pub fn len(&self) -> Result<usize, CacheError> {
        let entries = self.entries.read().map_err(|_| CacheError::LockPoisoned)?;
        Ok(entries.len())
    }

    pub fn is_empty(&self) -> Result<bool, CacheError> {
        Ok(self.len()? == 0)
    }
}
