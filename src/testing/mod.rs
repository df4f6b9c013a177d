//! Instrumented work implementations for tests.

use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::core::{Work, WorkError};

enum Behavior {
    /// Add one to each integer input, one output per input.
    Increment,
    /// Ignore inputs and return fixed outputs.
    Constant(Vec<Value>),
}

/// A work that counts how many times it has run.
pub struct CountingWork {
    runs: AtomicU32,
    behavior: Behavior,
}

impl CountingWork {
    pub fn increment() -> Self {
        Self {
            runs: AtomicU32::new(0),
            behavior: Behavior::Increment,
        }
    }

    pub fn constant(outputs: Vec<Value>) -> Self {
        Self {
            runs: AtomicU32::new(0),
            behavior: Behavior::Constant(outputs),
        }
    }

    pub fn runs(&self) -> u32 {
        self.runs.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Work for CountingWork {
    async fn run(&self, inputs: &[Value]) -> Result<Vec<Value>, WorkError> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        match &self.behavior {
            Behavior::Increment => Ok(inputs
                .iter()
                .map(|v| json!(v.as_i64().unwrap_or(0) + 1))
                .collect()),
            Behavior::Constant(outputs) => Ok(outputs.clone()),
        }
    }
}

/// A work that fails transiently a fixed number of times, then succeeds.
pub struct FailingWork {
    remaining: AtomicU32,
    output: Value,
}

impl FailingWork {
    pub fn new(failures: u32) -> Self {
        Self {
            remaining: AtomicU32::new(failures),
            output: json!("ok"),
        }
    }
}

#[async_trait]
impl Work for FailingWork {
    async fn run(&self, _inputs: &[Value]) -> Result<Vec<Value>, WorkError> {
        if self.remaining.load(Ordering::SeqCst) > 0 {
            self.remaining.fetch_sub(1, Ordering::SeqCst);
            return Err(WorkError::Transient("induced failure".into()));
        }
        Ok(vec![self.output.clone()])
    }
}
