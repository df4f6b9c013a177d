//! Engine events and the bus that fans them out to subscribers.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::debug;

use crate::core::{JobId, JobStatus, ScenarioId, TaskId};

/// Events emitted by the engine during scenario execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// A job moved between lifecycle states.
    JobStatusChanged {
        job_id: JobId,
        task_id: TaskId,
        scenario_id: ScenarioId,
        from: JobStatus,
        to: JobStatus,
        timestamp: DateTime<Utc>,
    },
    /// A task was satisfied from cache instead of executing.
    TaskFromCache {
        task_id: TaskId,
        scenario_id: ScenarioId,
        timestamp: DateTime<Utc>,
    },
    /// A scenario was submitted for execution.
    ScenarioSubmitted {
        scenario_id: ScenarioId,
        timestamp: DateTime<Utc>,
    },
    /// A scenario finished executing.
    ScenarioCompleted {
        scenario_id: ScenarioId,
        success: bool,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },
}

impl Event {
    pub fn job_status_changed(
        job_id: JobId,
        task_id: TaskId,
        scenario_id: ScenarioId,
        from: JobStatus,
        to: JobStatus,
    ) -> Self {
        Event::JobStatusChanged {
            job_id,
            task_id,
            scenario_id,
            from,
            to,
            timestamp: Utc::now(),
        }
    }

    pub fn task_from_cache(task_id: TaskId, scenario_id: ScenarioId) -> Self {
        Event::TaskFromCache {
            task_id,
            scenario_id,
            timestamp: Utc::now(),
        }
    }

    pub fn scenario_submitted(scenario_id: ScenarioId) -> Self {
        Event::ScenarioSubmitted {
            scenario_id,
            timestamp: Utc::now(),
        }
    }

    pub fn scenario_completed(scenario_id: ScenarioId, success: bool, duration_ms: u64) -> Self {
        Event::ScenarioCompleted {
            scenario_id,
            success,
            duration_ms,
            timestamp: Utc::now(),
        }
    }

    /// The scenario this event belongs to.
    pub fn scenario_id(&self) -> &ScenarioId {
        match self {
            Event::JobStatusChanged { scenario_id, .. }
            | Event::TaskFromCache { scenario_id, .. }
            | Event::ScenarioSubmitted { scenario_id, .. }
            | Event::ScenarioCompleted { scenario_id, .. } => scenario_id,
        }
    }
}

/// A subscriber to engine events.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, event: &Event);
}

/// Fans events out to all subscribed handlers in subscription order.
#[derive(Default)]
pub struct EventBus {
    handlers: RwLock<Vec<Arc<dyn EventHandler>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn subscribe(&self, handler: Arc<dyn EventHandler>) {
        self.handlers.write().await.push(handler);
    }

    /// Subscribe to status changes of a single job.
    pub async fn subscribe_job(&self, job_id: JobId, handler: Arc<dyn EventHandler>) {
        self.subscribe(Arc::new(JobFilter { job_id, inner: handler }))
            .await;
    }

    pub async fn emit(&self, event: Event) {
        debug!(?event, "emitting event");
        let handlers = self.handlers.read().await;
        for handler in handlers.iter() {
            handler.handle(&event).await;
        }
    }
}

/// Forwards only status changes of one job to the wrapped handler.
struct JobFilter {
    job_id: JobId,
    inner: Arc<dyn EventHandler>,
}

#[async_trait]
impl EventHandler for JobFilter {
    async fn handle(&self, event: &Event) {
        if let Event::JobStatusChanged { job_id, .. } = event {
            if *job_id == self.job_id {
                self.inner.handle(event).await;
            }
        }
    }
}

/// Logs every event through `tracing`.
pub struct LoggingEventHandler;

#[async_trait]
impl EventHandler for LoggingEventHandler {
    async fn handle(&self, event: &Event) {
        match event {
            Event::JobStatusChanged {
                job_id, task_id, from, to, ..
            } => {
                tracing::info!(%job_id, %task_id, ?from, ?to, "job status changed");
            }
            Event::TaskFromCache { task_id, scenario_id, .. } => {
                tracing::info!(%task_id, %scenario_id, "task satisfied from cache");
            }
            Event::ScenarioSubmitted { scenario_id, .. } => {
                tracing::info!(%scenario_id, "scenario submitted");
            }
            Event::ScenarioCompleted {
                scenario_id, success, duration_ms, ..
            } => {
                tracing::info!(%scenario_id, success, duration_ms, "scenario completed");
            }
        }
    }
}
