//! Cycles: time-boxed groupings of scenarios.
//!
//! A cycle pins a set of scenarios to a recurring business window (daily,
//! weekly or monthly). The engine does not schedule cycles; they are an
//! organizational surface exposed over the API.

use chrono::{DateTime, Days, Months, Utc};
use serde::{Deserialize, Serialize};

use super::types::{CycleId, ScenarioId};

/// Recurrence frequency of a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Frequency {
    Daily,
    Weekly,
    Monthly,
}

/// A time window grouping scenarios that belong to the same business period.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cycle {
    id: CycleId,
    name: String,
    frequency: Frequency,
    start: DateTime<Utc>,
    scenarios: Vec<ScenarioId>,
}

impl Cycle {
    pub fn new(
        id: impl Into<CycleId>,
        name: impl Into<String>,
        frequency: Frequency,
        start: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            frequency,
            start,
            scenarios: Vec::new(),
        }
    }

    pub fn id(&self) -> &CycleId {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn frequency(&self) -> Frequency {
        self.frequency
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    /// Exclusive end of the window.
    ///
    /// Monthly windows follow calendar months, so a cycle starting Jan 31
    /// ends Feb 28 (or 29) per chrono's month arithmetic.
    pub fn end(&self) -> DateTime<Utc> {
        match self.frequency {
            Frequency::Daily => self.start + Days::new(1),
            Frequency::Weekly => self.start + Days::new(7),
            Frequency::Monthly => self.start + Months::new(1),
        }
    }

    /// Whether an instant falls inside the window (start inclusive, end
    /// exclusive).
    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        instant >= self.start && instant < self.end()
    }

    pub fn scenarios(&self) -> &[ScenarioId] {
        &self.scenarios
    }

    /// Attach a scenario. Re-adding an attached scenario is a no-op.
    pub fn add_scenario(&mut self, id: ScenarioId) {
        if !self.scenarios.contains(&id) {
            self.scenarios.push(id);
        }
    }

    /// Detach a scenario. Returns whether it was attached.
    pub fn remove_scenario(&mut self, id: &ScenarioId) -> bool {
        let before = self.scenarios.len();
        self.scenarios.retain(|s| s != id);
        self.scenarios.len() != before
    }
}
