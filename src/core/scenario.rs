//! Scenarios: acyclic graphs of tasks and data nodes.
//!
//! A scenario is one runnable pipeline instance. Edges are implied by task
//! declarations: task B depends on task A when one of B's inputs is one of
//! A's outputs. Each data node has at most one producing task (the
//! single-writer rule), and the resulting graph must be acyclic.

use std::collections::{HashMap, VecDeque};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use super::data_node::DataNode;
use super::task::TaskSpec;
use super::types::{ConfigId, DataNodeId, ScenarioId, TaskId};

/// Errors that can occur when building or validating scenarios.
#[derive(Debug, Error)]
pub enum ScenarioError {
    /// A cycle was detected in the task graph.
    #[error("cycle detected involving task: {0}")]
    CycleDetected(TaskId),

    /// Attempted to add a duplicate task.
    #[error("duplicate task: {0}")]
    DuplicateTask(TaskId),

    /// Attempted to add a duplicate data node.
    #[error("duplicate data node: {0}")]
    DuplicateDataNode(DataNodeId),

    /// A task references a data node that doesn't exist.
    #[error("task '{task}' references unknown data node '{node}'")]
    MissingDataNode { task: TaskId, node: DataNodeId },

    /// Two tasks declare the same output node.
    #[error("data node '{node}' already produced by task '{producer}', also declared by '{task}'")]
    DuplicateProducer {
        node: DataNodeId,
        producer: TaskId,
        task: TaskId,
    },

    /// Task not found in the scenario.
    #[error("task not found: {0}")]
    TaskNotFound(TaskId),

    /// Data node not found in the scenario.
    #[error("data node not found: {0}")]
    DataNodeNotFound(DataNodeId),
}

/// Planned execution state of a task within a scenario.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TaskRunState {
    /// The task will execute when the scenario is submitted.
    #[default]
    Pending,
    /// The task's output was supplied from cache; it will not execute.
    FromCache,
}

/// A DAG of tasks and data nodes representing one runnable pipeline.
#[derive(Clone)]
pub struct Scenario {
    id: ScenarioId,
    name: String,
    config_id: ConfigId,
    data_nodes: HashMap<DataNodeId, DataNode>,
    tasks: HashMap<TaskId, TaskSpec>,
    /// Producing task per data node; enforces the single-writer rule.
    producers: HashMap<DataNodeId, TaskId>,
    run_states: HashMap<TaskId, TaskRunState>,
}

impl std::fmt::Debug for Scenario {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scenario")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("config_id", &self.config_id)
            .field("tasks", &self.tasks.len())
            .field("data_nodes", &self.data_nodes.len())
            .finish()
    }
}

impl Scenario {
    /// Create a new empty scenario.
    pub fn new(
        id: impl Into<ScenarioId>,
        name: impl Into<String>,
        config_id: impl Into<ConfigId>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            config_id: config_id.into(),
            data_nodes: HashMap::new(),
            tasks: HashMap::new(),
            producers: HashMap::new(),
            run_states: HashMap::new(),
        }
    }

    pub fn id(&self) -> &ScenarioId {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config_id(&self) -> &ConfigId {
        &self.config_id
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }

    pub fn data_node_count(&self) -> usize {
        self.data_nodes.len()
    }

    /// Add a data node. Fails on duplicate id.
    pub fn add_data_node(&mut self, node: DataNode) -> Result<(), ScenarioError> {
        if self.data_nodes.contains_key(node.id()) {
            return Err(ScenarioError::DuplicateDataNode(node.id().clone()));
        }
        self.data_nodes.insert(node.id().clone(), node);
        Ok(())
    }

    /// Add a task, wiring it into the graph.
    ///
    /// All referenced data nodes must already exist, and no output node may
    /// already have a producer.
    pub fn add_task(&mut self, task: TaskSpec) -> Result<(), ScenarioError> {
        if self.tasks.contains_key(task.id()) {
            return Err(ScenarioError::DuplicateTask(task.id().clone()));
        }
        for node in task.inputs().iter().chain(task.outputs()) {
            if !self.data_nodes.contains_key(node) {
                return Err(ScenarioError::MissingDataNode {
                    task: task.id().clone(),
                    node: node.clone(),
                });
            }
        }
        for node in task.outputs() {
            if let Some(producer) = self.producers.get(node) {
                return Err(ScenarioError::DuplicateProducer {
                    node: node.clone(),
                    producer: producer.clone(),
                    task: task.id().clone(),
                });
            }
        }

        for node in task.outputs() {
            self.producers.insert(node.clone(), task.id().clone());
        }
        self.run_states
            .insert(task.id().clone(), TaskRunState::Pending);
        self.tasks.insert(task.id().clone(), task);
        Ok(())
    }

    /// Get a task by id.
    pub fn task(&self, id: &TaskId) -> Option<&TaskSpec> {
        self.tasks.get(id)
    }

    /// Get a data node by id.
    pub fn data_node(&self, id: &DataNodeId) -> Option<&DataNode> {
        self.data_nodes.get(id)
    }

    /// Mutable access to a data node (used by the executor and the manager
    /// when installing produced or cached outputs).
    pub fn data_node_mut(&mut self, id: &DataNodeId) -> Option<&mut DataNode> {
        self.data_nodes.get_mut(id)
    }

    /// All task ids.
    pub fn task_ids(&self) -> Vec<TaskId> {
        self.tasks.keys().cloned().collect()
    }

    /// All data nodes.
    pub fn data_nodes(&self) -> impl Iterator<Item = &DataNode> {
        self.data_nodes.values()
    }

    /// The task producing the given data node, if any.
    pub fn producer(&self, node: &DataNodeId) -> Option<&TaskId> {
        self.producers.get(node)
    }

    /// Tasks this task depends on (producers of its inputs).
    pub fn dependencies(&self, id: &TaskId) -> Result<Vec<TaskId>, ScenarioError> {
        let task = self
            .tasks
            .get(id)
            .ok_or_else(|| ScenarioError::TaskNotFound(id.clone()))?;
        let mut deps: Vec<TaskId> = task
            .inputs()
            .iter()
            .filter_map(|node| self.producers.get(node).cloned())
            .collect();
        deps.sort();
        deps.dedup();
        Ok(deps)
    }

    /// Tasks that consume any of this task's outputs.
    pub fn downstream(&self, id: &TaskId) -> Vec<TaskId> {
        let Some(task) = self.tasks.get(id) else {
            return Vec::new();
        };
        let mut result: Vec<TaskId> = self
            .tasks
            .values()
            .filter(|candidate| {
                candidate
                    .inputs()
                    .iter()
                    .any(|node| task.outputs().contains(node))
            })
            .map(|t| t.id().clone())
            .collect();
        result.sort();
        result
    }

    /// The planned run state of a task.
    pub fn run_state(&self, id: &TaskId) -> Option<TaskRunState> {
        self.run_states.get(id).copied()
    }

    /// Mark a task as supplied from cache.
    pub fn mark_from_cache(&mut self, id: &TaskId) -> Result<(), ScenarioError> {
        if !self.tasks.contains_key(id) {
            return Err(ScenarioError::TaskNotFound(id.clone()));
        }
        self.run_states.insert(id.clone(), TaskRunState::FromCache);
        Ok(())
    }

    /// Reset all tasks to pending execution.
    pub fn reset_run_states(&mut self) {
        for state in self.run_states.values_mut() {
            *state = TaskRunState::Pending;
        }
    }

    /// Tasks in topological order (Kahn's algorithm).
    ///
    /// Ties are broken by task id so the order is deterministic.
    pub fn topological_sort(&self) -> Result<Vec<TaskId>, ScenarioError> {
        let mut in_degree: HashMap<TaskId, usize> = HashMap::new();
        let mut dependents: HashMap<TaskId, Vec<TaskId>> = HashMap::new();

        for id in self.tasks.keys() {
            let deps = self.dependencies(id)?;
            in_degree.insert(id.clone(), deps.len());
            for dep in deps {
                dependents.entry(dep).or_default().push(id.clone());
            }
        }

        let mut roots: Vec<TaskId> = in_degree
            .iter()
            .filter(|(_, degree)| **degree == 0)
            .map(|(id, _)| id.clone())
            .collect();
        roots.sort();
        let mut queue: VecDeque<TaskId> = roots.into();

        let mut order = Vec::with_capacity(self.tasks.len());
        while let Some(id) = queue.pop_front() {
            order.push(id.clone());
            let mut ready = Vec::new();
            if let Some(downstream) = dependents.get(&id) {
                for next in downstream {
                    if let Some(degree) = in_degree.get_mut(next) {
                        *degree -= 1;
                        if *degree == 0 {
                            ready.push(next.clone());
                        }
                    }
                }
            }
            ready.sort();
            queue.extend(ready);
        }

        if order.len() != self.tasks.len() {
            let stuck = in_degree
                .iter()
                .filter(|(_, degree)| **degree > 0)
                .map(|(id, _)| id.clone())
                .min()
                .ok_or_else(|| ScenarioError::CycleDetected(TaskId::new("unknown")))?;
            return Err(ScenarioError::CycleDetected(stuck));
        }

        Ok(order)
    }

    /// Validate the graph: all references resolve and no cycles exist.
    pub fn validate(&self) -> Result<(), ScenarioError> {
        self.topological_sort()?;
        Ok(())
    }

    /// Create an unsaved copy under a new identity.
    ///
    /// Data nodes and tasks are cloned; run states are reset to pending.
    /// The original is untouched.
    pub fn fork(&self, id: ScenarioId, name: impl Into<String>) -> Scenario {
        let mut copy = self.clone();
        copy.id = id;
        copy.name = name.into();
        copy.reset_run_states();
        copy
    }
}

/// Builder for constructing scenarios fluently.
pub struct ScenarioBuilder {
    scenario: Scenario,
    error: Option<ScenarioError>,
}

impl ScenarioBuilder {
    /// Start building a scenario.
    pub fn new(
        id: impl Into<ScenarioId>,
        name: impl Into<String>,
        config_id: impl Into<ConfigId>,
    ) -> Self {
        Self {
            scenario: Scenario::new(id, name, config_id),
            error: None,
        }
    }

    /// Add a source data node with an initial value.
    pub fn data_node(mut self, id: impl Into<DataNodeId>, value: Value) -> Self {
        if self.error.is_none() {
            if let Err(e) = self.scenario.add_data_node(DataNode::new(id, value)) {
                self.error = Some(e);
            }
        }
        self
    }

    /// Add a task.
    pub fn task(mut self, task: TaskSpec) -> Self {
        if self.error.is_none() {
            if let Err(e) = self.scenario.add_task(task) {
                self.error = Some(e);
            }
        }
        self
    }

    /// Build the scenario, validating the graph.
    pub fn build(self) -> Result<Scenario, ScenarioError> {
        if let Some(e) = self.error {
            return Err(e);
        }
        self.scenario.validate()?;
        Ok(self.scenario)
    }
}
