//! Pipeline domain model

use crate::core::{config::PipelineConfig, graph, error::GraphError};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// A named shell command with the tasks it depends on
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    /// Unique task identifier within the pipeline
    pub id: String,

    /// Optional human-readable name
    pub name: Option<String>,

    /// Shell command to execute
    pub command: String,

    /// IDs of tasks that must complete successfully first
    pub depends_on: Vec<String>,
}

impl Task {
    pub fn new(id: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: None,
            command: command.into(),
            depends_on: Vec::new(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn depends_on<I, S>(mut self, deps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.depends_on.extend(deps.into_iter().map(Into::into));
        self
    }

    /// Name for display, falling back to the ID
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }
}

/// A pipeline definition
///
/// Tasks are shared behind `Arc` so concurrently running task-runs can hold
/// them without cloning commands.
#[derive(Debug, Clone)]
pub struct Pipeline {
    /// Pipeline identifier
    pub id: String,

    /// Cancel every unfinished task once one task fails
    pub fail_fast: bool,

    /// Trigger schedule, carried as-is
    pub schedule: Option<String>,

    /// Tasks in definition order
    tasks: Vec<Arc<Task>>,

    /// Task index by ID
    index: HashMap<String, usize>,
}

impl Pipeline {
    /// Build a pipeline, rejecting duplicate IDs, unknown dependencies and cycles
    pub fn new(id: impl Into<String>, tasks: Vec<Task>) -> Result<Self, GraphError> {
        graph::validate(&tasks)?;

        let tasks: Vec<Arc<Task>> = tasks.into_iter().map(Arc::new).collect();
        let index = tasks
            .iter()
            .enumerate()
            .map(|(i, task)| (task.id.clone(), i))
            .collect();

        Ok(Self {
            id: id.into(),
            fail_fast: false,
            schedule: None,
            tasks,
            index,
        })
    }

    /// Create a pipeline from configuration
    pub fn from_config(config: &PipelineConfig) -> Result<Self, GraphError> {
        Ok(Self::new(config.id.clone(), config.task_definitions())?
            .with_fail_fast(config.fail_fast)
            .with_schedule(config.schedule.clone()))
    }

    pub fn with_fail_fast(mut self, fail_fast: bool) -> Self {
        self.fail_fast = fail_fast;
        self
    }

    pub fn with_schedule(mut self, schedule: Option<String>) -> Self {
        self.schedule = schedule;
        self
    }

    /// Get a task by ID
    pub fn task(&self, id: &str) -> Option<&Arc<Task>> {
        self.index.get(id).map(|&i| &self.tasks[i])
    }

    /// All tasks in definition order
    pub fn tasks(&self) -> &[Arc<Task>] {
        &self.tasks
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Task IDs in a dependency-respecting order
    pub fn execution_order(&self) -> Vec<String> {
        let tasks: Vec<Task> = self.tasks.iter().map(|t| t.as_ref().clone()).collect();
        // Construction already proved the graph acyclic
        graph::topological_order(&tasks).unwrap_or_default()
    }
}
