//! Pipeline configuration from YAML

use crate::core::{graph, pipeline::Task, Pipeline};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Top-level pipeline configuration loaded from YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Pipeline identifier
    pub id: String,

    /// Trigger schedule (stored, never interpreted)
    #[serde(default)]
    pub schedule: Option<String>,

    /// Cancel the rest of the run on the first task failure
    #[serde(default, alias = "failFast")]
    pub fail_fast: bool,

    /// Pipeline tasks
    pub tasks: Vec<TaskConfig>,
}

/// Task configuration as defined in YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskConfig {
    /// Unique task identifier
    pub id: String,

    /// Human-readable task name
    #[serde(default)]
    pub name: Option<String>,

    /// Shell command to run
    pub command: String,

    /// List of task IDs this task depends on
    #[serde(default, alias = "dependsOn")]
    pub depends_on: Vec<String>,
}

impl PipelineConfig {
    /// Load pipeline configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read pipeline file {}", path.display()))?;
        Self::from_yaml(&content)
            .with_context(|| format!("Failed to load pipeline {}", path.display()))
    }

    /// Parse pipeline configuration from YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: PipelineConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Find a pipeline file by path or by name inside `dir`
    ///
    /// Tries `name` as given, then `dir/name`, `dir/name.yaml` and `dir/name.yml`.
    pub fn resolve(dir: &Path, name: &str) -> Result<PathBuf> {
        let candidates = [
            PathBuf::from(name),
            dir.join(name),
            dir.join(format!("{}.yaml", name)),
            dir.join(format!("{}.yml", name)),
        ];

        candidates
            .into_iter()
            .find(|p| p.is_file())
            .with_context(|| format!("Pipeline '{}' not found (searched {})", name, dir.display()))
    }

    /// Validate the pipeline configuration
    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            anyhow::bail!("Pipeline ID must not be empty");
        }

        let mut seen_ids = HashSet::new();
        for task in &self.tasks {
            if task.id.trim().is_empty() {
                anyhow::bail!("Task ID must not be empty");
            }
            if task.command.trim().is_empty() {
                anyhow::bail!("Task '{}' has an empty command", task.id);
            }
            if !seen_ids.insert(&task.id) {
                anyhow::bail!("Duplicate task ID: {}", task.id);
            }
        }

        graph::validate(&self.task_definitions())?;

        Ok(())
    }

    /// Domain tasks in definition order
    pub(crate) fn task_definitions(&self) -> Vec<Task> {
        self.tasks
            .iter()
            .map(|t| Task {
                id: t.id.clone(),
                name: t.name.clone(),
                command: t.command.clone(),
                depends_on: t.depends_on.clone(),
            })
            .collect()
    }

    /// Task IDs in dependency order
    pub fn execution_order(&self) -> Result<Vec<String>> {
        Ok(graph::topological_order(&self.task_definitions())?)
    }

    /// Convert config to a Pipeline domain model
    pub fn to_pipeline(&self) -> Result<Pipeline> {
        Ok(Pipeline::from_config(self)?)
    }
}
