//! Error types for graph validation and task execution

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A pipeline graph that cannot be executed
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
    #[error("Duplicate task ID: {0}")]
    DuplicateTask(String),

    #[error("Task '{task}' depends on unknown task '{dependency}'")]
    UnknownDependency { task: String, dependency: String },

    #[error("Cycle detected in dependency graph involving tasks: {}", .tasks.join(", "))]
    CycleDetected { tasks: Vec<String> },
}

/// Why a task-run did not complete
///
/// Cloneable so every dependent joining the same task handle sees the result.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TaskError {
    #[error("Task aborted due to fail-fast")]
    Aborted,

    #[error("Dependency '{dependency}' did not complete successfully")]
    DependencyFailed { dependency: String },

    #[error("{message}")]
    ExecutionFailure {
        message: String,
        /// Exit code reported by the process, if it exited at all
        exit_code: Option<i32>,
    },
}

impl TaskError {
    pub fn kind(&self) -> FailureKind {
        match self {
            TaskError::Aborted => FailureKind::Aborted,
            TaskError::DependencyFailed { .. } => FailureKind::DependencyFailed,
            TaskError::ExecutionFailure { .. } => FailureKind::ExecutionFailure,
        }
    }
}

/// Failure classification carried on `task:finish`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Aborted,
    DependencyFailed,
    ExecutionFailure,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::Aborted => "aborted",
            FailureKind::DependencyFailed => "dependency_failed",
            FailureKind::ExecutionFailure => "execution_failure",
        }
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for FailureKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "aborted" => Ok(FailureKind::Aborted),
            "dependency_failed" => Ok(FailureKind::DependencyFailed),
            "execution_failure" => Ok(FailureKind::ExecutionFailure),
            other => anyhow::bail!("Unknown failure kind: {}", other),
        }
    }
}
