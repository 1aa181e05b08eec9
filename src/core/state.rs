//! Run, task-run and log records

use crate::core::error::FailureKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Status shared by runs and task-runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    /// Created but not started
    Pending,
    /// Currently executing
    Running,
    /// Finished successfully
    Completed,
    /// Finished unsuccessfully
    Failed,
}

impl RunStatus {
    /// Check if the status is final
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunStatus::Completed | RunStatus::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Pending => "pending",
            RunStatus::Running => "running",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RunStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(RunStatus::Pending),
            "running" => Ok(RunStatus::Running),
            "completed" => Ok(RunStatus::Completed),
            "failed" => Ok(RunStatus::Failed),
            other => anyhow::bail!("Unknown run status: {}", other),
        }
    }
}

/// Severity of a log line, derived from the stream it came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Standard output
    Info,
    /// Standard error
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Info => "info",
            LogLevel::Error => "error",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogLevel {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "info" => Ok(LogLevel::Info),
            "error" => Ok(LogLevel::Error),
            other => anyhow::bail!("Unknown log level: {}", other),
        }
    }
}

/// One execution attempt of a pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Run {
    pub id: Uuid,
    pub pipeline_id: String,
    pub status: RunStatus,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl Run {
    pub fn start(id: Uuid, pipeline_id: impl Into<String>, started_at: DateTime<Utc>) -> Self {
        Self {
            id,
            pipeline_id: pipeline_id.into(),
            status: RunStatus::Running,
            started_at,
            ended_at: None,
        }
    }

    /// Move to a terminal status; later calls are ignored
    pub fn finish(&mut self, status: RunStatus, ended_at: DateTime<Utc>) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        self.status = status;
        self.ended_at = Some(ended_at);
        true
    }
}

/// One execution attempt of a task within a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRun {
    pub id: Uuid,
    pub run_id: Uuid,
    pub task_id: String,
    pub status: RunStatus,
    /// Absent if the process never started
    pub exit_code: Option<i32>,
    pub failure: Option<FailureKind>,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl TaskRun {
    pub fn start(id: Uuid, run_id: Uuid, task_id: impl Into<String>, started_at: DateTime<Utc>) -> Self {
        Self {
            id,
            run_id,
            task_id: task_id.into(),
            status: RunStatus::Running,
            exit_code: None,
            failure: None,
            started_at,
            ended_at: None,
        }
    }

    /// Move to a terminal status; later calls are ignored
    pub fn finish(
        &mut self,
        status: RunStatus,
        exit_code: Option<i32>,
        failure: Option<FailureKind>,
        ended_at: DateTime<Utc>,
    ) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        self.status = status;
        self.exit_code = exit_code;
        self.failure = failure;
        self.ended_at = Some(ended_at);
        true
    }
}

/// A single line of task output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogLine {
    pub task_run_id: Uuid,
    pub level: LogLevel,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}
