//! Persistence layer for run history
//!
//! The scheduler knows nothing about storage. A recorder task consumes the
//! event stream and writes runs, task-runs and log lines into a `RunStore`.

#[cfg(feature = "sqlite")]
pub mod store;

#[cfg(feature = "sqlite")]
pub use store::SqliteRunStore;

use crate::core::{FailureKind, LogLine, Run, RunStatus, TaskRun};
use crate::execution::PipelineEvent;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use uuid::Uuid;

/// Trait for persistence backends
#[async_trait::async_trait]
pub trait RunStore: Send + Sync {
    /// Record a run that just started
    async fn create_run(&self, run: &Run) -> Result<()>;

    /// Set a run's terminal status
    async fn finish_run(&self, run_id: Uuid, status: RunStatus, ended_at: DateTime<Utc>) -> Result<()>;

    /// Record a task-run that just started
    async fn create_task_run(&self, task_run: &TaskRun) -> Result<()>;

    /// Set a task-run's terminal status
    async fn finish_task_run(
        &self,
        task_run_id: Uuid,
        status: RunStatus,
        exit_code: Option<i32>,
        failure: Option<FailureKind>,
        ended_at: DateTime<Utc>,
    ) -> Result<()>;

    /// Append one log line
    async fn append_log(&self, line: &LogLine) -> Result<()>;

    /// Load a run by ID
    async fn load_run(&self, run_id: Uuid) -> Result<Option<Run>>;

    /// Most recent runs first, optionally for one pipeline
    async fn list_runs(&self, pipeline_id: Option<&str>, limit: usize) -> Result<Vec<Run>>;

    /// Task-runs of a run, in start order
    async fn task_runs(&self, run_id: Uuid) -> Result<Vec<TaskRun>>;

    /// Log lines of a task-run, in append order
    async fn logs(&self, task_run_id: Uuid) -> Result<Vec<LogLine>>;
}

/// In-memory persistence (for testing or ephemeral use)
#[derive(Default)]
pub struct InMemoryRunStore {
    runs: RwLock<HashMap<Uuid, Run>>,
    task_runs: RwLock<Vec<TaskRun>>,
    logs: RwLock<HashMap<Uuid, Vec<LogLine>>>,
}

impl InMemoryRunStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl RunStore for InMemoryRunStore {
    async fn create_run(&self, run: &Run) -> Result<()> {
        self.runs.write().await.insert(run.id, run.clone());
        Ok(())
    }

    async fn finish_run(&self, run_id: Uuid, status: RunStatus, ended_at: DateTime<Utc>) -> Result<()> {
        let mut runs = self.runs.write().await;
        let run = runs
            .get_mut(&run_id)
            .with_context(|| format!("Unknown run {}", run_id))?;
        if !run.finish(status, ended_at) {
            anyhow::bail!("Run {} is already finished", run_id);
        }
        Ok(())
    }

    async fn create_task_run(&self, task_run: &TaskRun) -> Result<()> {
        self.task_runs.write().await.push(task_run.clone());
        Ok(())
    }

    async fn finish_task_run(
        &self,
        task_run_id: Uuid,
        status: RunStatus,
        exit_code: Option<i32>,
        failure: Option<FailureKind>,
        ended_at: DateTime<Utc>,
    ) -> Result<()> {
        let mut task_runs = self.task_runs.write().await;
        let task_run = task_runs
            .iter_mut()
            .find(|t| t.id == task_run_id)
            .with_context(|| format!("Unknown task-run {}", task_run_id))?;
        if !task_run.finish(status, exit_code, failure, ended_at) {
            anyhow::bail!("Task-run {} is already finished", task_run_id);
        }
        Ok(())
    }

    async fn append_log(&self, line: &LogLine) -> Result<()> {
        self.logs
            .write()
            .await
            .entry(line.task_run_id)
            .or_default()
            .push(line.clone());
        Ok(())
    }

    async fn load_run(&self, run_id: Uuid) -> Result<Option<Run>> {
        Ok(self.runs.read().await.get(&run_id).cloned())
    }

    async fn list_runs(&self, pipeline_id: Option<&str>, limit: usize) -> Result<Vec<Run>> {
        let runs = self.runs.read().await;
        let mut result: Vec<Run> = runs
            .values()
            .filter(|r| pipeline_id.map_or(true, |p| r.pipeline_id == p))
            .cloned()
            .collect();
        result.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        result.truncate(limit);
        Ok(result)
    }

    async fn task_runs(&self, run_id: Uuid) -> Result<Vec<TaskRun>> {
        Ok(self
            .task_runs
            .read()
            .await
            .iter()
            .filter(|t| t.run_id == run_id)
            .cloned()
            .collect())
    }

    async fn logs(&self, task_run_id: Uuid) -> Result<Vec<LogLine>> {
        Ok(self
            .logs
            .read()
            .await
            .get(&task_run_id)
            .cloned()
            .unwrap_or_default())
    }
}

/// Write a single event to the store
pub async fn record_event(store: &dyn RunStore, event: &PipelineEvent) -> Result<()> {
    match event {
        PipelineEvent::RunStart { run_id, pipeline_id, start_time } => {
            store.create_run(&Run::start(*run_id, pipeline_id.clone(), *start_time)).await
        }
        PipelineEvent::RunFinish { run_id, status, end_time } => {
            store.finish_run(*run_id, *status, *end_time).await
        }
        PipelineEvent::TaskStart { task_run_id, run_id, task_id, start_time } => {
            store
                .create_task_run(&TaskRun::start(*task_run_id, *run_id, task_id.clone(), *start_time))
                .await
        }
        PipelineEvent::TaskLog { task_run_id, message, level, timestamp } => {
            store
                .append_log(&LogLine {
                    task_run_id: *task_run_id,
                    level: *level,
                    message: message.clone(),
                    timestamp: *timestamp,
                })
                .await
        }
        PipelineEvent::TaskFinish { task_run_id, status, exit_code, failure, end_time } => {
            store
                .finish_task_run(*task_run_id, *status, *exit_code, *failure, *end_time)
                .await
        }
    }
}

/// Consume events until every sender is gone, persisting each one
///
/// Store failures are logged and skipped; they never reach the scheduler.
pub fn spawn_recorder(
    store: Arc<dyn RunStore>,
    mut events: mpsc::UnboundedReceiver<PipelineEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        debug!("Run recorder started");
        while let Some(event) = events.recv().await {
            if let Err(e) = record_event(store.as_ref(), &event).await {
                warn!("Failed to persist {} event: {:#}", event.name(), e);
            }
        }
        debug!("Run recorder finished (channel closed)");
    })
}
