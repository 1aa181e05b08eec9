//! Process executor - runs a single task's command as a child process

use crate::{
    core::{LogLevel, RunStatus, Task, TaskError},
    execution::{AbortSignal, EventSink, PipelineEvent},
};
use async_trait::async_trait;
use chrono::Utc;
use std::process::Stdio;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};
use tokio::process::Command;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Exit code reported for every execution failure, whatever the process returned
pub const FAILURE_EXIT_CODE: i32 = 1;

/// Everything a task-run needs besides the task itself
#[derive(Clone)]
pub struct ExecContext {
    pub run_id: Uuid,
    pub task_run_id: Uuid,
    pub signal: AbortSignal,
    pub events: Arc<dyn EventSink>,
}

impl ExecContext {
    fn finish(&self, status: RunStatus, exit_code: Option<i32>, error: Option<&TaskError>) {
        self.events.emit(PipelineEvent::TaskFinish {
            task_run_id: self.task_run_id,
            status,
            exit_code,
            failure: error.map(TaskError::kind),
            end_time: Utc::now(),
        });
    }
}

/// Result of a task-run that reached the executor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecOutcome {
    pub status: RunStatus,
    pub exit_code: Option<i32>,
}

/// Trait for task execution - allows for different implementations
///
/// Implementations emit `task:start`, every `task:log` line and exactly one
/// `task:finish` for `ctx.task_run_id`, in that order.
#[async_trait]
pub trait TaskExecutor: Send + Sync {
    async fn execute(&self, task: &Task, ctx: ExecContext) -> Result<ExecOutcome, TaskError>;
}

/// Runs task commands through the system shell
#[derive(Debug, Clone, Default)]
pub struct ProcessExecutor;

impl ProcessExecutor {
    pub fn new() -> Self {
        Self
    }

    fn shell_command(command: &str) -> Command {
        if cfg!(windows) {
            let mut c = Command::new("cmd");
            c.arg("/C").arg(command);
            c
        } else {
            let mut c = Command::new("sh");
            c.arg("-c").arg(command);
            c
        }
    }

    /// Spawn, drain and reap the process. Ok means exit code 0.
    async fn run_process(&self, task: &Task, ctx: &ExecContext) -> Result<(), TaskError> {
        let mut child = Self::shell_command(&task.command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| TaskError::ExecutionFailure {
                message: format!("Failed to spawn process: {}", e),
                exit_code: None,
            })?;

        debug!("Spawned process for task {} (pid {:?})", task.id, child.id());

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let events = ctx.events.as_ref();
        let task_run_id = ctx.task_run_id;

        let finished = tokio::select! {
            result = async {
                tokio::join!(
                    child.wait(),
                    drain_lines(stdout, LogLevel::Info, task_run_id, events),
                    drain_lines(stderr, LogLevel::Error, task_run_id, events),
                )
            } => Some(result),
            _ = ctx.signal.aborted() => None,
        };

        let Some((status, stdout_drained, stderr_drained)) = finished else {
            // The drains were dropped with the select; pipes held open by
            // descendants cannot keep this task-run alive
            warn!("Killing process for task {} after abort", task.id);
            if let Err(e) = child.kill().await {
                warn!("Failed to kill process for task {}: {}", task.id, e);
            }
            return Err(TaskError::Aborted);
        };

        let status = status.map_err(|e| TaskError::ExecutionFailure {
            message: format!("Failed to wait for process: {}", e),
            exit_code: None,
        })?;

        stdout_drained
            .and(stderr_drained)
            .map_err(|e| TaskError::ExecutionFailure {
                message: format!("Failed to read process output: {}", e),
                exit_code: status.code(),
            })?;

        match status.code() {
            Some(0) => Ok(()),
            Some(code) => Err(TaskError::ExecutionFailure {
                message: format!("Exit code {}", code),
                exit_code: Some(code),
            }),
            None => Err(TaskError::ExecutionFailure {
                message: "Process terminated by signal".to_string(),
                exit_code: None,
            }),
        }
    }
}

#[async_trait]
impl TaskExecutor for ProcessExecutor {
    async fn execute(&self, task: &Task, ctx: ExecContext) -> Result<ExecOutcome, TaskError> {
        ctx.events.emit(PipelineEvent::TaskStart {
            task_run_id: ctx.task_run_id,
            run_id: ctx.run_id,
            task_id: task.id.clone(),
            start_time: Utc::now(),
        });

        if ctx.signal.is_aborted() {
            info!("Task {} aborted before start", task.id);
            let err = TaskError::Aborted;
            ctx.finish(RunStatus::Failed, None, Some(&err));
            return Err(err);
        }

        info!("Executing task: {}", task.id);
        match self.run_process(task, &ctx).await {
            Ok(()) => {
                info!("Task {} completed successfully", task.id);
                ctx.finish(RunStatus::Completed, Some(0), None);
                Ok(ExecOutcome {
                    status: RunStatus::Completed,
                    exit_code: Some(0),
                })
            }
            Err(err) => {
                warn!("Task {} failed: {}", task.id, err);
                ctx.events.emit(PipelineEvent::log(
                    ctx.task_run_id,
                    LogLevel::Error,
                    format!("Exec failed: {}", err),
                ));
                // A killed process has no meaningful exit code
                let exit_code = match err {
                    TaskError::Aborted => None,
                    _ => Some(FAILURE_EXIT_CODE),
                };
                ctx.finish(RunStatus::Failed, exit_code, Some(&err));
                Err(err)
            }
        }
    }
}

/// Longest output line kept in memory; longer lines are split into chunks
pub(crate) const MAX_LINE_BYTES: usize = 64 * 1024;

/// Emit each non-blank line of `reader` as a `task:log` event
///
/// Only the `\n` / `\r\n` terminator is stripped. Bytes are decoded lossily
/// so invalid UTF-8 cannot fail a task.
async fn drain_lines<R>(
    reader: Option<R>,
    level: LogLevel,
    task_run_id: Uuid,
    events: &dyn EventSink,
) -> std::io::Result<()>
where
    R: AsyncRead + Unpin,
{
    let Some(reader) = reader else {
        return Ok(());
    };

    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        let read = (&mut reader)
            .take(MAX_LINE_BYTES as u64)
            .read_until(b'\n', &mut buf)
            .await?;
        if read == 0 {
            return Ok(());
        }
        if buf.last() == Some(&b'\n') {
            buf.pop();
            if buf.last() == Some(&b'\r') {
                buf.pop();
            }
        }
        let line = String::from_utf8_lossy(&buf);
        if line.trim().is_empty() {
            continue;
        }
        events.emit(PipelineEvent::log(task_run_id, level, line));
    }
}
