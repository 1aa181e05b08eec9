//! CLI output formatting

use crate::{
    core::{LogLevel, Run, RunStatus, TaskRun},
    execution::PipelineEvent,
};
use console::Emoji;
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use uuid::Uuid;

// Re-export style
pub use console::style;

// Emojis for output
pub static CHECK: Emoji<'_, '_> = Emoji("✅ ", "✓ ");
pub static CROSS: Emoji<'_, '_> = Emoji("❌ ", "✗ ");
pub static SPINNER: Emoji<'_, '_> = Emoji("⏳ ", "~ ");
pub static INFO: Emoji<'_, '_> = Emoji("ℹ️  ", "i ");
pub static WARN: Emoji<'_, '_> = Emoji("⚠️  ", "!");
pub static ROCKET: Emoji<'_, '_> = Emoji("🚀 ", "> ");

/// Create a progress bar
pub fn create_progress_bar(total: usize) -> ProgressBar {
    let progress = ProgressBar::new(total as u64);
    if let Ok(bar_style) = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
    {
        progress.set_style(bar_style.progress_chars("#>-"));
    }
    progress.enable_steady_tick(Duration::from_millis(100));
    progress
}

/// Format a run status for display
pub fn format_status(status: RunStatus) -> String {
    match status {
        RunStatus::Pending => style("PENDING").dim().to_string(),
        RunStatus::Running => style("RUNNING").yellow().to_string(),
        RunStatus::Completed => style("COMPLETED").green().to_string(),
        RunStatus::Failed => style("FAILED").red().to_string(),
    }
}

fn status_icon(status: RunStatus) -> &'static Emoji<'static, 'static> {
    match status {
        RunStatus::Completed => &CHECK,
        RunStatus::Failed => &CROSS,
        RunStatus::Running => &SPINNER,
        RunStatus::Pending => &INFO,
    }
}

/// Format a run for history listings
pub fn format_run(run: &Run) -> String {
    let duration = run
        .ended_at
        .and_then(|end| end.signed_duration_since(run.started_at).to_std().ok())
        .map(format_duration)
        .unwrap_or_else(|| "-".to_string());

    format!(
        "{} {} - {} - {} - {} ({})",
        status_icon(run.status),
        style(&run.id.to_string()[..8]).dim(),
        style(&run.pipeline_id).bold(),
        format_status(run.status),
        style(run.started_at.to_rfc3339()).dim(),
        duration
    )
}

/// Format a task-run for run details
pub fn format_task_run(task_run: &TaskRun) -> String {
    let exit_code = task_run
        .exit_code
        .map(|c| c.to_string())
        .unwrap_or_else(|| "-".to_string());
    let failure = task_run
        .failure
        .map(|f| format!(" ({})", f))
        .unwrap_or_default();

    format!(
        "{} {} - {} - exit {}{}",
        status_icon(task_run.status),
        style(&task_run.task_id).cyan(),
        format_status(task_run.status),
        exit_code,
        style(failure).dim()
    )
}

/// Format a log line produced by a task
pub fn format_log_line(task_id: &str, level: LogLevel, message: &str) -> String {
    match level {
        LogLevel::Info => format!("  {} {}", style(format!("[{}]", task_id)).dim(), message),
        LogLevel::Error => format!("  {} {}", style(format!("[{}]", task_id)).red(), message),
    }
}

pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs < 60 {
        format!("{}.{:01}s", secs, duration.subsec_millis() / 100)
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}

/// Renders pipeline events on the terminal above a progress bar
pub struct ConsoleReporter {
    progress: ProgressBar,
    task_ids: Mutex<HashMap<Uuid, String>>,
    show_logs: bool,
}

impl ConsoleReporter {
    pub fn new(total_tasks: usize, show_logs: bool) -> Self {
        Self {
            progress: create_progress_bar(total_tasks),
            task_ids: Mutex::new(HashMap::new()),
            show_logs,
        }
    }

    fn task_id(&self, task_run_id: &Uuid) -> String {
        self.task_ids
            .lock()
            .ok()
            .and_then(|ids| ids.get(task_run_id).cloned())
            .unwrap_or_else(|| task_run_id.to_string()[..8].to_string())
    }

    pub fn handle(&self, event: &PipelineEvent) {
        match event {
            PipelineEvent::RunStart { run_id, pipeline_id, .. } => {
                self.progress.println(format!(
                    "{} Starting pipeline {} ({})",
                    ROCKET,
                    style(pipeline_id).bold(),
                    style(&run_id.to_string()[..8]).dim()
                ));
            }
            PipelineEvent::TaskStart { task_run_id, task_id, .. } => {
                if let Ok(mut ids) = self.task_ids.lock() {
                    ids.insert(*task_run_id, task_id.clone());
                }
                self.progress.set_message(task_id.clone());
                self.progress.println(format!("{} {}", SPINNER, style(task_id).cyan()));
            }
            PipelineEvent::TaskLog { task_run_id, message, level, .. } => {
                if self.show_logs {
                    self.progress
                        .println(format_log_line(&self.task_id(task_run_id), *level, message));
                }
            }
            PipelineEvent::TaskFinish { task_run_id, status, exit_code, failure, .. } => {
                let task_id = self.task_id(task_run_id);
                self.progress.inc(1);
                let line = match (status, failure) {
                    (RunStatus::Completed, _) => format!("{} {}", CHECK, style(task_id).green()),
                    (_, Some(kind)) => format!(
                        "{} {}: {} (exit {})",
                        CROSS,
                        style(task_id).red(),
                        style(kind).dim(),
                        exit_code.map(|c| c.to_string()).unwrap_or_else(|| "-".to_string())
                    ),
                    _ => format!("{} {}", CROSS, style(task_id).red()),
                };
                self.progress.println(line);
            }
            PipelineEvent::RunFinish { .. } => {
                self.progress.finish_and_clear();
            }
        }
    }
}
