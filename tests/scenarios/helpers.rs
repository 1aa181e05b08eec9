//! Test utility functions for hop scenarios

use hop::core::config::PipelineConfig;
use hop::core::{FailureKind, LogLevel, Pipeline, RunStatus};
use hop::execution::{EventSink, PipelineEvent, RunReport, Scheduler};

use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use uuid::Uuid;

/// Sink that keeps every event in emission order
#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<PipelineEvent>>,
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<PipelineEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl EventSink for RecordingSink {
    fn emit(&self, event: PipelineEvent) {
        self.events.lock().unwrap().push(event);
    }
}

/// Final state of one task-run, rebuilt from the event stream
#[derive(Debug, Clone)]
pub struct TaskOutcome {
    pub task_run_id: Uuid,
    pub status: RunStatus,
    pub exit_code: Option<i32>,
    pub failure: Option<FailureKind>,
    pub logs: Vec<(LogLevel, String)>,
}

/// Test result wrapper
#[derive(Debug)]
pub struct PipelineTestResult {
    pub report: RunReport,
    pub events: Vec<PipelineEvent>,
    pub elapsed: Duration,
}

impl PipelineTestResult {
    pub fn is_success(&self) -> bool {
        self.report.status == RunStatus::Completed
    }

    /// Task IDs in the order their task:start events were emitted
    pub fn start_order(&self) -> Vec<String> {
        self.events
            .iter()
            .filter_map(|e| match e {
                PipelineEvent::TaskStart { task_id, .. } => Some(task_id.clone()),
                _ => None,
            })
            .collect()
    }

    /// Rebuild the outcome of a task from its events
    pub fn task(&self, task_id: &str) -> TaskOutcome {
        let task_run_id = self
            .events
            .iter()
            .find_map(|e| match e {
                PipelineEvent::TaskStart { task_run_id, task_id: id, .. } if id == task_id => {
                    Some(*task_run_id)
                }
                _ => None,
            })
            .unwrap_or_else(|| panic!("Task '{}' never started", task_id));

        let mut logs = Vec::new();
        let mut finish = None;
        for event in &self.events {
            match event {
                PipelineEvent::TaskLog { task_run_id: id, message, level, .. } if *id == task_run_id => {
                    logs.push((*level, message.clone()));
                }
                PipelineEvent::TaskFinish { task_run_id: id, status, exit_code, failure, .. }
                    if *id == task_run_id =>
                {
                    finish = Some((*status, *exit_code, *failure));
                }
                _ => {}
            }
        }

        let (status, exit_code, failure) =
            finish.unwrap_or_else(|| panic!("Task '{}' never finished", task_id));
        TaskOutcome { task_run_id, status, exit_code, failure, logs }
    }

    /// Timestamp of the task's task:start event
    pub fn start_time(&self, task_id: &str) -> DateTime<Utc> {
        self.events
            .iter()
            .find_map(|e| match e {
                PipelineEvent::TaskStart { task_id: id, start_time, .. } if id == task_id => {
                    Some(*start_time)
                }
                _ => None,
            })
            .unwrap_or_else(|| panic!("Task '{}' never started", task_id))
    }

    /// Timestamp of the task's task:finish event
    pub fn finish_time(&self, task_id: &str) -> DateTime<Utc> {
        let task_run_id = self.task(task_id).task_run_id;
        self.events
            .iter()
            .find_map(|e| match e {
                PipelineEvent::TaskFinish { task_run_id: id, end_time, .. } if *id == task_run_id => {
                    Some(*end_time)
                }
                _ => None,
            })
            .unwrap_or_else(|| panic!("Task '{}' never finished", task_id))
    }

    pub fn summary(&self) -> String {
        format!(
            "{} - {} events, {:?}",
            self.report.status,
            self.events.len(),
            self.report.tasks
        )
    }
}

/// Build a pipeline from YAML and run it with real shell processes
pub async fn run_yaml(yaml: &str) -> PipelineTestResult {
    let config = PipelineConfig::from_yaml(yaml).unwrap();
    let pipeline = config.to_pipeline().unwrap();
    run_pipeline(&pipeline).await
}

pub async fn run_pipeline(pipeline: &Pipeline) -> PipelineTestResult {
    let sink = RecordingSink::new();
    let scheduler = Scheduler::with_processes(sink.clone());

    let start = Instant::now();
    let report = scheduler.run_pipeline(pipeline).await.unwrap();
    let elapsed = start.elapsed();

    PipelineTestResult { report, events: sink.events(), elapsed }
}

/// Assert pipeline completed successfully
pub fn assert_pipeline_completed(result: &PipelineTestResult) {
    assert!(
        result.is_success(),
        "Pipeline should be completed, but was: {}",
        result.summary()
    );
}

/// Assert pipeline failed
pub fn assert_pipeline_failed(result: &PipelineTestResult) {
    assert!(
        !result.is_success(),
        "Pipeline should have failed, but was: {}",
        result.summary()
    );
}

/// Assert a task completed with exit code 0
pub fn assert_task_completed(result: &PipelineTestResult, task_id: &str) {
    let task = result.task(task_id);
    assert_eq!(task.status, RunStatus::Completed, "Task '{}': {:?}", task_id, task);
    assert_eq!(task.exit_code, Some(0), "Task '{}': {:?}", task_id, task);
    assert_eq!(task.failure, None);
}

/// Assert a task failed with the given kind and exit code
pub fn assert_task_failed(
    result: &PipelineTestResult,
    task_id: &str,
    kind: FailureKind,
    exit_code: Option<i32>,
) {
    let task = result.task(task_id);
    assert_eq!(task.status, RunStatus::Failed, "Task '{}': {:?}", task_id, task);
    assert_eq!(task.failure, Some(kind), "Task '{}': {:?}", task_id, task);
    assert_eq!(task.exit_code, exit_code, "Task '{}': {:?}", task_id, task);
}

/// Assert a task logged a line containing `needle`
pub fn assert_task_logged(result: &PipelineTestResult, task_id: &str, needle: &str) {
    let task = result.task(task_id);
    assert!(
        task.logs.iter().any(|(_, line)| line.contains(needle)),
        "Task '{}' logs {:?} do not contain {:?}",
        task_id,
        task.logs,
        needle
    );
}

/// Assert the run's event stream is well formed
///
/// run:start comes first and run:finish last; each task:start is followed
/// by its logs and exactly one task:finish, all before run:finish.
pub fn assert_event_lifecycle(result: &PipelineTestResult) {
    let events = &result.events;
    assert!(
        matches!(events.first(), Some(PipelineEvent::RunStart { .. })),
        "First event should be run:start: {:?}",
        events.first()
    );
    assert!(
        matches!(events.last(), Some(PipelineEvent::RunFinish { .. })),
        "Last event should be run:finish: {:?}",
        events.last()
    );
    let run_finishes = events.iter().filter(|e| e.name() == "run:finish").count();
    assert_eq!(run_finishes, 1);

    let mut started = Vec::new();
    let mut finished = Vec::new();
    for event in events {
        match event {
            PipelineEvent::TaskStart { task_run_id, run_id, .. } => {
                assert_eq!(*run_id, result.report.run_id);
                assert!(!started.contains(task_run_id), "Duplicate task:start");
                started.push(*task_run_id);
            }
            PipelineEvent::TaskLog { task_run_id, .. } => {
                assert!(started.contains(task_run_id), "task:log before task:start");
                assert!(!finished.contains(task_run_id), "task:log after task:finish");
            }
            PipelineEvent::TaskFinish { task_run_id, .. } => {
                assert!(started.contains(task_run_id), "task:finish before task:start");
                assert!(!finished.contains(task_run_id), "Duplicate task:finish");
                finished.push(*task_run_id);
            }
            _ => {}
        }
    }
    assert_eq!(started.len(), finished.len(), "Every started task must finish");
    assert_eq!(started.len(), result.report.tasks.len(), "One task-run per task");
}
