//! Task graph scheduler - runs every task of a pipeline concurrently while
//! respecting dependency order
//!
//! Each task gets one memoized handle per run. Requesting a task that already
//! has a handle joins it; otherwise a new execution unit is spawned and
//! registered under the same lock, so two dependents racing for the same task
//! can never start it twice.

use crate::{
    core::{graph, GraphError, LogLevel, Pipeline, RunStatus, Task, TaskError},
    execution::{AbortSignal, EventSink, ExecContext, PipelineEvent, ProcessExecutor, TaskExecutor},
};
use chrono::{DateTime, Utc};
use futures::future::{self, BoxFuture, FutureExt, Shared};
use futures::stream::{FuturesUnordered, StreamExt};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Settled result of one task within a run
pub type TaskResult = Result<(), TaskError>;

type TaskHandle = Shared<BoxFuture<'static, TaskResult>>;

/// Terminal state of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Completed,
    Failed,
}

/// Summary of a finished run
#[derive(Debug, Clone)]
pub struct RunReport {
    pub run_id: Uuid,
    pub pipeline_id: String,
    pub status: RunStatus,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    /// Result per task ID
    pub tasks: BTreeMap<String, TaskResult>,
}

impl RunReport {
    pub fn outcome(&self) -> RunOutcome {
        match self.status {
            RunStatus::Completed => RunOutcome::Completed,
            _ => RunOutcome::Failed,
        }
    }

    pub fn is_success(&self) -> bool {
        self.outcome() == RunOutcome::Completed
    }

    /// Tasks that did not complete, with the reason
    pub fn failed_tasks(&self) -> Vec<(&str, &TaskError)> {
        self.tasks
            .iter()
            .filter_map(|(id, result)| result.as_ref().err().map(|e| (id.as_str(), e)))
            .collect()
    }

    pub fn task(&self, task_id: &str) -> Option<&TaskResult> {
        self.tasks.get(task_id)
    }
}

/// Drives a validated pipeline to a terminal run status
pub struct Scheduler<E> {
    executor: Arc<E>,
    events: Arc<dyn EventSink>,
}

impl Scheduler<ProcessExecutor> {
    /// Scheduler that runs tasks as shell processes
    pub fn with_processes(events: Arc<dyn EventSink>) -> Self {
        Self::new(ProcessExecutor::new(), events)
    }
}

impl<E: TaskExecutor + 'static> Scheduler<E> {
    pub fn new(executor: E, events: Arc<dyn EventSink>) -> Self {
        Self {
            executor: Arc::new(executor),
            events,
        }
    }

    /// Execute the entire pipeline as a fresh run
    ///
    /// The graph is re-validated first; an invalid graph returns an error
    /// before any event is emitted or process spawned.
    pub async fn run_pipeline(&self, pipeline: &Pipeline) -> Result<RunReport, GraphError> {
        let definitions: Vec<Task> = pipeline.tasks().iter().map(|t| t.as_ref().clone()).collect();
        graph::validate(&definitions)?;

        let run_id = Uuid::new_v4();
        let started_at = Utc::now();

        info!("Starting pipeline run: {} ({})", pipeline.id, run_id);
        self.events.emit(PipelineEvent::RunStart {
            run_id,
            pipeline_id: pipeline.id.clone(),
            start_time: started_at,
        });

        let run = Arc::new(RunState {
            run_id,
            tasks: pipeline
                .tasks()
                .iter()
                .map(|t| (t.id.clone(), t.clone()))
                .collect(),
            handles: Mutex::new(HashMap::new()),
            signal: AbortSignal::new(),
            executor: self.executor.clone(),
            events: self.events.clone(),
        });
        let _abort_on_drop = AbortOnDrop(run.signal.clone());

        // Request every task, not only the roots; memoization sorts out order
        let mut pending: FuturesUnordered<_> = pipeline
            .tasks()
            .iter()
            .map(|task| {
                let id = task.id.clone();
                let handle = RunState::handle(&run, &id);
                async move { (id, handle.await) }
            })
            .collect();

        let mut results = BTreeMap::new();
        while let Some((task_id, result)) = pending.next().await {
            if let Err(err) = &result {
                debug!("Task {} settled with failure: {}", task_id, err);
                if pipeline.fail_fast && run.signal.abort() {
                    warn!("Task {} failed; aborting run {} (fail-fast)", task_id, run_id);
                }
            }
            results.insert(task_id, result);
        }

        let status = if results.values().all(Result::is_ok) {
            RunStatus::Completed
        } else {
            RunStatus::Failed
        };
        let ended_at = Utc::now();

        match status {
            RunStatus::Completed => info!("Pipeline run finished: {} - {}", pipeline.id, status),
            _ => error!("Pipeline run finished: {} - {}", pipeline.id, status),
        }
        self.events.emit(PipelineEvent::RunFinish {
            run_id,
            status,
            end_time: ended_at,
        });

        Ok(RunReport {
            run_id,
            pipeline_id: pipeline.id.clone(),
            status,
            started_at,
            ended_at,
            tasks: results,
        })
    }
}

/// State shared by every task-run of a single run
struct RunState<E> {
    run_id: Uuid,
    tasks: HashMap<String, Arc<Task>>,
    handles: Mutex<HashMap<String, TaskHandle>>,
    signal: AbortSignal,
    executor: Arc<E>,
    events: Arc<dyn EventSink>,
}

impl<E: TaskExecutor + 'static> RunState<E> {
    /// Get or create the execution handle for a task
    fn handle(run: &Arc<Self>, task_id: &str) -> TaskHandle {
        let mut handles = run.handles.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(handle) = handles.get(task_id) {
            return handle.clone();
        }

        let handle: TaskHandle = match run.tasks.get(task_id) {
            Some(task) => {
                let lifecycle = Arc::new(TaskRunSink::new(
                    run.run_id,
                    task.id.clone(),
                    run.events.clone(),
                ));
                let join = tokio::spawn(Self::run_task(run.clone(), task.clone(), lifecycle.clone()));
                async move {
                    join.await.unwrap_or_else(|e| {
                        let err = TaskError::ExecutionFailure {
                            message: format!("Task execution unit failed: {}", e),
                            exit_code: None,
                        };
                        error!("Task {} crashed: {}", lifecycle.task_id, e);
                        lifecycle.settle(&err, format!("Exec failed: {}", err));
                        Err(err)
                    })
                }
                .boxed()
                .shared()
            }
            // Unreachable for a validated graph
            None => future::ready(Err(TaskError::ExecutionFailure {
                message: format!("Task {} not found", task_id),
                exit_code: None,
            }))
            .boxed()
            .shared(),
        };

        handles.insert(task_id.to_string(), handle.clone());
        handle
    }

    async fn run_task(run: Arc<Self>, task: Arc<Task>, lifecycle: Arc<TaskRunSink>) -> TaskResult {
        if run.signal.is_aborted() {
            return settle_unstarted(&lifecycle, TaskError::Aborted);
        }

        let dependencies = task.depends_on.iter().map(|dep| {
            let dep = dep.clone();
            Self::handle(&run, &dep).map(move |result| result.map_err(|err| (dep, err)))
        });

        let waited = tokio::select! {
            biased;
            result = future::try_join_all(dependencies) => Some(result),
            _ = run.signal.aborted() => None,
        };

        match waited {
            Some(Ok(_)) => {}
            Some(Err((_, TaskError::Aborted))) | None => {
                return settle_unstarted(&lifecycle, TaskError::Aborted);
            }
            Some(Err((dependency, _))) => {
                return settle_unstarted(&lifecycle, TaskError::DependencyFailed { dependency });
            }
        }

        // A sibling branch may have aborted while the last dependency finished
        if run.signal.is_aborted() {
            return settle_unstarted(&lifecycle, TaskError::Aborted);
        }

        let ctx = ExecContext {
            run_id: run.run_id,
            task_run_id: lifecycle.task_run_id,
            signal: run.signal.clone(),
            events: lifecycle.clone(),
        };
        run.executor.execute(&task, ctx).await.map(|_| ())
    }
}

/// Record a task-run that never reached its process
fn settle_unstarted(lifecycle: &TaskRunSink, err: TaskError) -> TaskResult {
    info!("Task {} not started: {}", lifecycle.task_id, err);
    lifecycle.settle(&err, format!("Not started: {}", err));
    Err(err)
}

/// Event sink for one task-run that remembers which lifecycle events went out
///
/// Lets the scheduler close a task-run whose execution unit died between
/// `task:start` and `task:finish`.
struct TaskRunSink {
    task_run_id: Uuid,
    run_id: Uuid,
    task_id: String,
    inner: Arc<dyn EventSink>,
    started: AtomicBool,
    finished: AtomicBool,
}

impl TaskRunSink {
    fn new(run_id: Uuid, task_id: String, inner: Arc<dyn EventSink>) -> Self {
        Self {
            task_run_id: Uuid::new_v4(),
            run_id,
            task_id,
            inner,
            started: AtomicBool::new(false),
            finished: AtomicBool::new(false),
        }
    }

    /// Emit whatever is missing of start, failure log and finish
    fn settle(&self, err: &TaskError, message: String) {
        if self.finished.load(Ordering::SeqCst) {
            return;
        }
        if !self.started.load(Ordering::SeqCst) {
            self.emit(PipelineEvent::TaskStart {
                task_run_id: self.task_run_id,
                run_id: self.run_id,
                task_id: self.task_id.clone(),
                start_time: Utc::now(),
            });
        }
        self.emit(PipelineEvent::log(self.task_run_id, LogLevel::Error, message));
        self.emit(PipelineEvent::TaskFinish {
            task_run_id: self.task_run_id,
            status: RunStatus::Failed,
            exit_code: None,
            failure: Some(err.kind()),
            end_time: Utc::now(),
        });
    }
}

impl EventSink for TaskRunSink {
    fn emit(&self, event: PipelineEvent) {
        match &event {
            PipelineEvent::TaskStart { .. } => self.started.store(true, Ordering::SeqCst),
            PipelineEvent::TaskFinish { .. } => self.finished.store(true, Ordering::SeqCst),
            _ => {}
        }
        self.inner.emit(event);
    }
}

/// Kills whatever is still running if the run future is dropped early
struct AbortOnDrop(AbortSignal);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}
