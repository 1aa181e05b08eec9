//! hop - A minimal DAG pipeline orchestrator for shell tasks

pub mod cli;
pub mod core;
pub mod execution;
pub mod persistence;

// Re-export commonly used types
pub use core::{FailureKind, GraphError, Pipeline, RunStatus, Task, TaskError};
pub use execution::{AbortSignal, EventBus, EventSink, PipelineEvent, ProcessExecutor, RunReport, Scheduler};
pub use persistence::{InMemoryRunStore, RunStore};
