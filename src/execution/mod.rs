//! Pipeline execution engine

pub mod events;
pub mod executor;
pub mod scheduler;
pub mod signal;

pub use events::{ChannelSink, EventBus, EventHandler, EventSink, NullSink, PipelineEvent};
pub use executor::{ExecContext, ExecOutcome, ProcessExecutor, TaskExecutor, FAILURE_EXIT_CODE};
pub use scheduler::{RunOutcome, RunReport, Scheduler, TaskResult};
pub use signal::AbortSignal;
