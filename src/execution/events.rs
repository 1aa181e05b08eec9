//! Lifecycle events and the sinks that receive them
//!
//! Delivery is fire-and-forget: `EventSink::emit` must not block, so the
//! scheduler never waits on a slow consumer.

use crate::core::{FailureKind, LogLevel, RunStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, RwLock};
use tokio::sync::mpsc;
use tracing::warn;
use uuid::Uuid;

/// Events emitted while a pipeline runs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PipelineEvent {
    RunStart {
        run_id: Uuid,
        pipeline_id: String,
        start_time: DateTime<Utc>,
    },
    RunFinish {
        run_id: Uuid,
        status: RunStatus,
        end_time: DateTime<Utc>,
    },
    TaskStart {
        task_run_id: Uuid,
        run_id: Uuid,
        task_id: String,
        start_time: DateTime<Utc>,
    },
    TaskLog {
        task_run_id: Uuid,
        message: String,
        level: LogLevel,
        timestamp: DateTime<Utc>,
    },
    TaskFinish {
        task_run_id: Uuid,
        status: RunStatus,
        exit_code: Option<i32>,
        failure: Option<FailureKind>,
        end_time: DateTime<Utc>,
    },
}

impl PipelineEvent {
    /// Wire name of the event
    pub fn name(&self) -> &'static str {
        match self {
            PipelineEvent::RunStart { .. } => "run:start",
            PipelineEvent::RunFinish { .. } => "run:finish",
            PipelineEvent::TaskStart { .. } => "task:start",
            PipelineEvent::TaskLog { .. } => "task:log",
            PipelineEvent::TaskFinish { .. } => "task:finish",
        }
    }

    /// Task-run this event belongs to, if any
    pub fn task_run_id(&self) -> Option<Uuid> {
        match self {
            PipelineEvent::TaskStart { task_run_id, .. }
            | PipelineEvent::TaskLog { task_run_id, .. }
            | PipelineEvent::TaskFinish { task_run_id, .. } => Some(*task_run_id),
            _ => None,
        }
    }

    pub(crate) fn log(task_run_id: Uuid, level: LogLevel, message: impl Into<String>) -> Self {
        PipelineEvent::TaskLog {
            task_run_id,
            message: message.into(),
            level,
            timestamp: Utc::now(),
        }
    }
}

/// Receiver of pipeline events
pub trait EventSink: Send + Sync {
    fn emit(&self, event: PipelineEvent);
}

impl<S: EventSink + ?Sized> EventSink for Arc<S> {
    fn emit(&self, event: PipelineEvent) {
        (**self).emit(event)
    }
}

/// Sink that drops every event
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&self, _event: PipelineEvent) {}
}

/// Type for event handlers
pub type EventHandler = Arc<dyn Fn(&PipelineEvent) + Send + Sync>;

/// Fans each event out to every registered handler
#[derive(Default)]
pub struct EventBus {
    handlers: RwLock<Vec<EventHandler>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an event handler
    pub fn add_handler<F>(&self, handler: F)
    where
        F: Fn(&PipelineEvent) + Send + Sync + 'static,
    {
        match self.handlers.write() {
            Ok(mut handlers) => handlers.push(Arc::new(handler)),
            Err(poisoned) => poisoned.into_inner().push(Arc::new(handler)),
        }
    }

    /// Forward every event into a channel sink as well
    pub fn add_sink<S: EventSink + 'static>(&self, sink: S) {
        self.add_handler(move |event| sink.emit(event.clone()));
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.read().map(|h| h.len()).unwrap_or(0)
    }
}

impl EventSink for EventBus {
    fn emit(&self, event: PipelineEvent) {
        // Snapshot so a handler can register another handler without deadlocking
        let handlers: Vec<EventHandler> = match self.handlers.read() {
            Ok(handlers) => handlers.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        };
        for handler in &handlers {
            handler(&event);
        }
    }
}

/// Sends events into an unbounded channel
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<PipelineEvent>,
}

impl ChannelSink {
    pub fn new(tx: mpsc::UnboundedSender<PipelineEvent>) -> Self {
        Self { tx }
    }

    /// Create a sink together with the receiving end
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<PipelineEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }
}

impl EventSink for ChannelSink {
    fn emit(&self, event: PipelineEvent) {
        if self.tx.send(event).is_err() {
            warn!("Event receiver dropped; discarding event");
        }
    }
}
