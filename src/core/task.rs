//! Task capability trait and the types flowing through it.
//!
//! The `Task` trait is the whole surface the engine sees: identity, state,
//! failure policy, timing, and an invocation that reports completion. The
//! scheduler owns state transitions; the task's `run` wrapper owns the
//! timestamps and the completion record.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use thiserror::Error;
use tokio::sync::mpsc;

use super::types::TaskId;

/// Lifecycle state of a task.
///
/// Tasks are created externally in `New`; the scheduler moves them to
/// `Running` at dispatch and to `Done` or `Failed` when their completion
/// record is consumed. A task whose predecessors never complete stays `New`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskState {
    /// Created, not yet dispatched.
    New,
    /// Dispatched; completion not yet observed. A retrying task returns
    /// here between attempts.
    Running,
    /// Completed successfully.
    Done,
    /// Completed with a failure.
    Failed,
}

/// What the scheduler does when this task reports a failure.
///
/// Immutable after construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FailurePolicy {
    /// Suppress the failure; dependents of this task never become ready.
    Continue,
    /// Re-dispatch after a fixed back-off, indefinitely.
    Repeat,
    /// Stop the run: in-flight tasks are drained, then the failure cause
    /// is returned from `start`.
    #[default]
    Abort,
}

/// Errors produced by task bodies.
#[derive(Debug, Error)]
pub enum TaskError {
    /// The task body failed with a message.
    #[error("execution failed: {0}")]
    ExecutionFailed(String),

    /// The task body panicked. The message identifies the task and carries
    /// the panic payload.
    #[error("panic in task (id: {id}, state: {state:?}, {description}): {detail}")]
    Panicked {
        id: TaskId,
        state: TaskState,
        description: String,
        detail: String,
    },

    /// Generic error wrapper.
    #[error(transparent)]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

/// Record posted by a task exactly once per dispatch.
///
/// The output value is opaque to the engine; only the presence of an error
/// is inspected.
#[derive(Debug)]
pub struct Completion {
    /// The task this record originates from.
    pub task_id: TaskId,
    /// Failure cause, if the attempt failed.
    pub error: Option<TaskError>,
    /// Opaque result value, if the attempt produced one.
    pub output: Option<serde_json::Value>,
}

impl Completion {
    /// Create a successful completion record.
    pub fn success(task_id: TaskId, output: Option<serde_json::Value>) -> Self {
        Self {
            task_id,
            error: None,
            output,
        }
    }

    /// Create a failed completion record.
    pub fn failure(task_id: TaskId, error: TaskError) -> Self {
        Self {
            task_id,
            error: Some(error),
            output: None,
        }
    }

    /// Whether this record carries a failure.
    pub fn is_failure(&self) -> bool {
        self.error.is_some()
    }
}

/// The capability a task exposes to the engine.
///
/// Implementations must uphold one contract above all: `run` posts **exactly
/// one** completion record per invocation, panics included. A missing record
/// deadlocks the scheduler; an extra record corrupts its running set.
/// [`FnTask`](crate::execution::FnTask) is the canonical implementation and
/// the right choice for almost every caller.
#[async_trait]
pub trait Task: Send + Sync {
    /// Stable identifier, unique within one runner instance.
    fn id(&self) -> TaskId;

    /// Current lifecycle state. Written only by the scheduler; safe for the
    /// caller to read after `start` returns.
    fn state(&self) -> TaskState;

    /// Set the lifecycle state. Called by the scheduler only.
    fn set_state(&self, state: TaskState);

    /// Failure policy, immutable after construction.
    fn failure_policy(&self) -> FailurePolicy;

    /// When the most recent attempt began, set inside `run` immediately
    /// before the body.
    fn start_time(&self) -> Option<Instant>;

    /// When the most recent attempt finished, set inside `run` immediately
    /// after the body and before the completion record is posted.
    fn end_time(&self) -> Option<Instant>;

    /// Invoke the user body and post exactly one completion record to
    /// `results`.
    async fn run(&self, results: mpsc::Sender<Completion>);

    /// Optional human description for display/logging purposes.
    fn description(&self) -> Option<&str> {
        None
    }
}
