//! Function-backed task implementation.
//!
//! [`FnTask`] wraps an async closure so it can be scheduled by the runner.
//! It is the canonical [`Task`] implementation: it carries the identifier,
//! description, and failure policy, and its `run` wrapper records the attempt
//! timestamps, converts panics into failure causes, and posts exactly one
//! completion record per invocation.
//!
//! # Example
//!
//! ```
//! use dagrun::{FailurePolicy, FnTask, Task};
//!
//! let task = FnTask::builder(1)
//!     .description("refresh cache")
//!     .failure_policy(FailurePolicy::Repeat)
//!     .body(|| async {
//!         // ... do the work ...
//!         Ok(None)
//!     })
//!     .build();
//!
//! assert_eq!(task.id().value(), 1);
//! ```

use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::FutureExt;
use serde_json::Value;
use std::any::Any;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, RwLock};
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::debug;

use crate::core::task::{Completion, FailurePolicy, Task, TaskError, TaskState};
use crate::core::types::TaskId;

type TaskBody = Box<dyn Fn() -> BoxFuture<'static, Result<Option<Value>, TaskError>> + Send + Sync>;

/// A task backed by an async closure.
pub struct FnTask {
    id: TaskId,
    description: String,
    policy: FailurePolicy,
    state: RwLock<TaskState>,
    started_at: RwLock<Option<Instant>>,
    finished_at: RwLock<Option<Instant>>,
    body: TaskBody,
}

impl FnTask {
    /// Start building a task with the given identifier.
    pub fn builder(id: impl Into<TaskId>) -> FnTaskBuilder {
        FnTaskBuilder {
            id: id.into(),
            description: String::new(),
            policy: FailurePolicy::default(),
            body: None,
        }
    }
}

impl fmt::Debug for FnTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnTask")
            .field("id", &self.id)
            .field("description", &self.description)
            .field("policy", &self.policy)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Task for FnTask {
    fn id(&self) -> TaskId {
        self.id
    }

    fn state(&self) -> TaskState {
        *self.state.read().expect("task state lock poisoned")
    }

    fn set_state(&self, state: TaskState) {
        *self.state.write().expect("task state lock poisoned") = state;
    }

    fn failure_policy(&self) -> FailurePolicy {
        self.policy
    }

    fn start_time(&self) -> Option<Instant> {
        *self.started_at.read().expect("task timing lock poisoned")
    }

    fn end_time(&self) -> Option<Instant> {
        *self.finished_at.read().expect("task timing lock poisoned")
    }

    async fn run(&self, results: mpsc::Sender<Completion>) {
        *self.started_at.write().expect("task timing lock poisoned") = Some(Instant::now());

        let outcome = AssertUnwindSafe((self.body)()).catch_unwind().await;

        *self.finished_at.write().expect("task timing lock poisoned") = Some(Instant::now());

        let completion = match outcome {
            Ok(Ok(output)) => Completion::success(self.id, output),
            Ok(Err(error)) => Completion::failure(self.id, error),
            Err(payload) => Completion::failure(
                self.id,
                TaskError::Panicked {
                    id: self.id,
                    state: self.state(),
                    description: self.description.clone(),
                    detail: panic_detail(payload),
                },
            ),
        };

        if results.send(completion).await.is_err() {
            debug!(task = %self.id, "completion receiver dropped; discarding record");
        }
    }

    fn description(&self) -> Option<&str> {
        if self.description.is_empty() {
            None
        } else {
            Some(&self.description)
        }
    }
}

/// Extract a human-readable message from a panic payload.
fn panic_detail(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Builder for [`FnTask`].
pub struct FnTaskBuilder {
    id: TaskId,
    description: String,
    policy: FailurePolicy,
    body: Option<TaskBody>,
}

impl FnTaskBuilder {
    /// Set the human description.
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Set the failure policy (default: [`FailurePolicy::Abort`]).
    pub fn failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Set the async body. A task built without a body completes
    /// immediately with no output.
    pub fn body<F, Fut>(mut self, body: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Option<Value>, TaskError>> + Send + 'static,
    {
        self.body = Some(Box::new(move || body().boxed()));
        self
    }

    /// Build the task in state [`TaskState::New`].
    pub fn build(self) -> Arc<FnTask> {
        let body = self
            .body
            .unwrap_or_else(|| Box::new(|| async { Ok(None) }.boxed()));
        Arc::new(FnTask {
            id: self.id,
            description: self.description,
            policy: self.policy,
            state: RwLock::new(TaskState::New),
            started_at: RwLock::new(None),
            finished_at: RwLock::new(None),
            body,
        })
    }
}
