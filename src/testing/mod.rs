//! Testing utilities for users of the dagrun library.
//!
//! This module provides helpers for exercising runner behavior:
//!
//! - [`TaskFactory`]: allocates sequential identifiers and builds common
//!   task shapes (sleeping, panicking, flaky)
//! - [`assert_ran_after`]: verifies the causal ordering the engine
//!   guarantees along a dependency edge
//! - [`assert_states`]: verifies a batch of tasks share an expected state
//!
//! # Example
//!
//! ```
//! use dagrun::testing::{assert_states, TaskFactory};
//! use dagrun::{FailurePolicy, Runner, TaskState};
//! use std::time::Duration;
//!
//! # #[tokio::main(flavor = "current_thread")] async fn main() {
//! let factory = TaskFactory::new();
//! let task = factory.sleep_task(Duration::from_millis(1), FailurePolicy::Abort);
//!
//! let mut runner = Runner::new(Duration::from_secs(1));
//! runner.add([task.clone()]);
//! runner.start().await.unwrap();
//!
//! assert_states(TaskState::Done, &[task]);
//! # }
//! ```

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::core::task::{FailurePolicy, Task, TaskError, TaskState};
use crate::core::types::TaskId;
use crate::execution::FnTask;

/// Builds tasks with sequential identifiers, starting from 1.
pub struct TaskFactory {
    next_id: AtomicU64,
}

impl TaskFactory {
    /// Create a factory whose first task gets identifier 1.
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
        }
    }

    /// Allocate the next identifier.
    pub fn next_id(&self) -> TaskId {
        TaskId::new(self.next_id.fetch_add(1, Ordering::SeqCst))
    }

    /// A task that completes immediately.
    pub fn noop_task(&self, policy: FailurePolicy) -> Arc<dyn Task> {
        FnTask::builder(self.next_id())
            .description("noop")
            .failure_policy(policy)
            .build()
    }

    /// A task that sleeps for `duration`, then succeeds.
    pub fn sleep_task(&self, duration: Duration, policy: FailurePolicy) -> Arc<dyn Task> {
        FnTask::builder(self.next_id())
            .description("sleep")
            .failure_policy(policy)
            .body(move || async move {
                tokio::time::sleep(duration).await;
                Ok(None)
            })
            .build()
    }

    /// A task that sleeps for `duration`, then panics.
    pub fn panic_task(&self, duration: Duration, policy: FailurePolicy) -> Arc<dyn Task> {
        FnTask::builder(self.next_id())
            .description("panic")
            .failure_policy(policy)
            .body(move || async move {
                tokio::time::sleep(duration).await;
                panic!("injected panic")
            })
            .build()
    }

    /// A task that fails `failures` times, then succeeds.
    pub fn flaky_task(&self, failures: u32, policy: FailurePolicy) -> Arc<dyn Task> {
        let remaining = Arc::new(AtomicU32::new(failures));
        FnTask::builder(self.next_id())
            .description("flaky")
            .failure_policy(policy)
            .body(move || {
                let remaining = Arc::clone(&remaining);
                async move {
                    if remaining.load(Ordering::SeqCst) > 0 {
                        remaining.fetch_sub(1, Ordering::SeqCst);
                        Err(TaskError::ExecutionFailed("flaky failure".to_string()))
                    } else {
                        Ok(None)
                    }
                }
            })
            .build()
    }

    /// A task that sleeps for `duration`, then fails on every attempt.
    pub fn failing_task(&self, duration: Duration, policy: FailurePolicy) -> Arc<dyn Task> {
        FnTask::builder(self.next_id())
            .description("failing")
            .failure_policy(policy)
            .body(move || async move {
                tokio::time::sleep(duration).await;
                Err(TaskError::ExecutionFailed("always fails".to_string()))
            })
            .build()
    }
}

impl Default for TaskFactory {
    fn default() -> Self {
        Self::new()
    }
}

/// Assert that `later` started no earlier than `earlier` finished, i.e.
/// the ordering guaranteed along a dependency edge.
///
/// # Panics
///
/// Panics if either timestamp is missing or the ordering is violated.
pub fn assert_ran_after(later: &Arc<dyn Task>, earlier: &Arc<dyn Task>) {
    let earlier_end = earlier
        .end_time()
        .unwrap_or_else(|| panic!("task {} never finished", earlier.id()));
    let later_start = later
        .start_time()
        .unwrap_or_else(|| panic!("task {} never started", later.id()));
    assert!(
        later_start >= earlier_end,
        "task {} started before task {} finished",
        later.id(),
        earlier.id()
    );
}

/// Assert every task in `tasks` is in `expected` state.
///
/// # Panics
///
/// Panics naming the first task in an unexpected state.
pub fn assert_states(expected: TaskState, tasks: &[Arc<dyn Task>]) {
    for task in tasks {
        assert_eq!(
            task.state(),
            expected,
            "task {} in unexpected state",
            task.id()
        );
    }
}
