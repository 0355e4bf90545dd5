//! dagrun: a dependency-aware task runner.
//!
//! Given a set of tasks and a partial order between them, the runner
//! executes each task at most once (unless its failure policy retries it),
//! never before its predecessors have finished, with a whole-run deadline
//! and responsiveness to operator interrupt (Ctrl-C).
//!
//! # Example
//!
//! ```
//! use dagrun::{FnTask, Runner, Task};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # #[tokio::main(flavor = "current_thread")] async fn main() {
//! let fetch = FnTask::builder(1)
//!     .description("fetch")
//!     .body(|| async { Ok(None) })
//!     .build();
//! let report = FnTask::builder(2)
//!     .description("report")
//!     .body(|| async { Ok(None) })
//!     .build();
//!
//! let mut runner = Runner::new(Duration::from_secs(1));
//! runner.add([fetch.clone() as Arc<dyn Task>, report.clone() as Arc<dyn Task>]);
//! // `report` may only start once `fetch` has finished.
//! runner
//!     .add_dependency(&[fetch as Arc<dyn Task>, report as Arc<dyn Task>])
//!     .unwrap();
//!
//! assert!(runner.start().await.is_ok());
//! # }
//! ```
//!
//! # Failure policies
//!
//! Each task carries one of three policies consulted when it fails:
//!
//! - [`FailurePolicy::Continue`]: suppress the failure; everything
//!   depending on the task stays blocked, the rest of the run proceeds.
//! - [`FailurePolicy::Repeat`]: retry after a fixed back-off,
//!   indefinitely.
//! - [`FailurePolicy::Abort`]: drain in-flight tasks, then surface the
//!   failure cause from [`Runner::start`].
//!
//! # Termination
//!
//! [`Runner::start`] returns exactly one of: `Ok(())`,
//! [`RunnerError::Timeout`], [`RunnerError::Interrupted`],
//! [`RunnerError::Aborted`], or (for an invalid graph, before anything is
//! dispatched) [`RunnerError::Graph`].

pub mod core;
pub mod execution;
pub mod testing;

pub use crate::core::graph::{GraphError, TaskGraph};
pub use crate::core::task::{Completion, FailurePolicy, Task, TaskError, TaskState};
pub use crate::core::types::TaskId;
pub use crate::execution::{FnTask, FnTaskBuilder, InterruptHandle, Runner, RunnerError};
