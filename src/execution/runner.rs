//! The runner: graph assembly plus the termination multiplexer.
//!
//! A [`Runner`] collects tasks and dependencies, then [`start`](Runner::start)
//! validates the graph, spawns the scheduler loop in the background, and
//! awaits the first of: scheduler completion, the whole-run deadline, or an
//! operator interrupt (observed by the scheduler itself).

use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::core::graph::{GraphError, TaskGraph};
use crate::core::task::{Task, TaskError};
use crate::core::types::TaskId;

use super::scheduler::Scheduler;

/// One slot is essential: a synchronous signal delivery with no receiver
/// parked would otherwise be dropped.
const INTERRUPT_CHANNEL_CAPACITY: usize = 1;

/// Default delay before a Repeat task is re-dispatched. Must stay non-zero
/// to avoid a tight failure loop.
pub(crate) const DEFAULT_REPEAT_BACKOFF: Duration = Duration::from_millis(100);

/// Terminal outcomes of [`Runner::start`].
#[derive(Debug, Error)]
pub enum RunnerError {
    /// The whole-run deadline elapsed. The scheduler and any in-flight
    /// tasks keep running in the background, so task states may still
    /// change after this is returned.
    #[error("run deadline elapsed")]
    Timeout,

    /// An operator interrupt was observed at a loop checkpoint. In-flight
    /// tasks are not awaited; their states are whatever they were when the
    /// scheduler exited.
    #[error("operator interrupt received")]
    Interrupted,

    /// A task with [`FailurePolicy::Abort`](crate::FailurePolicy::Abort)
    /// failed. In-flight tasks were drained before this was returned; the
    /// cause is propagated verbatim.
    #[error(transparent)]
    Aborted(TaskError),

    /// The installed graph is invalid (detected before any dispatch).
    #[error(transparent)]
    Graph(#[from] GraphError),

    /// The scheduler terminated without reporting an outcome. Not reachable
    /// in practice: task panics are caught inside `run`, so the scheduler
    /// always posts its result.
    #[error("scheduler completion channel closed")]
    ChannelClosed,
}

/// Cloneable handle that injects an operator interrupt, exactly as if
/// Ctrl-C had been pressed.
///
/// The interrupt channel holds one slot; triggers arriving while one is
/// already pending are dropped.
#[derive(Debug, Clone)]
pub struct InterruptHandle {
    tx: mpsc::Sender<()>,
}

impl InterruptHandle {
    /// Post an interrupt. Never blocks.
    pub fn trigger(&self) {
        let _ = self.tx.try_send(());
    }
}

/// Dependency-aware task runner.
///
/// # Lifecycle
///
/// Install tasks with [`add`](Self::add), wire dependencies with
/// [`add_dependency`](Self::add_dependency), then call
/// [`start`](Self::start). The runner is consumed; the caller keeps its
/// `Arc<dyn Task>` handles and reads states and timings from them after
/// `start` returns.
pub struct Runner {
    graph: TaskGraph,
    deadline: Duration,
    repeat_backoff: Duration,
    interrupt_tx: mpsc::Sender<()>,
    interrupt_rx: mpsc::Receiver<()>,
}

impl Runner {
    /// Create a runner with the given whole-run deadline.
    pub fn new(deadline: Duration) -> Self {
        let (interrupt_tx, interrupt_rx) = mpsc::channel(INTERRUPT_CHANNEL_CAPACITY);
        Self {
            graph: TaskGraph::new(),
            deadline,
            repeat_backoff: DEFAULT_REPEAT_BACKOFF,
            interrupt_tx,
            interrupt_rx,
        }
    }

    /// Set the delay before a Repeat task is re-dispatched
    /// (default: 100 ms). Must be non-zero.
    pub fn with_repeat_backoff(mut self, backoff: Duration) -> Self {
        debug_assert!(!backoff.is_zero(), "a zero back-off spins on failure");
        self.repeat_backoff = backoff;
        self
    }

    /// Install tasks. Re-adding an identifier replaces the reference and
    /// keeps its edges.
    pub fn add<I>(&mut self, tasks: I)
    where
        I: IntoIterator<Item = Arc<dyn Task>>,
    {
        for task in tasks {
            debug!(task = %task.id(), "installing task");
            self.graph.insert(task);
        }
    }

    /// Declare a dependency chain: each task must finish before the next
    /// may start. All tasks must already be installed.
    pub fn add_dependency(&mut self, chain: &[Arc<dyn Task>]) -> Result<(), GraphError> {
        self.graph.link(&Self::ids(chain))
    }

    /// Remove a previously declared dependency chain, one edge occurrence
    /// per consecutive pair. Removing an absent edge is a no-op, but all
    /// tasks must be installed.
    pub fn remove_dependency(&mut self, chain: &[Arc<dyn Task>]) -> Result<(), GraphError> {
        self.graph.unlink(&Self::ids(chain))
    }

    /// Handle for simulating an operator interrupt (used by tests and
    /// embedders that manage signals themselves).
    pub fn interrupt_handle(&self) -> InterruptHandle {
        InterruptHandle {
            tx: self.interrupt_tx.clone(),
        }
    }

    /// Run the graph. Returns when the scheduler finishes, the deadline
    /// elapses, or the scheduler observes an interrupt.
    ///
    /// On [`RunnerError::Timeout`] the scheduler is *not* cancelled:
    /// in-flight tasks run their bodies to completion in the background.
    /// Callers needing hard teardown must arrange cancellation inside the
    /// task body.
    pub async fn start(self) -> Result<(), RunnerError> {
        self.graph.validate()?;

        let signal = spawn_signal_forwarder(self.interrupt_tx.clone());
        let scheduler = Scheduler::new(
            self.graph,
            self.interrupt_rx,
            self.repeat_backoff,
            signal.abort_handle(),
        );

        let (complete_tx, complete_rx) = oneshot::channel();
        tokio::spawn(async move {
            let _ = complete_tx.send(scheduler.run().await);
        });

        tokio::select! {
            outcome = complete_rx => match outcome {
                Ok(result) => result,
                Err(_) => Err(RunnerError::ChannelClosed),
            },
            _ = tokio::time::sleep(self.deadline) => {
                info!(
                    deadline = ?self.deadline,
                    "run deadline elapsed; returning without awaiting in-flight tasks"
                );
                Err(RunnerError::Timeout)
            }
        }
    }

    fn ids(chain: &[Arc<dyn Task>]) -> Vec<TaskId> {
        chain.iter().map(|task| task.id()).collect()
    }
}

/// Forward the process Ctrl-C signal into the one-slot interrupt channel.
/// The scheduler aborts this listener once it observes the interrupt or
/// finishes the run.
fn spawn_signal_forwarder(interrupt: mpsc::Sender<()>) -> JoinHandle<()> {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = interrupt.try_send(());
        }
    })
}
