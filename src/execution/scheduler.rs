//! The scheduler loop.
//!
//! One tokio task owns the graph and the `waiting`/`running` sets; every
//! dispatched task is its own spawned task posting into a single result
//! channel. The loop polls for operator interrupt, dispatches the frontier,
//! consumes one completion record at a time, and applies the failing task's
//! policy. On abort it drains in-flight tasks before surfacing the cause;
//! on interrupt it returns immediately and accepts the leak.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::AbortHandle;
use tracing::{debug, info, warn};

use crate::core::graph::TaskGraph;
use crate::core::task::{Completion, FailurePolicy, Task, TaskState};
use crate::core::types::TaskId;

use super::runner::RunnerError;

/// Completion delivery synchronizes a task's writes with the scheduler's
/// reads; one slot of buffering is enough.
const RESULT_CHANNEL_CAPACITY: usize = 1;

pub(crate) struct Scheduler {
    graph: TaskGraph,
    interrupt_rx: mpsc::Receiver<()>,
    repeat_backoff: Duration,
    signal: Option<AbortHandle>,
}

impl Scheduler {
    pub(crate) fn new(
        graph: TaskGraph,
        interrupt_rx: mpsc::Receiver<()>,
        repeat_backoff: Duration,
        signal: AbortHandle,
    ) -> Self {
        Self {
            graph,
            interrupt_rx,
            repeat_backoff,
            signal: Some(signal),
        }
    }

    /// Run the graph to one of its terminal outcomes.
    pub(crate) async fn run(mut self) -> Result<(), RunnerError> {
        let (result_tx, mut result_rx) = mpsc::channel::<Completion>(RESULT_CHANNEL_CAPACITY);

        let mut waiting: Vec<Arc<dyn Task>> = self.graph.ready();
        let mut running: HashMap<TaskId, Arc<dyn Task>> = HashMap::new();

        info!(
            installed = self.graph.len(),
            sources = waiting.len(),
            "starting run"
        );

        while !waiting.is_empty() || !running.is_empty() {
            if self.interrupted() {
                info!("operator interrupt observed; stopping without awaiting in-flight tasks");
                return Err(RunnerError::Interrupted);
            }

            for task in waiting.drain(..) {
                task.set_state(TaskState::Running);
                debug!(task = %task.id(), "dispatching task");
                running.insert(task.id(), Arc::clone(&task));
                dispatch(task, result_tx.clone(), None);
            }

            let Some(completion) = result_rx.recv().await else {
                break; // unreachable: the scheduler keeps a sender alive
            };

            let Some(task) = running.remove(&completion.task_id) else {
                warn!(task = %completion.task_id, "completion for unknown task; ignoring");
                continue;
            };

            match completion.error {
                None => {
                    task.set_state(TaskState::Done);
                    debug!(task = %task.id(), "task done");
                    waiting.extend(self.graph.complete(task.id()));
                }
                Some(cause) => match task.failure_policy() {
                    FailurePolicy::Continue => {
                        task.set_state(TaskState::Failed);
                        warn!(
                            task = %task.id(),
                            error = %cause,
                            "task failed; dependents stay blocked"
                        );
                    }
                    FailurePolicy::Repeat => {
                        task.set_state(TaskState::Running);
                        warn!(
                            task = %task.id(),
                            error = %cause,
                            backoff = ?self.repeat_backoff,
                            "task failed; retrying after back-off"
                        );
                        running.insert(task.id(), Arc::clone(&task));
                        dispatch(task, result_tx.clone(), Some(self.repeat_backoff));
                    }
                    FailurePolicy::Abort => {
                        task.set_state(TaskState::Failed);
                        warn!(
                            task = %task.id(),
                            error = %cause,
                            in_flight = running.len(),
                            "task failed with abort policy; draining in-flight tasks"
                        );
                        drain(&mut running, &mut result_rx).await;
                        self.release_signal();
                        return Err(RunnerError::Aborted(cause));
                    }
                },
            }
        }

        self.release_signal();
        info!("run complete");
        Ok(())
    }

    /// Non-blocking interrupt poll. The signal listener is deregistered as
    /// soon as an interrupt is observed.
    fn interrupted(&mut self) -> bool {
        if self.interrupt_rx.try_recv().is_ok() {
            self.release_signal();
            true
        } else {
            false
        }
    }

    fn release_signal(&mut self) {
        if let Some(signal) = self.signal.take() {
            signal.abort();
        }
    }
}

/// Spawn one attempt of `task` as an independent tokio task. Never blocks
/// the scheduler; the optional delay implements the repeat back-off.
fn dispatch(task: Arc<dyn Task>, results: mpsc::Sender<Completion>, delay: Option<Duration>) {
    tokio::spawn(async move {
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        task.run(results).await;
    });
}

/// Consume one completion record per in-flight task, recording final states
/// without dispatching further work. A pending retry counts as in-flight:
/// its delayed attempt posts to the same channel and is absorbed here.
async fn drain(
    running: &mut HashMap<TaskId, Arc<dyn Task>>,
    results: &mut mpsc::Receiver<Completion>,
) {
    while !running.is_empty() {
        let Some(completion) = results.recv().await else {
            break;
        };
        let Some(task) = running.remove(&completion.task_id) else {
            continue;
        };
        let state = if completion.is_failure() {
            TaskState::Failed
        } else {
            TaskState::Done
        };
        task.set_state(state);
        debug!(task = %task.id(), state = ?state, "drained in-flight task");
    }
}
