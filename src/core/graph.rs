//! Dependency graph over installed tasks.
//!
//! The graph keeps both adjacency directions: `successors[u]` lists the
//! tasks that depend on `u`, `predecessors[u]` lists the tasks `u` depends
//! on. A task is *ready* exactly when its predecessor list is empty. The
//! scheduler removes edges as tasks complete, which is how successors become
//! ready; the graph itself never runs anything.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use thiserror::Error;

use super::task::Task;
use super::types::TaskId;

/// Errors that can occur when working with the task graph.
#[derive(Debug, Error)]
pub enum GraphError {
    /// An edge endpoint was never installed with `insert`.
    #[error("task not installed: {0}")]
    NotInstalled(TaskId),

    /// The installed edges form a cycle.
    #[error("cycle detected involving task: {0}")]
    CycleDetected(TaskId),
}

/// Tasks plus both-direction adjacency, keyed by identifier.
///
/// Invariant: for every edge `u → v`, `v ∈ successors[u]` iff
/// `u ∈ predecessors[v]`. Parallel edges are kept with multiplicity and
/// removed one occurrence at a time.
#[derive(Default)]
pub struct TaskGraph {
    tasks: HashMap<TaskId, Arc<dyn Task>>,
    successors: HashMap<TaskId, Vec<TaskId>>,
    predecessors: HashMap<TaskId, Vec<TaskId>>,
}

impl TaskGraph {
    /// Create an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of installed tasks.
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Whether the graph has no tasks.
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Install a task under its identifier.
    ///
    /// Re-inserting an identifier is idempotent: the latest reference wins
    /// and existing edges are preserved.
    pub fn insert(&mut self, task: Arc<dyn Task>) {
        let id = task.id();
        self.tasks.insert(id, task);
        self.successors.entry(id).or_default();
        self.predecessors.entry(id).or_default();
    }

    /// Whether a task with this identifier is installed.
    pub fn contains(&self, id: TaskId) -> bool {
        self.tasks.contains_key(&id)
    }

    /// Look up an installed task.
    pub fn get(&self, id: TaskId) -> Option<&Arc<dyn Task>> {
        self.tasks.get(&id)
    }

    /// Iterate over all installed tasks. Order is unspecified.
    pub fn tasks(&self) -> impl Iterator<Item = &Arc<dyn Task>> {
        self.tasks.values()
    }

    /// Add a dependency chain: each task must finish before the next may
    /// start.
    ///
    /// Every identifier is validated before any edge is added, so a failed
    /// call leaves the graph untouched. A chain shorter than two tasks adds
    /// nothing.
    pub fn link(&mut self, chain: &[TaskId]) -> Result<(), GraphError> {
        self.check_installed(chain)?;
        for pair in chain.windows(2) {
            let (from, to) = (pair[0], pair[1]);
            self.successors.entry(from).or_default().push(to);
            self.predecessors.entry(to).or_default().push(from);
        }
        Ok(())
    }

    /// Remove a dependency chain, one edge occurrence per consecutive pair.
    ///
    /// Identifiers must be installed; removing an edge that does not exist
    /// is a no-op.
    pub fn unlink(&mut self, chain: &[TaskId]) -> Result<(), GraphError> {
        self.check_installed(chain)?;
        for pair in chain.windows(2) {
            self.remove_edge(pair[0], pair[1]);
        }
        Ok(())
    }

    fn check_installed(&self, ids: &[TaskId]) -> Result<(), GraphError> {
        for &id in ids {
            if !self.tasks.contains_key(&id) {
                return Err(GraphError::NotInstalled(id));
            }
        }
        Ok(())
    }

    fn remove_edge(&mut self, from: TaskId, to: TaskId) {
        if let Some(successors) = self.successors.get_mut(&from) {
            if let Some(pos) = successors.iter().position(|&id| id == to) {
                successors.remove(pos);
            }
        }
        if let Some(predecessors) = self.predecessors.get_mut(&to) {
            if let Some(pos) = predecessors.iter().position(|&id| id == from) {
                predecessors.remove(pos);
            }
        }
    }

    /// Tasks that are ready right now (empty predecessor list).
    ///
    /// Used once by the scheduler to discover the initial frontier; after
    /// that, readiness flows from [`complete`](Self::complete).
    pub fn ready(&self) -> Vec<Arc<dyn Task>> {
        self.tasks
            .iter()
            .filter(|(id, _)| self.predecessors.get(id).map_or(true, Vec::is_empty))
            .map(|(_, task)| Arc::clone(task))
            .collect()
    }

    /// Record that `id` completed successfully: remove each outgoing edge
    /// and return the successors that became ready as a result.
    pub fn complete(&mut self, id: TaskId) -> Vec<Arc<dyn Task>> {
        let successors = self
            .successors
            .get_mut(&id)
            .map(std::mem::take)
            .unwrap_or_default();

        let mut newly_ready: Vec<Arc<dyn Task>> = Vec::new();
        for successor in successors {
            let Some(predecessors) = self.predecessors.get_mut(&successor) else {
                continue;
            };
            if let Some(pos) = predecessors.iter().position(|&p| p == id) {
                predecessors.remove(pos);
            }
            let became_ready = predecessors.is_empty()
                && !newly_ready.iter().any(|t| t.id() == successor);
            if became_ready {
                if let Some(task) = self.tasks.get(&successor) {
                    newly_ready.push(Arc::clone(task));
                }
            }
        }
        newly_ready
    }

    /// Verify the graph is acyclic (Kahn's algorithm).
    ///
    /// Returns `CycleDetected` naming one task on a cycle.
    pub fn validate(&self) -> Result<(), GraphError> {
        let mut in_degree: HashMap<TaskId, usize> = self
            .tasks
            .keys()
            .map(|&id| (id, self.predecessors.get(&id).map_or(0, Vec::len)))
            .collect();

        let mut queue: VecDeque<TaskId> = in_degree
            .iter()
            .filter(|(_, &degree)| degree == 0)
            .map(|(&id, _)| id)
            .collect();

        let mut visited = 0usize;
        while let Some(id) = queue.pop_front() {
            visited += 1;
            if let Some(successors) = self.successors.get(&id) {
                for &next in successors {
                    if let Some(degree) = in_degree.get_mut(&next) {
                        *degree -= 1;
                        if *degree == 0 {
                            queue.push_back(next);
                        }
                    }
                }
            }
        }

        if visited != self.tasks.len() {
            if let Some((&id, _)) = in_degree.iter().find(|(_, &degree)| degree > 0) {
                return Err(GraphError::CycleDetected(id));
            }
        }
        Ok(())
    }
}
