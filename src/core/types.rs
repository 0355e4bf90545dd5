//! Core identifier types for the runner.
//!
//! Identifier allocation is the caller's concern; the engine only requires
//! that two distinct tasks installed in the same runner carry distinct
//! identifiers.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Unique identifier for a task within a single runner instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskId(u64);

impl TaskId {
    /// Create a new TaskId from a numeric value.
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Get the underlying numeric value.
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl From<u64> for TaskId {
    fn from(id: u64) -> Self {
        Self::new(id)
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
