//! Flush outcome accounting.

use crate::error::ActionFailure;

/// Outcome of one or more flush rounds.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FlushSummary {
    /// HTTP requests issued, including sub-batch requests after a split
    pub requests: usize,
    /// Number of times a batch was bisected after an oversized rejection
    pub splits: usize,
    /// Actions that reached terminal success
    pub succeeded: usize,
    /// Actions put back at the queue front for another attempt
    pub retried: usize,
    /// Actions that reached terminal failure
    pub failed: Vec<ActionFailure>,
}

impl FlushSummary {
    /// Create a new empty summary.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a terminal success.
    pub fn record_success(&mut self) {
        self.succeeded += 1;
    }

    /// Record a requeued action.
    pub fn record_retry(&mut self) {
        self.retried += 1;
    }

    /// Record a terminal failure.
    pub fn record_failure(&mut self, failure: ActionFailure) {
        self.failed.push(failure);
    }

    /// Merge another summary into this one.
    pub fn merge(&mut self, other: FlushSummary) {
        self.requests += other.requests;
        self.splits += other.splits;
        self.succeeded += other.succeeded;
        self.retried += other.retried;
        self.failed.extend(other.failed);
    }

    /// True if any action failed terminally.
    pub fn has_failures(&self) -> bool {
        !self.failed.is_empty()
    }

    /// Actions that reached a terminal state.
    pub fn completed(&self) -> usize {
        self.succeeded + self.failed.len()
    }
}
