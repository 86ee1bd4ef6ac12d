//! An enqueued action together with its retry bookkeeping.

use batcher_types::IndexAction;

/// One queued or in-flight action.
///
/// The correlation key is computed once, when the action is enqueued, and
/// cached here. Mutating the document afterwards does not change the key.
#[derive(Debug, Clone)]
pub struct TrackedAction<D> {
    action: IndexAction<D>,
    key: String,
    try_count: u32,
}

impl<D> TrackedAction<D> {
    /// Wrap a freshly enqueued action. The first attempt is attempt 1.
    pub fn new(action: IndexAction<D>, key: String) -> Self {
        Self {
            action,
            key,
            try_count: 1,
        }
    }

    /// The wrapped action.
    pub fn action(&self) -> &IndexAction<D> {
        &self.action
    }

    /// Correlation key used to match service results.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Number of submission attempts so far (starts at 1).
    pub fn try_count(&self) -> u32 {
        self.try_count
    }

    /// Record that another attempt will be made.
    pub(crate) fn increment_try_count(&mut self) {
        self.try_count += 1;
    }

    /// Unwrap into the original action.
    pub fn into_action(self) -> IndexAction<D> {
        self.action
    }
}
