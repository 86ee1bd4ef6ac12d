//! Action queue shared between enqueuing callers and the flush loop.
//!
//! New actions are appended at the tail; retried actions are put back at
//! the head so already-delayed work goes out before newer work.

use std::collections::{HashSet, VecDeque};
use std::sync::{Mutex, PoisonError};

use crate::tracked::TrackedAction;

/// Actions handed back by [`ActionQueue::enqueue`] after the queue closed.
#[derive(Debug)]
pub struct QueueClosed<D>(pub Vec<TrackedAction<D>>);

struct QueueState<D> {
    actions: VecDeque<TrackedAction<D>>,
    closed: bool,
}

/// Ordered, lock-protected queue of pending actions.
///
/// Every mutation happens under a single mutex, so an action is never
/// visible in the queue and in a drained batch at the same time.
pub struct ActionQueue<D> {
    state: Mutex<QueueState<D>>,
}

impl<D> ActionQueue<D> {
    /// Create an empty, open queue.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(QueueState {
                actions: VecDeque::new(),
                closed: false,
            }),
        }
    }

    /// Append actions at the tail.
    ///
    /// Returns the queue length after the append. A closed queue hands the
    /// actions back untouched.
    pub fn enqueue(&self, actions: Vec<TrackedAction<D>>) -> Result<usize, QueueClosed<D>> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if state.closed {
            return Err(QueueClosed(actions));
        }
        state.actions.extend(actions);
        Ok(state.actions.len())
    }

    /// Remove up to `max` actions from the head.
    ///
    /// Never blocks and returns an empty vec when the queue is empty. Keys
    /// are unique within the returned batch: a later action whose key is
    /// already taken stays queued, in its original position, for a
    /// following batch.
    pub fn drain(&self, max: usize) -> Vec<TrackedAction<D>> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let mut taken = Vec::with_capacity(max.min(state.actions.len()));
        let mut seen = HashSet::new();
        let mut deferred = Vec::new();

        while taken.len() < max {
            let Some(action) = state.actions.pop_front() else {
                break;
            };
            if seen.insert(action.key().to_string()) {
                taken.push(action);
            } else {
                deferred.push(action);
            }
        }

        for action in deferred.into_iter().rev() {
            state.actions.push_front(action);
        }
        taken
    }

    /// Put retried actions back at the head, keeping their relative order.
    ///
    /// Allowed after `close()` so the final flush can still retry.
    pub fn requeue_front(&self, actions: Vec<TrackedAction<D>>) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        for action in actions.into_iter().rev() {
            state.actions.push_front(action);
        }
    }

    /// Stop accepting new actions. Returns false if the queue was already closed.
    pub fn close(&self) -> bool {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        !std::mem::replace(&mut state.closed, true)
    }

    /// Whether `close()` has been called.
    pub fn is_closed(&self) -> bool {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .closed
    }

    /// Number of queued actions.
    pub fn len(&self) -> usize {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .actions
            .len()
    }

    /// Whether the queue holds no actions.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<D: Clone> ActionQueue<D> {
    /// Copy of the queued actions in drain order.
    pub fn snapshot(&self) -> Vec<TrackedAction<D>> {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .actions
            .iter()
            .cloned()
            .collect()
    }
}

impl<D> Default for ActionQueue<D> {
    fn default() -> Self {
        Self::new()
    }
}
