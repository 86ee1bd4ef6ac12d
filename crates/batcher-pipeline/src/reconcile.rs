//! Result reconciliation.
//!
//! Maps each action of a settled batch to exactly one disposition:
//! terminal success, terminal failure, or requeue for another attempt.

use std::collections::HashMap;
use std::sync::Arc;

use batcher_types::ActionResult;
use tracing::{debug, warn};

use crate::error::{ActionFailure, FailureReason};
use crate::hooks::HookDispatcher;
use crate::queue::ActionQueue;
use crate::summary::FlushSummary;
use crate::tracked::TrackedAction;

/// How a per-action status code is treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusClass {
    /// The action was applied
    Success,
    /// Transient: conflict, unprocessable under contention, or service busy
    Retryable,
    /// Anything else
    Rejected,
}

/// Classify a per-action status code.
pub fn classify_status(status_code: u16) -> StatusClass {
    match status_code {
        200 | 201 => StatusClass::Success,
        409 | 422 | 503 => StatusClass::Retryable,
        _ => StatusClass::Rejected,
    }
}

/// What happened to one action in a settled batch.
#[derive(Debug)]
pub(crate) enum ItemOutcome {
    /// The service returned a result for the action's key
    Result(ActionResult),
    /// The request failed as a whole with no per-action data
    Transport(String),
    /// The action alone was rejected as too large
    TooLarge,
    /// The response had no entry for the action's key
    Unmatched,
    /// The document could not be serialized for this attempt
    Unserializable(String),
}

/// Pair each action with the result carrying its key.
///
/// Results are matched by key, never by position. When the response repeats
/// a key, the first entry wins.
pub(crate) fn match_results<D>(
    actions: Vec<TrackedAction<D>>,
    results: Vec<ActionResult>,
) -> Vec<(TrackedAction<D>, ItemOutcome)> {
    let mut by_key: HashMap<String, ActionResult> = HashMap::with_capacity(results.len());
    for result in results {
        by_key.entry(result.key.clone()).or_insert(result);
    }

    let matched = actions
        .into_iter()
        .map(|action| {
            let outcome = match by_key.remove(action.key()) {
                Some(result) => ItemOutcome::Result(result),
                None => ItemOutcome::Unmatched,
            };
            (action, outcome)
        })
        .collect();

    if !by_key.is_empty() {
        debug!(
            extra = by_key.len(),
            "Ignoring results for keys not in the batch"
        );
    }
    matched
}

/// Applies dispositions and fires terminal hooks.
pub(crate) struct Reconciler<D> {
    queue: Arc<ActionQueue<D>>,
    hooks: HookDispatcher<D>,
    max_retries_per_action: u32,
}

impl<D> Reconciler<D> {
    pub fn new(
        queue: Arc<ActionQueue<D>>,
        hooks: HookDispatcher<D>,
        max_retries_per_action: u32,
    ) -> Self {
        Self {
            queue,
            hooks,
            max_retries_per_action,
        }
    }

    /// Settle every action of one batch.
    ///
    /// Retryable actions are appended to `retries` in batch order with their
    /// try count already bumped; the caller hands them to [`Self::requeue`]
    /// once the whole drained batch is settled.
    pub fn reconcile(
        &self,
        outcomes: Vec<(TrackedAction<D>, ItemOutcome)>,
        retries: &mut Vec<TrackedAction<D>>,
        summary: &mut FlushSummary,
    ) {
        for (action, outcome) in outcomes {
            match outcome {
                ItemOutcome::Result(result) => match classify_status(result.status_code) {
                    StatusClass::Success => {
                        summary.record_success();
                        self.hooks.succeeded(&action);
                    }
                    StatusClass::Retryable => {
                        let last_error = describe_result(&result);
                        self.retry_or_fail(action, last_error, retries, summary);
                    }
                    StatusClass::Rejected => {
                        let reason = FailureReason::Rejected {
                            status_code: result.status_code,
                            message: result.error_message,
                        };
                        self.fail(action, reason, summary);
                    }
                },
                ItemOutcome::Transport(message) => {
                    self.retry_or_fail(action, message, retries, summary);
                }
                ItemOutcome::TooLarge => self.fail(action, FailureReason::DocumentTooLarge, summary),
                ItemOutcome::Unmatched => self.fail(action, FailureReason::Unmatched, summary),
                ItemOutcome::Unserializable(message) => {
                    self.fail(action, FailureReason::Serialization(message), summary)
                }
            }
        }
    }

    /// Put retries back at the queue front together, in order, so they are
    /// drained ahead of anything enqueued meanwhile.
    pub fn requeue(&self, retries: Vec<TrackedAction<D>>) {
        if retries.is_empty() {
            return;
        }
        debug!(count = retries.len(), "Requeueing actions at queue front");
        self.queue.requeue_front(retries);
    }

    fn retry_or_fail(
        &self,
        mut action: TrackedAction<D>,
        last_error: String,
        retries: &mut Vec<TrackedAction<D>>,
        summary: &mut FlushSummary,
    ) {
        if action.try_count() < self.max_retries_per_action {
            debug!(
                key = %action.key(),
                try_count = action.try_count(),
                error = %last_error,
                "Retryable failure"
            );
            action.increment_try_count();
            summary.record_retry();
            retries.push(action);
        } else {
            let reason = FailureReason::RetriesExhausted {
                attempts: action.try_count(),
                last_error,
            };
            self.fail(action, reason, summary);
        }
    }

    fn fail(&self, action: TrackedAction<D>, reason: FailureReason, summary: &mut FlushSummary) {
        warn!(
            key = %action.key(),
            try_count = action.try_count(),
            reason = %reason,
            "Action failed"
        );
        self.hooks.error(&action, &reason);
        summary.record_failure(ActionFailure {
            key: action.key().to_string(),
            try_count: action.try_count(),
            reason,
        });
    }
}

fn describe_result(result: &ActionResult) -> String {
    match &result.error_message {
        Some(message) => format!("status {}: {}", result.status_code, message),
        None => format!("status {}", result.status_code),
    }
}
