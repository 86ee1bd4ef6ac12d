//! Batch submission with split-on-oversized.
//!
//! A drained batch is serialized once, announced through `on_sent`, then
//! submitted. An oversized rejection bisects the batch; sub-batches are kept
//! on an explicit worklist so the first half is always settled before the
//! second half is sent. A single oversized action fails terminally.
//! Retries from every sub-batch are requeued together once the worklist is
//! empty, so they keep their drained order.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::batch::{Batch, BatchEntry};
use crate::client::{DocumentSerializer, IndexClient, SubmitError, WireAction};
use crate::hooks::HookDispatcher;
use crate::reconcile::{match_results, ItemOutcome, Reconciler};
use crate::summary::FlushSummary;
use crate::tracked::TrackedAction;

/// Per-action status that marks the service as overloaded.
const SERVICE_BUSY: u16 = 503;

/// What one root submission produced.
#[derive(Debug, Default)]
pub(crate) struct SubmitReport {
    pub summary: FlushSummary,
    /// A transport failure or a service-busy status was seen
    pub throttled: bool,
    /// Size of the smallest half produced by splitting, if any split happened
    pub split_size: Option<usize>,
}

pub(crate) struct Submitter<D> {
    client: Arc<dyn IndexClient>,
    serializer: Arc<dyn DocumentSerializer<D>>,
    hooks: HookDispatcher<D>,
    reconciler: Reconciler<D>,
}

impl<D> Submitter<D> {
    pub fn new(
        client: Arc<dyn IndexClient>,
        serializer: Arc<dyn DocumentSerializer<D>>,
        hooks: HookDispatcher<D>,
        reconciler: Reconciler<D>,
    ) -> Self {
        Self {
            client,
            serializer,
            hooks,
            reconciler,
        }
    }

    /// Submit one drained batch and settle every action in it.
    pub async fn submit(&self, actions: Vec<TrackedAction<D>>) -> SubmitReport {
        let mut report = SubmitReport::default();
        let mut retries = Vec::new();

        let mut entries = Vec::with_capacity(actions.len());
        let mut unserializable = Vec::new();
        for action in actions {
            match self.serializer.serialize(&action.action().document) {
                Ok(document) => {
                    let wire = WireAction {
                        kind: action.action().kind,
                        key: action.key().to_string(),
                        document,
                    };
                    entries.push(BatchEntry { action, wire });
                }
                Err(e) => unserializable.push((action, ItemOutcome::Unserializable(e.to_string()))),
            }
        }
        if !unserializable.is_empty() {
            self.reconciler
                .reconcile(unserializable, &mut retries, &mut report.summary);
        }
        if entries.is_empty() {
            return report;
        }

        for entry in &entries {
            self.hooks.sent(&entry.action);
        }

        let mut pending = vec![Batch::new(entries)];
        while let Some(batch) = pending.pop() {
            let wire = batch.wire_actions();
            report.summary.requests += 1;
            debug!(offset = batch.offset(), size = batch.len(), "Submitting batch");

            match self.client.submit(&wire).await {
                Ok(results) => {
                    if results.iter().any(|r| r.status_code == SERVICE_BUSY) {
                        report.throttled = true;
                    }
                    let actions = into_actions(batch);
                    let outcomes = match_results(actions, results);
                    self.reconciler
                        .reconcile(outcomes, &mut retries, &mut report.summary);
                }
                Err(SubmitError::PayloadTooLarge) if batch.len() > 1 => {
                    let size = batch.len();
                    let offset = batch.offset();
                    let (first, second) = batch.split();
                    warn!(
                        offset = offset,
                        size = size,
                        first = first.len(),
                        second = second.len(),
                        "Payload too large; splitting batch"
                    );
                    report.summary.splits += 1;
                    report.split_size = Some(match report.split_size {
                        Some(current) => current.min(first.len()),
                        None => first.len(),
                    });
                    pending.push(second);
                    pending.push(first);
                }
                Err(SubmitError::PayloadTooLarge) => {
                    warn!(offset = batch.offset(), "Single action exceeds payload limit");
                    let outcomes = into_actions(batch)
                        .into_iter()
                        .map(|action| (action, ItemOutcome::TooLarge))
                        .collect();
                    self.reconciler
                        .reconcile(outcomes, &mut retries, &mut report.summary);
                }
                Err(SubmitError::Transport(message)) => {
                    warn!(
                        offset = batch.offset(),
                        size = batch.len(),
                        error = %message,
                        "Batch submission failed"
                    );
                    report.throttled = true;
                    let outcomes = into_actions(batch)
                        .into_iter()
                        .map(|action| (action, ItemOutcome::Transport(message.clone())))
                        .collect();
                    self.reconciler
                        .reconcile(outcomes, &mut retries, &mut report.summary);
                }
            }
        }

        self.reconciler.requeue(retries);
        report
    }
}

fn into_actions<D>(batch: Batch<D>) -> Vec<TrackedAction<D>> {
    batch.into_entries().into_iter().map(|e| e.action).collect()
}
