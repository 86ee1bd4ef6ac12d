//! The buffered sender: public entry point of the pipeline.
//!
//! Callers enqueue actions from any task. Flushes start on four triggers:
//! the batch size threshold, the idle timer, an explicit `flush()` and the
//! final `close()`. All four go through the same single-flight flush loop.
//! The automatic triggers skip when a flush is already running; `flush()`
//! and `close()` wait for it.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use batcher_types::{IndexAction, SenderConfig};
use serde::Serialize;
use serde_json::Value;
use tokio::runtime::Handle;
use tracing::{debug, info, warn};

use crate::client::{field_key_extractor, DocumentSerializer, IndexClient, JsonSerializer, KeyExtractor};
use crate::error::{FailureReason, PipelineError};
use crate::gate::{FlushGate, FlushPermit};
use crate::hooks::{ActionHooks, HookDispatcher, NoopHooks};
use crate::queue::{ActionQueue, QueueClosed};
use crate::reconcile::Reconciler;
use crate::submit::Submitter;
use crate::summary::FlushSummary;
use crate::throttle::Throttle;
use crate::timer::IdleTimer;
use crate::tracked::TrackedAction;

/// What started a flush.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FlushTrigger {
    Threshold,
    Idle,
    Manual,
    Close,
}

impl FlushTrigger {
    fn waits_for_gate(self) -> bool {
        matches!(self, FlushTrigger::Manual | FlushTrigger::Close)
    }

    /// Threshold flushes only send full batches; everything else drains.
    fn drains_all(self) -> bool {
        !matches!(self, FlushTrigger::Threshold)
    }
}

/// Builder for [`BufferedSender`].
pub struct BufferedSenderBuilder<D> {
    client: Arc<dyn IndexClient>,
    config: SenderConfig,
    serializer: Arc<dyn DocumentSerializer<D>>,
    key_extractor: Option<KeyExtractor<D>>,
    hooks: Arc<dyn ActionHooks<D>>,
}

impl<D: Serialize> BufferedSenderBuilder<D> {
    /// Builder serializing documents with [`JsonSerializer`].
    pub fn new(client: Arc<dyn IndexClient>) -> Self {
        Self::with_serializer(client, Arc::new(JsonSerializer))
    }
}

impl BufferedSenderBuilder<Value> {
    /// Use a top-level field of each JSON document as its key.
    pub fn key_field(mut self, field: impl Into<String>) -> Self {
        self.key_extractor = Some(field_key_extractor(field));
        self
    }
}

impl<D> BufferedSenderBuilder<D> {
    /// Builder for documents that need a custom serializer.
    pub fn with_serializer(
        client: Arc<dyn IndexClient>,
        serializer: Arc<dyn DocumentSerializer<D>>,
    ) -> Self {
        Self {
            client,
            config: SenderConfig::default(),
            serializer,
            key_extractor: None,
            hooks: Arc::new(NoopHooks),
        }
    }

    pub fn config(mut self, config: SenderConfig) -> Self {
        self.config = config;
        self
    }

    /// Function deriving each document's correlation key. Required.
    pub fn key_extractor<F>(mut self, extract: F) -> Self
    where
        F: Fn(&D) -> String + Send + Sync + 'static,
    {
        self.key_extractor = Some(Arc::new(extract));
        self
    }

    pub fn hooks(mut self, hooks: Arc<dyn ActionHooks<D>>) -> Self {
        self.hooks = hooks;
        self
    }
}

impl<D: Send + Sync + 'static> BufferedSenderBuilder<D> {
    /// Validate the configuration and capture the current Tokio runtime.
    pub fn build(self) -> Result<BufferedSender<D>, PipelineError> {
        self.config.validate()?;
        let key_extractor = self
            .key_extractor
            .ok_or_else(|| PipelineError::Config("a key extractor is required".to_string()))?;
        let runtime = Handle::try_current().map_err(|_| PipelineError::NoRuntime)?;

        let queue = Arc::new(ActionQueue::new());
        let hooks = HookDispatcher::new(self.hooks);
        let reconciler = Reconciler::new(
            queue.clone(),
            hooks.clone(),
            self.config.max_retries_per_action,
        );
        let submitter = Submitter::new(self.client, self.serializer, hooks.clone(), reconciler);
        let throttle = Throttle::new(
            self.config.throttling_delay(),
            self.config.max_throttling_delay(),
        );
        let timer = IdleTimer::new(self.config.auto_flush_interval());

        info!(
            batch_size = self.config.batch_size,
            auto_flush = self.config.auto_flush,
            idle_timer = timer.is_enabled(),
            max_retries = self.config.max_retries_per_action,
            "Buffered sender ready"
        );

        Ok(BufferedSender {
            inner: Arc::new(SenderInner {
                batch_size: AtomicUsize::new(self.config.batch_size),
                config: self.config,
                queue,
                submitter,
                hooks,
                key_extractor,
                gate: FlushGate::new(),
                timer,
                throttle: Mutex::new(throttle),
                drain_requested: AtomicBool::new(false),
                runtime,
            }),
        })
    }
}

/// Buffers index actions and submits them in batches.
///
/// Cloning yields another handle to the same queue.
pub struct BufferedSender<D> {
    inner: Arc<SenderInner<D>>,
}

impl<D> Clone for BufferedSender<D> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<D: Serialize> BufferedSender<D> {
    /// Start building a sender that serializes documents as JSON.
    pub fn builder(client: Arc<dyn IndexClient>) -> BufferedSenderBuilder<D> {
        BufferedSenderBuilder::new(client)
    }
}

impl<D: Send + Sync + 'static> BufferedSender<D> {
    /// Enqueue actions in order.
    ///
    /// Never waits on network I/O. With auto-flush enabled this re-arms the
    /// idle timer and starts a background flush once the queue reaches the
    /// batch size.
    ///
    /// `on_added` fires for each action before it is queued, outside the
    /// queue lock. Calls from one producer keep their order; across
    /// concurrent producers the hook order may differ from queue order. If
    /// the sender closes before the actions are queued they receive
    /// `on_error` with [`FailureReason::SenderClosed`] and this returns
    /// [`PipelineError::Closed`].
    pub fn add_actions(
        &self,
        actions: impl IntoIterator<Item = IndexAction<D>>,
    ) -> Result<(), PipelineError> {
        self.inner.add_actions(actions)
    }

    pub fn upload_documents(&self, documents: impl IntoIterator<Item = D>) -> Result<(), PipelineError> {
        self.add_actions(documents.into_iter().map(IndexAction::upload))
    }

    pub fn merge_documents(&self, documents: impl IntoIterator<Item = D>) -> Result<(), PipelineError> {
        self.add_actions(documents.into_iter().map(IndexAction::merge))
    }

    pub fn merge_or_upload_documents(
        &self,
        documents: impl IntoIterator<Item = D>,
    ) -> Result<(), PipelineError> {
        self.add_actions(documents.into_iter().map(IndexAction::merge_or_upload))
    }

    pub fn delete_documents(&self, documents: impl IntoIterator<Item = D>) -> Result<(), PipelineError> {
        self.add_actions(documents.into_iter().map(IndexAction::delete))
    }

    /// Submit everything queued, waiting for any flush already running.
    ///
    /// Returns once the network calls completed, including retries made
    /// within this flush. Failed actions are reported through hooks and the
    /// summary; in strict mode they turn into [`PipelineError::FlushFailed`].
    pub async fn flush(&self) -> Result<FlushSummary, PipelineError> {
        if self.inner.queue.is_closed() {
            return Err(PipelineError::Closed);
        }
        let summary = self.inner.run_flush(FlushTrigger::Manual).await;
        self.inner.finish(summary)
    }

    /// Stop accepting actions, cancel the idle timer and flush what is left.
    ///
    /// Calling `close` again returns an empty summary.
    pub async fn close(&self) -> Result<FlushSummary, PipelineError> {
        if !self.inner.queue.close() {
            debug!("Sender already closed");
            return Ok(FlushSummary::default());
        }
        self.inner.timer.shutdown();
        info!(pending = self.inner.queue.len(), "Closing sender");

        let summary = self.inner.run_flush(FlushTrigger::Close).await;
        self.inner.finish(summary)
    }

    /// Number of queued actions, excluding any batch currently in flight.
    pub fn pending_count(&self) -> usize {
        self.inner.queue.len()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.queue.is_closed()
    }

    pub fn config(&self) -> &SenderConfig {
        &self.inner.config
    }

    /// Largest number of actions the next request will carry.
    ///
    /// Shrinks below the configured batch size after oversized rejections.
    pub fn current_batch_size(&self) -> usize {
        self.inner.batch_size.load(Ordering::SeqCst)
    }

    /// Whether a flush is currently running.
    pub fn is_flushing(&self) -> bool {
        self.inner.gate.is_busy()
    }

    /// Automatic flush triggers skipped because a flush was running.
    pub fn skipped_triggers(&self) -> u64 {
        self.inner.gate.skipped()
    }
}

impl<D: Clone + Send + Sync + 'static> BufferedSender<D> {
    /// Copies of the queued actions, in the order they will be sent.
    pub fn pending_actions(&self) -> Vec<TrackedAction<D>> {
        self.inner.queue.snapshot()
    }
}

struct SenderInner<D> {
    config: SenderConfig,
    queue: Arc<ActionQueue<D>>,
    submitter: Submitter<D>,
    hooks: HookDispatcher<D>,
    key_extractor: KeyExtractor<D>,
    gate: FlushGate,
    timer: IdleTimer,
    throttle: Mutex<Throttle>,
    /// Set when an idle trigger found the gate held
    drain_requested: AtomicBool,
    /// Effective drain size; starts at the configured batch size
    batch_size: AtomicUsize,
    runtime: Handle,
}

impl<D: Send + Sync + 'static> SenderInner<D> {
    fn add_actions(
        self: &Arc<Self>,
        actions: impl IntoIterator<Item = IndexAction<D>>,
    ) -> Result<(), PipelineError> {
        if self.queue.is_closed() {
            return Err(PipelineError::Closed);
        }

        let tracked: Vec<_> = actions
            .into_iter()
            .map(|action| {
                let key = (self.key_extractor)(&action.document);
                TrackedAction::new(action, key)
            })
            .collect();
        if tracked.is_empty() {
            return Ok(());
        }

        for action in &tracked {
            self.hooks.added(action);
        }

        let count = tracked.len();
        match self.queue.enqueue(tracked) {
            Ok(queued) => {
                debug!(added = count, queued = queued, "Actions enqueued");
                self.maybe_flush(queued);
                Ok(())
            }
            Err(QueueClosed(rejected)) => {
                // close() won the race after the added hooks fired
                for action in &rejected {
                    self.hooks.error(action, &FailureReason::SenderClosed);
                }
                Err(PipelineError::Closed)
            }
        }
    }

    fn maybe_flush(self: &Arc<Self>, queued: usize) {
        if !self.config.auto_flush {
            return;
        }
        self.schedule_idle_flush();
        if queued >= self.config.batch_size {
            let inner = self.clone();
            self.runtime.spawn(async move {
                inner.run_flush(FlushTrigger::Threshold).await;
            });
        }
    }

    fn schedule_idle_flush(self: &Arc<Self>) {
        let weak = Arc::downgrade(self);
        self.timer.schedule(&self.runtime, async move {
            if let Some(inner) = weak.upgrade() {
                inner.run_flush(FlushTrigger::Idle).await;
            }
        });
    }

    /// The single flush loop behind every trigger.
    async fn run_flush(self: &Arc<Self>, trigger: FlushTrigger) -> FlushSummary {
        let Some(mut permit) = self.enter(trigger).await else {
            return FlushSummary::default();
        };

        let mut summary = FlushSummary::new();
        let mut current = trigger;
        loop {
            self.drain_batches(current, &mut summary).await;
            drop(permit);

            // A threshold trigger skipped between the last queue check and
            // the release above is picked up here.
            if !self.owes_threshold_flush(current) {
                break;
            }
            current = FlushTrigger::Threshold;
            match self.enter(current).await {
                Some(next) => permit = next,
                None => break,
            }
        }

        let remaining = self.queue.len();
        if remaining > 0 && self.config.auto_flush && trigger != FlushTrigger::Close {
            self.schedule_idle_flush();
        }

        if summary.requests > 0 {
            info!(
                trigger = ?trigger,
                requests = summary.requests,
                splits = summary.splits,
                succeeded = summary.succeeded,
                retried = summary.retried,
                failed = summary.failed.len(),
                remaining = remaining,
                "Flush complete"
            );
        }
        summary
    }

    /// Take the gate for `trigger`. Automatic triggers skip when it is held.
    async fn enter(&self, trigger: FlushTrigger) -> Option<FlushPermit<'_>> {
        if trigger.waits_for_gate() {
            return Some(self.gate.acquire().await);
        }
        let permit = self.gate.try_acquire();
        if permit.is_none() {
            if trigger == FlushTrigger::Idle {
                self.drain_requested.store(true, Ordering::SeqCst);
            }
            debug!(trigger = ?trigger, "Flush already in progress; skipping trigger");
        }
        permit
    }

    /// Submit batches until `trigger` has nothing more to send. Caller holds
    /// the gate.
    async fn drain_batches(&self, trigger: FlushTrigger, summary: &mut FlushSummary) {
        let mut drain_all = trigger.drains_all();
        loop {
            if self.drain_requested.swap(false, Ordering::SeqCst) {
                drain_all = true;
            }
            let queued = self.queue.len();
            let ready = if drain_all {
                queued > 0
            } else {
                queued >= self.config.batch_size
            };
            if !ready {
                break;
            }

            let delay = self
                .throttle
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .take_delay();
            if let Some(delay) = delay {
                debug!(delay_ms = delay.as_millis() as u64, "Throttled; delaying next request");
                tokio::time::sleep(delay).await;
            }

            let actions = self.queue.drain(self.batch_size.load(Ordering::SeqCst));
            if actions.is_empty() {
                break;
            }
            let report = self.submitter.submit(actions).await;

            self.throttle
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .record(report.throttled);
            if let Some(split_size) = report.split_size {
                let previous = self.batch_size.fetch_min(split_size.max(1), Ordering::SeqCst);
                if split_size < previous {
                    info!(from = previous, to = split_size, "Reduced batch size after oversized payload");
                }
            }
            summary.merge(report.summary);
        }
    }

    /// Whether a full batch is waiting with no flush responsible for it.
    fn owes_threshold_flush(&self, finished: FlushTrigger) -> bool {
        finished != FlushTrigger::Close
            && self.config.auto_flush
            && !self.queue.is_closed()
            && self.queue.len() >= self.config.batch_size
    }

    fn finish(&self, summary: FlushSummary) -> Result<FlushSummary, PipelineError> {
        if self.config.strict_flush && summary.has_failures() {
            return Err(PipelineError::FlushFailed {
                failures: summary.failed,
            });
        }
        Ok(summary)
    }
}

impl<D> Drop for SenderInner<D> {
    fn drop(&mut self) {
        let pending = self.queue.len();
        if pending > 0 {
            warn!(pending = pending, "Sender dropped with unsent actions; call close() to flush them");
        }
    }
}
