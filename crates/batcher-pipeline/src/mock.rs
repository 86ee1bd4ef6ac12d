//! Mock index client and recording hooks for testing.
//!
//! Useful for exercising the pipeline without a live search service.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use batcher_types::ActionResult;

use crate::client::{IndexClient, SubmitError, WireAction};
use crate::error::FailureReason;
use crate::hooks::ActionHooks;
use crate::tracked::TrackedAction;

type Responder =
    Box<dyn Fn(usize, &[WireAction]) -> Result<Vec<ActionResult>, SubmitError> + Send + Sync>;

/// One scripted answer of [`MockIndexClient::scripted`].
#[derive(Debug, Clone)]
pub enum MockResponse {
    /// Per-action statuses in request order; missing entries default to 201
    Statuses(Vec<u16>),
    /// Reject the whole request as oversized
    PayloadTooLarge,
    /// Fail the whole request at the transport level
    Transport(String),
}

/// Mock client answering from a responder function.
///
/// Records the keys of every request and tracks how many requests were in
/// flight at once.
pub struct MockIndexClient {
    responder: Responder,
    latency: Option<Duration>,
    calls: Mutex<Vec<Vec<String>>>,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

impl MockIndexClient {
    /// Create a mock from a responder taking the call index and the request.
    pub fn new<F>(responder: F) -> Self
    where
        F: Fn(usize, &[WireAction]) -> Result<Vec<ActionResult>, SubmitError> + Send + Sync + 'static,
    {
        Self {
            responder: Box::new(responder),
            latency: None,
            calls: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        }
    }

    /// Accept every action with status 201.
    pub fn accepting() -> Self {
        Self::new(|_, actions| Ok(statuses(actions, &[])))
    }

    /// Answer the first calls from `script`, then accept everything.
    pub fn scripted(script: Vec<MockResponse>) -> Self {
        Self::new(move |call, actions| match script.get(call) {
            Some(MockResponse::Statuses(codes)) => Ok(statuses(actions, codes)),
            Some(MockResponse::PayloadTooLarge) => Err(SubmitError::PayloadTooLarge),
            Some(MockResponse::Transport(message)) => Err(SubmitError::Transport(message.clone())),
            None => Ok(statuses(actions, &[])),
        })
    }

    /// Reject any request carrying more than `limit` actions as too large.
    pub fn rejecting_over(limit: usize) -> Self {
        Self::new(move |_, actions| {
            if actions.len() > limit {
                Err(SubmitError::PayloadTooLarge)
            } else {
                Ok(statuses(actions, &[]))
            }
        })
    }

    /// Answer every action of a key with a fixed status.
    pub fn with_status_for<F>(status_for: F) -> Self
    where
        F: Fn(&str) -> u16 + Send + Sync + 'static,
    {
        Self::new(move |_, actions| {
            Ok(actions
                .iter()
                .map(|a| result_for(&a.key, status_for(&a.key)))
                .collect())
        })
    }

    /// Delay every response.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Keys of every request received, in call order.
    pub fn calls(&self) -> Vec<Vec<String>> {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Highest number of requests observed in flight at once.
    pub fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

impl Default for MockIndexClient {
    fn default() -> Self {
        Self::accepting()
    }
}

#[async_trait]
impl IndexClient for MockIndexClient {
    async fn submit(&self, actions: &[WireAction]) -> Result<Vec<ActionResult>, SubmitError> {
        let call = {
            let mut calls = self.calls.lock().unwrap_or_else(PoisonError::into_inner);
            calls.push(actions.iter().map(|a| a.key.clone()).collect());
            calls.len() - 1
        };

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        let response = (self.responder)(call, actions);
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        response
    }
}

fn statuses(actions: &[WireAction], codes: &[u16]) -> Vec<ActionResult> {
    actions
        .iter()
        .enumerate()
        .map(|(i, a)| result_for(&a.key, codes.get(i).copied().unwrap_or(201)))
        .collect()
}

fn result_for(key: &str, status_code: u16) -> ActionResult {
    if (200..300).contains(&status_code) {
        ActionResult::success(key, status_code)
    } else {
        ActionResult::failure(key, status_code, format!("mock status {status_code}"))
    }
}

/// A hook invocation captured by [`RecordingHooks`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HookEvent {
    Added { key: String },
    Sent { key: String, try_count: u32 },
    Succeeded { key: String, try_count: u32 },
    Error {
        key: String,
        try_count: u32,
        reason: FailureReason,
    },
}

/// Hooks that record every invocation, for any document type.
#[derive(Debug, Default)]
pub struct RecordingHooks {
    events: Mutex<Vec<HookEvent>>,
}

impl RecordingHooks {
    pub fn new() -> Self {
        Self::default()
    }

    /// All events in invocation order.
    pub fn events(&self) -> Vec<HookEvent> {
        self.events.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Number of `on_sent` calls for a key.
    pub fn sent_count(&self, key: &str) -> usize {
        self.events()
            .iter()
            .filter(|e| matches!(e, HookEvent::Sent { key: k, .. } if k == key))
            .count()
    }

    pub fn added_keys(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                HookEvent::Added { key } => Some(key),
                _ => None,
            })
            .collect()
    }

    pub fn succeeded_keys(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                HookEvent::Succeeded { key, .. } => Some(key),
                _ => None,
            })
            .collect()
    }

    /// Terminal failures as `(key, try_count, reason)`.
    pub fn errors(&self) -> Vec<(String, u32, FailureReason)> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                HookEvent::Error {
                    key,
                    try_count,
                    reason,
                } => Some((key, try_count, reason)),
                _ => None,
            })
            .collect()
    }

    fn push(&self, event: HookEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }
}

impl<D> ActionHooks<D> for RecordingHooks {
    fn on_added(&self, action: &TrackedAction<D>) {
        self.push(HookEvent::Added {
            key: action.key().to_string(),
        });
    }

    fn on_sent(&self, action: &TrackedAction<D>) {
        self.push(HookEvent::Sent {
            key: action.key().to_string(),
            try_count: action.try_count(),
        });
    }

    fn on_succeeded(&self, action: &TrackedAction<D>) {
        self.push(HookEvent::Succeeded {
            key: action.key().to_string(),
            try_count: action.try_count(),
        });
    }

    fn on_error(&self, action: &TrackedAction<D>, reason: &FailureReason) {
        self.push(HookEvent::Error {
            key: action.key().to_string(),
            try_count: action.try_count(),
            reason: reason.clone(),
        });
    }
}
