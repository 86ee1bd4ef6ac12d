//! Reliable batching pipeline for index actions.
//!
//! This crate buffers document mutations on the client side and submits
//! them to a search index service in batches, recovering locally from
//! oversized payloads and transient per-action failures.
//!
//! ## Key Components
//!
//! - [`BufferedSender`]: Public entry point; enqueue, flush, close
//! - [`ActionQueue`]: FIFO queue with requeue-at-front for retries
//! - [`TrackedAction`]: An action with its correlation key and attempt count
//! - [`IndexClient`]: Network seam with a tri-state outcome
//! - [`ActionHooks`]: Callbacks for added, sent, succeeded and failed actions
//! - [`FlushSummary`]: Per-flush accounting
//!
//! ## Architecture
//!
//! 1. `add_actions` wraps each action with its key and appends it to the queue
//! 2. The size threshold, the idle timer, `flush()` and `close()` all start
//!    the same flush loop, gated so only one runs at a time
//! 3. Each round drains a batch, serializes it once and submits it
//! 4. An oversized rejection bisects the batch until the halves fit; a single
//!    oversized action fails terminally
//! 5. Results are matched to actions by key: successes and hard failures are
//!    terminal, retryable failures go back to the queue front
//!
//! ## Example
//!
//! ```ignore
//! use batcher_pipeline::{BufferedSender, SenderConfig};
//!
//! let sender = BufferedSender::builder(client)
//!     .config(SenderConfig::default().with_batch_size(100))
//!     .key_field("id")
//!     .build()?;
//!
//! sender.upload_documents(documents)?;
//! let summary = sender.close().await?;
//! ```

mod batch;
pub mod client;
pub mod error;
mod gate;
pub mod hooks;
pub mod mock;
pub mod queue;
mod reconcile;
pub mod sender;
mod submit;
pub mod summary;
mod throttle;
mod timer;
pub mod tracked;

pub use batcher_types::{ActionKind, ActionResult, IndexAction, SenderConfig};
pub use client::{
    field_key_extractor, DocumentSerializer, IndexClient, JsonSerializer, KeyExtractor,
    SubmitError, WireAction,
};
pub use error::{ActionFailure, FailureReason, PipelineError};
pub use hooks::{ActionHooks, NoopHooks};
pub use queue::{ActionQueue, QueueClosed};
pub use reconcile::{classify_status, StatusClass};
pub use sender::{BufferedSender, BufferedSenderBuilder};
pub use summary::FlushSummary;
pub use tracked::TrackedAction;
