//! Collaborator seams: the network client, the document serializer and the
//! key extractor.
//!
//! The pipeline only needs the tri-state answer of [`IndexClient::submit`]:
//! per-action results, an oversized-payload rejection, or any other
//! transport failure.

use std::sync::Arc;

use async_trait::async_trait;
use batcher_types::{ActionKind, ActionResult};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::error::PipelineError;

/// Serialized form of one action for one submission attempt.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WireAction {
    /// Mutation kind
    pub kind: ActionKind,
    /// Correlation key
    pub key: String,
    /// Serialized document (always a JSON object)
    pub document: Value,
}

/// Failure of a whole batch submission, with no per-action data.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubmitError {
    /// The service refused the request body as too large
    #[error("Payload too large")]
    PayloadTooLarge,

    /// Any other transport-level failure
    #[error("Transport error: {0}")]
    Transport(String),
}

/// Network collaborator that submits one batch per call.
///
/// Implementations must not retry on their own behalf at the application
/// level; the pipeline decides what is retried.
#[async_trait]
pub trait IndexClient: Send + Sync {
    /// Submit a batch and return one result per action, keyed by action key.
    async fn submit(&self, actions: &[WireAction]) -> Result<Vec<ActionResult>, SubmitError>;
}

/// Converts caller documents into their wire representation.
pub trait DocumentSerializer<D>: Send + Sync {
    /// Serialize one document. Called once per action per attempt.
    fn serialize(&self, document: &D) -> Result<Value, PipelineError>;
}

/// Serializer for any `serde::Serialize` document.
///
/// Documents must serialize to a JSON object.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonSerializer;

impl<D: Serialize> DocumentSerializer<D> for JsonSerializer {
    fn serialize(&self, document: &D) -> Result<Value, PipelineError> {
        match serde_json::to_value(document)? {
            value @ Value::Object(_) => Ok(value),
            other => Err(PipelineError::Serialization(format!(
                "document must serialize to a JSON object, got {}",
                json_type_name(&other)
            ))),
        }
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Derives the correlation key of a document at enqueue time.
pub type KeyExtractor<D> = Arc<dyn Fn(&D) -> String + Send + Sync>;

/// Key extractor reading a top-level field of a JSON document.
///
/// String fields are used as-is; other scalar values use their JSON text.
/// A missing field yields an empty key.
pub fn field_key_extractor(field: impl Into<String>) -> KeyExtractor<Value> {
    let field = field.into();
    Arc::new(move |document: &Value| match document.get(&field) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    })
}
