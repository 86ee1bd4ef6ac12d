//! Error types for the batching pipeline.

use batcher_types::SettingsError;
use thiserror::Error;

/// Why an action reached a terminal failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FailureReason {
    /// The service rejected the action with a non-retryable status
    #[error("rejected with status {status_code}: {}", .message.as_deref().unwrap_or("no error message"))]
    Rejected {
        status_code: u16,
        message: Option<String>,
    },

    /// Every allowed attempt ended in a retryable failure
    #[error("retry limit exhausted after {attempts} attempts (last failure: {last_error})")]
    RetriesExhausted { attempts: u32, last_error: String },

    /// The action alone exceeds the service's payload limit
    #[error("document too large to submit")]
    DocumentTooLarge,

    /// The response carried no result for this action's key
    #[error("unmatched result: no entry for key in service response")]
    Unmatched,

    /// The document could not be converted to its wire form
    #[error("serialization failed: {0}")]
    Serialization(String),

    /// The sender closed while the action was being enqueued
    #[error("sender closed before the action was queued")]
    SenderClosed,
}

/// A terminally failed action as reported in a flush summary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionFailure {
    /// Correlation key of the failed action
    pub key: String,
    /// Attempts made before the failure became terminal
    pub try_count: u32,
    /// Cause of the failure
    pub reason: FailureReason,
}

/// Errors returned by the buffered sender.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The sender was closed; no further enqueue or flush is accepted
    #[error("Sender is closed")]
    Closed,

    /// Sender configuration is invalid or incomplete
    #[error("Configuration error: {0}")]
    Config(String),

    /// The sender was built outside a Tokio runtime
    #[error("No Tokio runtime available to drive background flushes")]
    NoRuntime,

    /// Document serialization failed
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Strict mode: at least one action terminally failed during the flush
    #[error("{} action(s) failed during flush", .failures.len())]
    FlushFailed { failures: Vec<ActionFailure> },
}

impl From<SettingsError> for PipelineError {
    fn from(err: SettingsError) -> Self {
        PipelineError::Config(err.to_string())
    }
}

impl From<serde_json::Error> for PipelineError {
    fn from(err: serde_json::Error) -> Self {
        PipelineError::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_reason_display() {
        let reason = FailureReason::Rejected {
            status_code: 400,
            message: Some("invalid field".to_string()),
        };
        assert_eq!(reason.to_string(), "rejected with status 400: invalid field");

        let reason = FailureReason::Rejected {
            status_code: 500,
            message: None,
        };
        assert_eq!(reason.to_string(), "rejected with status 500: no error message");

        assert!(FailureReason::DocumentTooLarge.to_string().contains("too large"));
        assert!(FailureReason::Unmatched.to_string().contains("unmatched result"));

        let reason = FailureReason::RetriesExhausted {
            attempts: 3,
            last_error: "status 503".to_string(),
        };
        assert!(reason.to_string().contains("retry limit exhausted after 3 attempts"));
    }

    #[test]
    fn test_pipeline_error_display() {
        assert_eq!(PipelineError::Closed.to_string(), "Sender is closed");

        let err = PipelineError::FlushFailed {
            failures: vec![ActionFailure {
                key: "k1".to_string(),
                try_count: 1,
                reason: FailureReason::DocumentTooLarge,
            }],
        };
        assert_eq!(err.to_string(), "1 action(s) failed during flush");
    }

    #[test]
    fn test_from_settings_error() {
        let err: PipelineError = SettingsError::Invalid("batch_size must be > 0".to_string()).into();
        assert!(matches!(err, PipelineError::Config(_)));
    }

    #[test]
    fn test_from_serde_error() {
        let json_err = serde_json::from_str::<i32>("not a number").unwrap_err();
        let err: PipelineError = json_err.into();
        assert!(matches!(err, PipelineError::Serialization(_)));
    }
}
