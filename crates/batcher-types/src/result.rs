//! Per-action results reported by the indexing service.

use serde::{Deserialize, Serialize};

/// Outcome of one action inside a submitted batch.
///
/// Results are correlated to submitted actions by `key`, not by position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionResult {
    /// Key of the document the result refers to
    pub key: String,

    /// Whether the service applied the action
    #[serde(rename = "status")]
    pub succeeded: bool,

    /// HTTP-style status code for this action
    pub status_code: u16,

    /// Service-provided error text for failed actions
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl ActionResult {
    /// Create a result for an applied action.
    pub fn success(key: impl Into<String>, status_code: u16) -> Self {
        Self {
            key: key.into(),
            succeeded: true,
            status_code,
            error_message: None,
        }
    }

    /// Create a result for a rejected action.
    pub fn failure(key: impl Into<String>, status_code: u16, message: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            succeeded: false,
            status_code,
            error_message: Some(message.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_service_shape() {
        let json = r#"{"key":"doc-1","status":false,"errorMessage":"conflict","statusCode":409}"#;
        let result: ActionResult = serde_json::from_str(json).unwrap();

        assert_eq!(result.key, "doc-1");
        assert!(!result.succeeded);
        assert_eq!(result.status_code, 409);
        assert_eq!(result.error_message.as_deref(), Some("conflict"));
    }

    #[test]
    fn test_success_omits_message() {
        let json = serde_json::to_value(ActionResult::success("doc-2", 201)).unwrap();
        assert_eq!(json["status"], true);
        assert_eq!(json["statusCode"], 201);
        assert!(json.get("errorMessage").is_none());
    }
}
