//! Common DTOs shared across multiple resources

use serde::{Deserialize, Serialize};

/// Standard error response
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    /// Seconds until the caller may retry (rate limits and lockouts only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_secs: Option<i64>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
            retry_after_secs: None,
        }
    }

    pub fn with_retry_after(
        error: impl Into<String>,
        message: impl Into<String>,
        retry_after_secs: i64,
    ) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
            retry_after_secs: Some(retry_after_secs),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_response_new() {
        let err = ErrorResponse::new("invalid_nonce", "Nonce not recognized");
        assert_eq!(err.error, "invalid_nonce");
        assert_eq!(err.message, "Nonce not recognized");
        assert!(err.retry_after_secs.is_none());
    }

    #[test]
    fn test_error_response_serialization_omits_retry_after() {
        let err = ErrorResponse::new("invalid_signature", "Invalid signature");
        let json = serde_json::to_string(&err).unwrap();
        assert!(json.contains("invalid_signature"));
        assert!(!json.contains("retry_after_secs"));
    }

    #[test]
    fn test_error_response_with_retry_after() {
        let err = ErrorResponse::with_retry_after("rate_limited", "Too many attempts", 1800);
        let json = serde_json::to_string(&err).unwrap();
        assert!(json.contains("\"retry_after_secs\":1800"));
    }
}
