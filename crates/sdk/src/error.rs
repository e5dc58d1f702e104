//! Error types for the Toolmux SDK.

use serde::{Deserialize, Serialize};

/// Result type for SDK operations.
pub type ToolmuxResult<T> = Result<T, ToolmuxError>;

/// Error types that can occur when using the Toolmux SDK.
#[derive(Debug, thiserror::Error)]
pub enum ToolmuxError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Unknown tool (404).
    #[error("Not found: {message}")]
    NotFound {
        message: String,
        details: Option<String>,
    },

    /// The backend rejected the parameters, or the request was malformed (400).
    #[error("Invalid input: {message}")]
    InvalidInput {
        message: String,
        details: Option<String>,
    },

    /// Gateway not ready, catalog empty or owning backend down (503).
    #[error("Unavailable: {message}")]
    Unavailable {
        kind: String,
        message: String,
        details: Option<String>,
    },

    /// The gateway gave up waiting for a backend (504), or the request
    /// itself timed out.
    #[error("Request timed out: {message}")]
    Timeout { message: String },

    /// Any other error response.
    #[error("API error (status {status}): {message}")]
    Api {
        status: u16,
        kind: Option<String>,
        message: String,
        details: Option<String>,
    },

    /// Invalid configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

impl ToolmuxError {
    /// Check if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Http(err) => err.is_connect() || err.is_timeout(),
            Self::Timeout { .. } | Self::Unavailable { .. } => true,
            Self::Api { status, .. } => *status == 429 || *status == 502,
            _ => false,
        }
    }

    /// Error kind reported by the gateway, e.g. `backend_unavailable`
    pub fn kind(&self) -> Option<&str> {
        match self {
            Self::NotFound { .. } => Some("not_found"),
            Self::Timeout { .. } => Some("timeout"),
            Self::Unavailable { kind, .. } => Some(kind.as_str()),
            Self::Api { kind, .. } => kind.as_deref(),
            _ => None,
        }
    }

    /// Create an error from a status code and response body.
    pub fn from_response(status: u16, body: &str) -> Self {
        let (kind, message, details) = match serde_json::from_str::<ErrorResponse>(body) {
            Ok(response) => (Some(response.error), response.message, response.details),
            Err(_) => (None, None, None),
        };
        let message = message
            .or_else(|| kind.clone())
            .unwrap_or_else(|| body.to_string());

        match status {
            400 => Self::InvalidInput { message, details },
            404 => Self::NotFound { message, details },
            503 => Self::Unavailable {
                kind: kind.unwrap_or_else(|| "unavailable".to_string()),
                message,
                details,
            },
            504 => Self::Timeout { message },
            _ => Self::Api {
                status,
                kind,
                message,
                details,
            },
        }
    }
}

/// Error body returned by the gateway.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_response_maps_status() {
        let body = r#"{"error":"validation_error","message":"invalid parameters for tool 'echo': missing text","details":"missing text"}"#;
        match ToolmuxError::from_response(400, body) {
            ToolmuxError::InvalidInput { message, details } => {
                assert!(message.contains("missing text"));
                assert_eq!(details.as_deref(), Some("missing text"));
            }
            other => panic!("unexpected {:?}", other),
        }

        let body = r#"{"error":"backend_unavailable","message":"backend 'a' is down"}"#;
        let err = ToolmuxError::from_response(503, body);
        assert_eq!(err.kind(), Some("backend_unavailable"));
        assert!(err.is_retryable());

        let err = ToolmuxError::from_response(500, r#"{"error":"unknown_failure","message":"boom"}"#);
        assert_eq!(err.kind(), Some("unknown_failure"));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_from_response_plain_body() {
        match ToolmuxError::from_response(502, "Bad Gateway") {
            ToolmuxError::Api {
                status, message, ..
            } => {
                assert_eq!(status, 502);
                assert_eq!(message, "Bad Gateway");
            }
            other => panic!("unexpected {:?}", other),
        }

        assert!(matches!(
            ToolmuxError::from_response(504, ""),
            ToolmuxError::Timeout { .. }
        ));
    }
}
