use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{BackendName, ConnectionState, GatewayState};

/// Failure reported by a concrete transport session
#[derive(Debug, Clone, Error, PartialEq)]
pub enum TransportError {
    #[error("failed to spawn backend process: {0}")]
    Spawn(String),

    #[error("failed to connect to backend: {0}")]
    Connect(String),

    #[error("handshake failed: {0}")]
    Handshake(String),

    #[error("transport I/O error: {0}")]
    Io(String),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("backend rejected parameters: {0}")]
    Rejected(String),

    #[error("{}", format_remote(.code, .message))]
    Remote { code: Option<i64>, message: String },

    #[error("transport session closed")]
    Closed,
}

fn format_remote(code: &Option<i64>, message: &str) -> String {
    match code {
        Some(code) => format!("[{}] {}", code, message),
        None => message.to_string(),
    }
}

impl TransportError {
    /// Whether the session can no longer carry requests
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Io(_) | Self::Closed | Self::Spawn(_) | Self::Connect(_)
        )
    }
}

/// A backend could not be reached, spawned or handshaken
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ConnectError {
    #[error("backend unreachable: {0}")]
    Unreachable(String),

    #[error("backend handshake failed: {0}")]
    Handshake(String),

    #[error("backend did not become ready within {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("connection previously failed: {reason}")]
    PreviouslyFailed { reason: String },

    #[error("cannot start connection in state {0}")]
    InvalidState(ConnectionState),
}

impl From<TransportError> for ConnectError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Spawn(_)
            | TransportError::Connect(_)
            | TransportError::Io(_)
            | TransportError::Closed => Self::Unreachable(err.to_string()),
            other => Self::Handshake(other.to_string()),
        }
    }
}

/// Catalog listing failed on a reachable backend
#[derive(Debug, Clone, Error, PartialEq)]
pub enum QueryError {
    #[error("connection is {0}, not ready")]
    NotReady(ConnectionState),

    #[error("tool listing timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Classified failure of a single backend call
#[derive(Debug, Clone, Error, PartialEq)]
pub enum InvokeError {
    #[error("invalid parameters: {0}")]
    Validation(String),

    #[error("backend unavailable: {0}")]
    Unavailable(String),

    #[error("call timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("{0}")]
    Unknown(String),
}

impl From<TransportError> for InvokeError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Rejected(message) => Self::Validation(message),
            TransportError::Io(_)
            | TransportError::Closed
            | TransportError::Spawn(_)
            | TransportError::Connect(_) => Self::Unavailable(err.to_string()),
            other => Self::Unknown(other.to_string()),
        }
    }
}

/// Orderly close did not complete cleanly. The connection is still closed.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum StopError {
    #[error("close did not finish within {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Externally visible classification of an invocation failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    NotFound,
    ValidationError,
    BackendUnavailable,
    Timeout,
    UnknownFailure,
    NoToolsAvailable,
    NotReady,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::ValidationError => "validation_error",
            Self::BackendUnavailable => "backend_unavailable",
            Self::Timeout => "timeout",
            Self::UnknownFailure => "unknown_failure",
            Self::NoToolsAvailable => "no_tools_available",
            Self::NotReady => "not_ready",
        }
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure of `Gateway::invoke_tool`
#[derive(Debug, Clone, Error, PartialEq)]
pub enum InvokeFailure {
    #[error("tool '{tool}' not found")]
    NotFound { tool: String },

    #[error("invalid parameters for tool '{tool}': {message}")]
    Validation {
        tool: String,
        backend: BackendName,
        message: String,
    },

    #[error("backend '{backend}' for tool '{tool}' is unavailable: {message}")]
    BackendUnavailable {
        tool: String,
        backend: BackendName,
        message: String,
    },

    #[error("tool '{tool}' on backend '{backend}' timed out after {timeout_ms}ms")]
    Timeout {
        tool: String,
        backend: BackendName,
        timeout_ms: u64,
    },

    #[error("tool '{tool}' on backend '{backend}' failed: {message}")]
    Unknown {
        tool: String,
        backend: BackendName,
        message: String,
    },

    #[error("no tools available")]
    NoToolsAvailable,

    #[error("gateway is {state}, not ready")]
    NotReady { state: GatewayState },
}

impl InvokeFailure {
    /// Attach routing context to a connection-level failure
    pub fn classify(tool: &str, backend: &BackendName, err: InvokeError) -> Self {
        let tool = tool.to_string();
        let backend = backend.clone();
        match err {
            InvokeError::Validation(message) => Self::Validation {
                tool,
                backend,
                message,
            },
            InvokeError::Unavailable(message) => Self::BackendUnavailable {
                tool,
                backend,
                message,
            },
            InvokeError::Timeout { timeout_ms } => Self::Timeout {
                tool,
                backend,
                timeout_ms,
            },
            InvokeError::Unknown(message) => Self::Unknown {
                tool,
                backend,
                message,
            },
        }
    }

    pub fn kind(&self) -> FailureKind {
        match self {
            Self::NotFound { .. } => FailureKind::NotFound,
            Self::Validation { .. } => FailureKind::ValidationError,
            Self::BackendUnavailable { .. } => FailureKind::BackendUnavailable,
            Self::Timeout { .. } => FailureKind::Timeout,
            Self::Unknown { .. } => FailureKind::UnknownFailure,
            Self::NoToolsAvailable => FailureKind::NoToolsAvailable,
            Self::NotReady { .. } => FailureKind::NotReady,
        }
    }

    /// Backend involved in the failure, if the call got that far
    pub fn backend(&self) -> Option<&BackendName> {
        match self {
            Self::Validation { backend, .. }
            | Self::BackendUnavailable { backend, .. }
            | Self::Timeout { backend, .. }
            | Self::Unknown { backend, .. } => Some(backend),
            _ => None,
        }
    }
}

/// Gateway construction or lifecycle misuse
#[derive(Debug, Clone, Error, PartialEq)]
pub enum GatewayError {
    #[error("cannot {operation} while gateway is {state}")]
    InvalidState {
        operation: &'static str,
        state: GatewayState,
    },

    #[error("backend '{0}' is registered more than once")]
    DuplicateBackend(BackendName),
}

/// Rejected configuration
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ConfigError {
    #[error("backend #{index} has an empty name")]
    EmptyName { index: usize },

    #[error("backend '{0}' is configured more than once")]
    DuplicateBackend(BackendName),

    #[error("backend '{0}' has an empty command")]
    EmptyCommand(BackendName),

    #[error("backend '{backend}' has an invalid endpoint '{endpoint}': {reason}")]
    InvalidEndpoint {
        backend: BackendName,
        endpoint: String,
        reason: String,
    },

    #[error("timeout '{field}' for {scope} must be greater than zero")]
    ZeroTimeout { scope: String, field: &'static str },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_error_classification() {
        assert_eq!(
            InvokeError::from(TransportError::Rejected("missing text".into())),
            InvokeError::Validation("missing text".into())
        );
        assert!(matches!(
            InvokeError::from(TransportError::Closed),
            InvokeError::Unavailable(_)
        ));

        let remote = InvokeError::from(TransportError::Remote {
            code: Some(-32000),
            message: "boom".into(),
        });
        assert_eq!(remote, InvokeError::Unknown("[-32000] boom".into()));
    }

    #[test]
    fn test_connect_error_from_transport() {
        assert!(matches!(
            ConnectError::from(TransportError::Spawn("no such file".into())),
            ConnectError::Unreachable(_)
        ));
        assert!(matches!(
            ConnectError::from(TransportError::Protocol("bad frame".into())),
            ConnectError::Handshake(_)
        ));
    }

    #[test]
    fn test_failure_keeps_diagnostic() {
        let backend = BackendName::new("a");
        let failure = InvokeFailure::classify(
            "echo",
            &backend,
            InvokeError::Unknown("KeyError: 'text'".into()),
        );

        assert_eq!(failure.kind(), FailureKind::UnknownFailure);
        assert_eq!(failure.backend(), Some(&backend));
        assert!(failure.to_string().contains("KeyError: 'text'"));
        assert_eq!(
            InvokeFailure::NotFound {
                tool: "missing".into()
            }
            .backend(),
            None
        );
    }
}
