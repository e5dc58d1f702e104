use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::error::TransportError;
use crate::types::{RemoteTool, TransportKind};

/// A wire session with one backend.
///
/// Implementations own the underlying resource (child process, socket) and
/// need no internal locking: `Connection` serializes every call and applies
/// timeouts around them.
#[async_trait]
pub trait Transport: Send {
    fn kind(&self) -> TransportKind;

    /// Acquire the session and complete any handshake
    async fn open(&mut self) -> Result<(), TransportError>;

    /// Full tool catalog of the backend, in the order it reports them
    async fn list_tools(&mut self) -> Result<Vec<RemoteTool>, TransportError>;

    /// Run one tool and return its structured result
    async fn call_tool(
        &mut self,
        name: &str,
        arguments: &Map<String, Value>,
    ) -> Result<Value, TransportError>;

    /// Release the session. Must tolerate being called on a session that
    /// was never opened or is already closed.
    async fn close(&mut self) -> Result<(), TransportError>;
}
