// Stream backend: MCP over a WebSocket connection

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::net::TcpStream;
use tokio_tungstenite::{connect_async, MaybeTlsStream};
use toolmux_core::{BackendName, RemoteTool, Transport, TransportError, TransportKind};
use tracing::debug;

use crate::session::McpSession;
use crate::wire::WsWire;

type WsSession = McpSession<WsWire<MaybeTlsStream<TcpStream>>>;

pub struct WebSocketTransport {
    backend: BackendName,
    endpoint: String,
    session: Option<WsSession>,
}

impl WebSocketTransport {
    pub fn new(backend: BackendName, endpoint: impl Into<String>) -> Self {
        Self {
            backend,
            endpoint: endpoint.into(),
            session: None,
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn session(&mut self) -> Result<&mut WsSession, TransportError> {
        self.session.as_mut().ok_or(TransportError::Closed)
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Websocket
    }

    async fn open(&mut self) -> Result<(), TransportError> {
        if self.session.is_some() {
            return Ok(());
        }

        let (stream, response) = connect_async(self.endpoint.as_str())
            .await
            .map_err(|e| TransportError::Connect(format!("{}: {}", self.endpoint, e)))?;
        debug!(
            backend = %self.backend,
            endpoint = %self.endpoint,
            status = %response.status(),
            "WebSocket connected"
        );

        let mut session = McpSession::new(WsWire::new(stream));
        if let Err(err) = session.initialize().await {
            let _ = session.close().await;
            return Err(match err {
                TransportError::Handshake(_) => err,
                other => TransportError::Handshake(other.to_string()),
            });
        }

        self.session = Some(session);
        Ok(())
    }

    async fn list_tools(&mut self) -> Result<Vec<RemoteTool>, TransportError> {
        self.session()?.list_tools().await
    }

    async fn call_tool(
        &mut self,
        name: &str,
        arguments: &Map<String, Value>,
    ) -> Result<Value, TransportError> {
        self.session()?.call_tool(name, arguments).await
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        match self.session.take() {
            Some(mut session) => session.close().await,
            None => Ok(()),
        }
    }
}
