// MCP server: answers JSON-RPC requests from a tool registry

use serde_json::{json, Value};
use std::sync::Arc;
use tokio::net::TcpListener;
use toolmux_core::TransportError;
use tracing::{debug, info, warn};

use crate::protocol::{
    CallToolParams, CallToolResult, InitializeResult, JsonRpcError, JsonRpcRequest,
    JsonRpcResponse, ListToolsParams, ListToolsResult, ServerCapabilities, ServerInfo,
    ToolsCapability, PROTOCOL_VERSION,
};
use crate::tools::{ToolError, ToolRegistry};
use crate::wire::{Wire, WsWire};

pub struct McpServer {
    registry: ToolRegistry,
    info: ServerInfo,
    page_size: Option<usize>,
}

impl McpServer {
    pub fn new(registry: ToolRegistry) -> Self {
        Self {
            registry,
            info: ServerInfo {
                name: "toolmux-demo-server".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
            page_size: None,
        }
    }

    pub fn with_info(mut self, name: impl Into<String>, version: impl Into<String>) -> Self {
        self.info = ServerInfo {
            name: name.into(),
            version: version.into(),
        };
        self
    }

    /// Split `tools/list` into pages of at most `size` tools
    pub fn with_page_size(mut self, size: usize) -> Self {
        self.page_size = Some(size.max(1));
        self
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// Answer requests until the peer closes the wire
    pub async fn serve<W: Wire>(&self, mut wire: W) -> Result<(), TransportError> {
        while let Some(line) = wire.recv().await? {
            if let Some(response) = self.handle_message(&line).await {
                let line = serde_json::to_string(&response)
                    .map_err(|e| TransportError::Protocol(e.to_string()))?;
                wire.send(line).await?;
            }
        }
        debug!("Client closed the session");
        Ok(())
    }

    /// Handle one raw message. Notifications produce no response.
    pub async fn handle_message(&self, line: &str) -> Option<JsonRpcResponse> {
        let value: Value = match serde_json::from_str(line) {
            Ok(value) => value,
            Err(_) => return Some(JsonRpcResponse::error(Value::Null, JsonRpcError::parse_error())),
        };
        let request: JsonRpcRequest = match serde_json::from_value(value) {
            Ok(request) => request,
            Err(_) => {
                return Some(JsonRpcResponse::error(
                    Value::Null,
                    JsonRpcError::invalid_request(),
                ))
            }
        };

        let outcome = self.dispatch(&request).await;
        let id = request.id?;
        Some(match outcome {
            Ok(result) => JsonRpcResponse::success(id, result),
            Err(error) => JsonRpcResponse::error(id, error),
        })
    }

    async fn dispatch(&self, request: &JsonRpcRequest) -> Result<Value, JsonRpcError> {
        debug!(method = %request.method, "Handling request");

        match request.method.as_str() {
            "initialize" => to_result(InitializeResult {
                protocol_version: PROTOCOL_VERSION.to_string(),
                capabilities: ServerCapabilities {
                    tools: Some(ToolsCapability {
                        list_changed: false,
                    }),
                },
                server_info: self.info.clone(),
            }),
            "ping" => Ok(json!({})),
            "tools/list" => self.list_tools(request.params.clone()),
            "tools/call" => self.call_tool(request.params.clone()).await,
            method if method.starts_with("notifications/") => Ok(Value::Null),
            method => Err(JsonRpcError::method_not_found(method)),
        }
    }

    fn list_tools(&self, params: Option<Value>) -> Result<Value, JsonRpcError> {
        let params: ListToolsParams = match params {
            Some(params) => serde_json::from_value(params)
                .map_err(|e| JsonRpcError::invalid_params(e.to_string()))?,
            None => ListToolsParams::default(),
        };

        let schemas = self.registry.list_schemas();
        let start = match params.cursor {
            Some(cursor) => cursor
                .parse::<usize>()
                .ok()
                .filter(|start| *start <= schemas.len())
                .ok_or_else(|| JsonRpcError::invalid_params(format!("Invalid cursor: {}", cursor)))?,
            None => 0,
        };
        let end = match self.page_size {
            Some(size) => (start + size).min(schemas.len()),
            None => schemas.len(),
        };

        to_result(ListToolsResult {
            next_cursor: (end < schemas.len()).then(|| end.to_string()),
            tools: schemas[start..end].to_vec(),
        })
    }

    async fn call_tool(&self, params: Option<Value>) -> Result<Value, JsonRpcError> {
        let params: CallToolParams = serde_json::from_value(params.unwrap_or(Value::Null))
            .map_err(|e| JsonRpcError::invalid_params(format!("Invalid tools/call params: {}", e)))?;

        let tool = self
            .registry
            .get(&params.name)
            .ok_or_else(|| JsonRpcError::invalid_params(format!("Unknown tool: {}", params.name)))?;

        let result = match tool.execute(params.arguments).await {
            Ok(result) => result,
            Err(ToolError::InvalidArguments(message)) => {
                return Err(JsonRpcError::invalid_params(message))
            }
            Err(ToolError::Failed(message)) => {
                warn!(tool = %params.name, error = %message, "Tool failed");
                CallToolResult::error(message)
            }
        };
        to_result(result)
    }
}

fn to_result<T: serde::Serialize>(value: T) -> Result<Value, JsonRpcError> {
    serde_json::to_value(value).map_err(|e| JsonRpcError::internal_error(e.to_string()))
}

/// Accept WebSocket clients on `listener`, one session per connection
pub async fn serve_websocket(server: Arc<McpServer>, listener: TcpListener) -> std::io::Result<()> {
    info!(address = %listener.local_addr()?, "Serving MCP over WebSocket");

    loop {
        let (stream, peer) = listener.accept().await?;
        let server = server.clone();
        tokio::spawn(async move {
            let socket = match tokio_tungstenite::accept_async(stream).await {
                Ok(socket) => socket,
                Err(err) => {
                    warn!(peer = %peer, error = %err, "WebSocket handshake failed");
                    return;
                }
            };
            debug!(peer = %peer, "WebSocket client connected");
            if let Err(err) = server.serve(WsWire::new(socket)).await {
                debug!(peer = %peer, error = %err, "WebSocket session ended with error");
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::demo_registry;

    async fn call(server: &McpServer, message: Value) -> Value {
        let response = server
            .handle_message(&message.to_string())
            .await
            .expect("expected a response");
        serde_json::to_value(response).unwrap()
    }

    #[tokio::test]
    async fn test_initialize() {
        let server = McpServer::new(demo_registry()).with_info("test", "1.0");
        let response = call(
            &server,
            json!({"jsonrpc": "2.0", "id": 1, "method": "initialize", "params": {}}),
        )
        .await;

        assert_eq!(response["result"]["protocolVersion"], json!(PROTOCOL_VERSION));
        assert_eq!(response["result"]["serverInfo"]["name"], json!("test"));
        assert_eq!(response["result"]["capabilities"]["tools"]["listChanged"], json!(false));
    }

    #[tokio::test]
    async fn test_notifications_get_no_response() {
        let server = McpServer::new(demo_registry());
        let response = server
            .handle_message(r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#)
            .await;
        assert!(response.is_none());
    }

    #[tokio::test]
    async fn test_error_codes() {
        let server = McpServer::new(demo_registry());

        let parse = server.handle_message("not json").await.unwrap();
        assert_eq!(parse.error.unwrap().code, JsonRpcError::PARSE_ERROR);

        let invalid = server.handle_message(r#"{"id": 1}"#).await.unwrap();
        assert_eq!(invalid.error.unwrap().code, JsonRpcError::INVALID_REQUEST);

        let unknown = call(&server, json!({"jsonrpc": "2.0", "id": 2, "method": "resources/list"})).await;
        assert_eq!(unknown["error"]["code"], json!(JsonRpcError::METHOD_NOT_FOUND));

        let missing_tool = call(
            &server,
            json!({"jsonrpc": "2.0", "id": 3, "method": "tools/call", "params": {"name": "nope"}}),
        )
        .await;
        assert_eq!(missing_tool["error"]["code"], json!(JsonRpcError::INVALID_PARAMS));

        let bad_args = call(
            &server,
            json!({"jsonrpc": "2.0", "id": 4, "method": "tools/call",
                   "params": {"name": "echo", "arguments": {"text": 5}}}),
        )
        .await;
        assert_eq!(bad_args["error"]["code"], json!(JsonRpcError::INVALID_PARAMS));
    }

    #[tokio::test]
    async fn test_paged_listing() {
        let server = McpServer::new(demo_registry()).with_page_size(3);

        let first = call(&server, json!({"jsonrpc": "2.0", "id": 1, "method": "tools/list"})).await;
        assert_eq!(first["result"]["tools"].as_array().unwrap().len(), 3);
        assert_eq!(first["result"]["nextCursor"], json!("3"));

        let second = call(
            &server,
            json!({"jsonrpc": "2.0", "id": 2, "method": "tools/list", "params": {"cursor": "3"}}),
        )
        .await;
        assert_eq!(second["result"]["tools"].as_array().unwrap().len(), 1);
        assert!(second["result"].get("nextCursor").is_none());

        let bad = call(
            &server,
            json!({"jsonrpc": "2.0", "id": 3, "method": "tools/list", "params": {"cursor": "x"}}),
        )
        .await;
        assert_eq!(bad["error"]["code"], json!(JsonRpcError::INVALID_PARAMS));
    }

    #[tokio::test]
    async fn test_call_tool_result() {
        let server = McpServer::new(demo_registry());
        let response = call(
            &server,
            json!({"jsonrpc": "2.0", "id": 1, "method": "tools/call",
                   "params": {"name": "text_analysis", "arguments": {"text": "great", "operation": "sentiment"}}}),
        )
        .await;

        assert_eq!(
            response["result"]["content"][0],
            json!({"type": "text", "text": "Positive"})
        );
    }
}
