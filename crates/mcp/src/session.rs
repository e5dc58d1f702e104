// MCP client session shared by every transport variant

use serde_json::{json, Map, Value};
use std::collections::HashSet;
use toolmux_core::{RemoteTool, TransportError};
use tracing::{debug, trace};

use crate::protocol::{
    CallToolResult, ClientInfo, InitializeParams, InitializeResult, JsonRpcError, JsonRpcMessage,
    JsonRpcRequest, JsonRpcResponse, ListToolsParams, ListToolsResult, ToolContent,
    PROTOCOL_VERSION,
};
use crate::wire::Wire;

/// Client side of one MCP session. One request is outstanding at a time.
pub struct McpSession<W> {
    wire: W,
    next_id: u64,
    server: Option<InitializeResult>,
}

impl<W: Wire> McpSession<W> {
    pub fn new(wire: W) -> Self {
        Self {
            wire,
            next_id: 1,
            server: None,
        }
    }

    /// Result of the handshake, once it completed
    pub fn server(&self) -> Option<&InitializeResult> {
        self.server.as_ref()
    }

    /// `initialize` followed by `notifications/initialized`
    pub async fn initialize(&mut self) -> Result<&InitializeResult, TransportError> {
        let params = InitializeParams {
            protocol_version: PROTOCOL_VERSION.to_string(),
            capabilities: json!({}),
            client_info: ClientInfo {
                name: "toolmux".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
        };
        let params = serde_json::to_value(params)
            .map_err(|e| TransportError::Handshake(e.to_string()))?;

        let result = self
            .request("initialize", Some(params))
            .await
            .map_err(|err| match err {
                TransportError::Io(_) | TransportError::Closed => err,
                other => TransportError::Handshake(other.to_string()),
            })?;
        let result: InitializeResult = serde_json::from_value(result)
            .map_err(|e| TransportError::Handshake(format!("invalid initialize result: {}", e)))?;

        if result.protocol_version != PROTOCOL_VERSION {
            debug!(
                requested = PROTOCOL_VERSION,
                negotiated = %result.protocol_version,
                "Server negotiated a different protocol version"
            );
        }

        self.notify("notifications/initialized", None).await?;
        Ok(self.server.insert(result))
    }

    /// Every tool the server offers, following pagination cursors
    pub async fn list_tools(&mut self) -> Result<Vec<RemoteTool>, TransportError> {
        let mut tools = Vec::new();
        let mut cursor: Option<String> = None;
        let mut seen = HashSet::new();

        loop {
            let params = ListToolsParams {
                cursor: cursor.clone(),
            };
            let params =
                serde_json::to_value(params).map_err(|e| TransportError::Protocol(e.to_string()))?;
            let result = self.request("tools/list", Some(params)).await?;
            let page: ListToolsResult = serde_json::from_value(result)
                .map_err(|e| TransportError::Protocol(format!("invalid tools/list result: {}", e)))?;

            tools.extend(page.tools.into_iter().map(RemoteTool::from));

            match page.next_cursor {
                Some(next) if !next.is_empty() => {
                    if !seen.insert(next.clone()) {
                        return Err(TransportError::Protocol(format!(
                            "tools/list cursor '{}' repeated",
                            next
                        )));
                    }
                    cursor = Some(next);
                }
                _ => break,
            }
        }

        Ok(tools)
    }

    /// `tools/call`, converted to a single structured value
    pub async fn call_tool(
        &mut self,
        name: &str,
        arguments: &Map<String, Value>,
    ) -> Result<Value, TransportError> {
        let params = json!({"name": name, "arguments": arguments});
        let result = self.request("tools/call", Some(params)).await?;
        let result: CallToolResult = serde_json::from_value(result)
            .map_err(|e| TransportError::Protocol(format!("invalid tools/call result: {}", e)))?;
        result_value(result)
    }

    pub async fn ping(&mut self) -> Result<(), TransportError> {
        self.request("ping", None).await.map(|_| ())
    }

    pub async fn close(&mut self) -> Result<(), TransportError> {
        self.wire.close().await
    }

    async fn notify(&mut self, method: &str, params: Option<Value>) -> Result<(), TransportError> {
        self.write(&JsonRpcRequest::notification(method, params))
            .await
    }

    async fn request(&mut self, method: &str, params: Option<Value>) -> Result<Value, TransportError> {
        let id = self.next_id;
        self.next_id += 1;
        self.write(&JsonRpcRequest::new(id, method, params)).await?;

        let expected = json!(id);
        loop {
            let line = self.wire.recv().await?.ok_or(TransportError::Closed)?;

            let message: JsonRpcMessage = match serde_json::from_str(&line) {
                Ok(message) => message,
                Err(_) => {
                    // Servers sometimes leak log output onto the protocol stream
                    debug!(line = %preview(&line), "Skipping non-JSON-RPC line");
                    continue;
                }
            };

            match message {
                JsonRpcMessage::Request(request) => self.answer(request).await?,
                JsonRpcMessage::Response(response) if response.id != expected => {
                    debug!(id = %response.id, expected = id, "Skipping response to another request");
                }
                JsonRpcMessage::Response(response) => {
                    return match response.error {
                        Some(error) => Err(rpc_error(error)),
                        None => Ok(response.result.unwrap_or(Value::Null)),
                    }
                }
            }
        }
    }

    /// Requests the server sends us while we wait for a response
    async fn answer(&mut self, request: JsonRpcRequest) -> Result<(), TransportError> {
        let Some(id) = request.id else {
            trace!(method = %request.method, "Ignoring server notification");
            return Ok(());
        };

        let response = match request.method.as_str() {
            "ping" => JsonRpcResponse::success(id, json!({})),
            other => JsonRpcResponse::error(id, JsonRpcError::method_not_found(other)),
        };
        self.write(&response).await
    }

    async fn write<T: serde::Serialize>(&mut self, message: &T) -> Result<(), TransportError> {
        let line =
            serde_json::to_string(message).map_err(|e| TransportError::Protocol(e.to_string()))?;
        self.wire.send(line).await
    }
}

fn rpc_error(error: JsonRpcError) -> TransportError {
    if error.code == JsonRpcError::INVALID_PARAMS {
        TransportError::Rejected(error.message)
    } else {
        TransportError::Remote {
            code: Some(error.code),
            message: error.message,
        }
    }
}

/// Collapse a `tools/call` result into one value
pub fn result_value(result: CallToolResult) -> Result<Value, TransportError> {
    if result.is_error() {
        let text = result.joined_text();
        return Err(TransportError::Remote {
            code: None,
            message: if text.is_empty() {
                "tool reported an error".to_string()
            } else {
                text
            },
        });
    }

    if let Some(structured) = result.structured_content {
        return Ok(structured);
    }

    let mut values: Vec<Value> = result.content.into_iter().map(content_value).collect();
    Ok(match values.len() {
        0 => Value::Null,
        1 => values.remove(0),
        _ => Value::Array(values),
    })
}

fn content_value(content: ToolContent) -> Value {
    match content {
        ToolContent::Text { text } => match serde_json::from_str::<Value>(&text) {
            Ok(value @ (Value::Object(_) | Value::Array(_))) => value,
            _ => Value::String(text),
        },
        other => serde_json::to_value(other).unwrap_or(Value::Null),
    }
}

fn preview(line: &str) -> &str {
    let mut end = line.len().min(200);
    while !line.is_char_boundary(end) {
        end -= 1;
    }
    &line[..end]
}
