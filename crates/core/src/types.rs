use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::path::PathBuf;

use crate::schema::{Schema, SchemaSource};

/// Unique name of a configured backend
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BackendName(pub String);

impl BackendName {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for BackendName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for BackendName {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

/// Parameters for spawning a subprocess backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StdioSpec {
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    /// Environment overrides applied on top of the gateway's own environment
    #[serde(default)]
    pub env: HashMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cwd: Option<PathBuf>,
}

impl StdioSpec {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            args: Vec::new(),
            env: HashMap::new(),
            cwd: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }
}

/// Parameters for reaching an already-running backend over a WebSocket
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebSocketSpec {
    pub endpoint: String,
}

/// How a backend is reached
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "transport", rename_all = "snake_case")]
pub enum TransportSpec {
    Stdio(StdioSpec),
    Websocket(WebSocketSpec),
}

impl TransportSpec {
    pub fn kind(&self) -> TransportKind {
        match self {
            Self::Stdio(_) => TransportKind::Stdio,
            Self::Websocket(_) => TransportKind::Websocket,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportKind {
    Stdio,
    Websocket,
    /// In-process transports (test doubles, embedded backends)
    Local,
}

impl std::fmt::Display for TransportKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Stdio => "stdio",
            Self::Websocket => "websocket",
            Self::Local => "local",
        };
        f.write_str(name)
    }
}

/// Optional timeout settings in seconds. Unset fields inherit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeoutConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub list: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invoke: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop: Option<u64>,
}

/// Static description of one backend. Immutable once loaded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendConfig {
    pub name: BackendName,
    #[serde(flatten)]
    pub transport: TransportSpec,
    #[serde(default)]
    pub timeouts: TimeoutConfig,
}

impl BackendConfig {
    pub fn stdio(name: impl Into<String>, spec: StdioSpec) -> Self {
        Self {
            name: BackendName::new(name),
            transport: TransportSpec::Stdio(spec),
            timeouts: TimeoutConfig::default(),
        }
    }

    pub fn websocket(name: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self {
            name: BackendName::new(name),
            transport: TransportSpec::Websocket(WebSocketSpec {
                endpoint: endpoint.into(),
            }),
            timeouts: TimeoutConfig::default(),
        }
    }
}

/// A tool definition as reported by a backend, before schema normalization
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteTool {
    pub name: String,
    pub description: Option<String>,
    pub input_schema: SchemaSource,
    pub output_schema: SchemaSource,
}

impl RemoteTool {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            input_schema: SchemaSource::Missing,
            output_schema: SchemaSource::Missing,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_input_schema(mut self, schema: SchemaSource) -> Self {
        self.input_schema = schema;
        self
    }

    pub fn with_output_schema(mut self, schema: SchemaSource) -> Self {
        self.output_schema = schema;
        self
    }
}

/// A tool in the aggregated catalog
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    pub input_schema: Schema,
    pub output_schema: Schema,
    /// Backend that owns the tool
    pub backend: BackendName,
}

impl ToolDescriptor {
    /// Normalize a backend-reported tool. Never fails: unparseable schemas
    /// degrade to an opaque string.
    pub fn from_remote(backend: &BackendName, tool: RemoteTool) -> Self {
        let input_schema = Schema::from_source(tool.input_schema, backend, &tool.name);
        let output_schema = Schema::from_source(tool.output_schema, backend, &tool.name);
        Self {
            name: tool.name,
            description: tool.description.unwrap_or_default(),
            input_schema,
            output_schema,
            backend: backend.clone(),
        }
    }
}

/// Lifecycle of a single backend connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Unstarted,
    Starting,
    Ready,
    Closing,
    Closed,
    Failed,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Unstarted => "unstarted",
            Self::Starting => "starting",
            Self::Ready => "ready",
            Self::Closing => "closing",
            Self::Closed => "closed",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Lifecycle of the gateway as a whole
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GatewayState {
    Initializing,
    StartingBackends,
    Ready,
    ShuttingDown,
    Stopped,
}

impl std::fmt::Display for GatewayState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Initializing => "initializing",
            Self::StartingBackends => "starting_backends",
            Self::Ready => "ready",
            Self::ShuttingDown => "shutting_down",
            Self::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// Point-in-time view of a connection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionStatus {
    pub state: ConnectionState,
    pub since: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl ConnectionStatus {
    pub fn new(state: ConnectionState) -> Self {
        Self {
            state,
            since: Utc::now(),
            last_error: None,
        }
    }
}

/// Per-backend diagnostics exposed by the gateway
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendStatus {
    pub name: BackendName,
    pub transport: TransportKind,
    pub state: ConnectionState,
    pub since: DateTime<Utc>,
    /// Number of catalog entries this backend currently owns
    pub tools: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

/// A request to run one tool
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvocationRequest {
    pub tool_name: String,
    #[serde(default)]
    pub parameters: Map<String, Value>,
}

impl InvocationRequest {
    pub fn new(tool_name: impl Into<String>, parameters: Map<String, Value>) -> Self {
        Self {
            tool_name: tool_name.into(),
            parameters,
        }
    }
}

/// Successful outcome of a tool invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvocationResult {
    pub tool_name: String,
    pub backend: BackendName,
    pub output: Value,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_backend_config_flattens_transport() {
        let config: BackendConfig = serde_json::from_value(json!({
            "name": "local",
            "transport": "stdio",
            "command": "python",
            "args": ["src/mcp_server.py"],
            "env": {"FIGMA_API_KEY": "secret"}
        }))
        .unwrap();

        assert_eq!(config.name, BackendName::new("local"));
        match config.transport {
            TransportSpec::Stdio(spec) => {
                assert_eq!(spec.command, "python");
                assert_eq!(spec.args, vec!["src/mcp_server.py"]);
                assert_eq!(spec.env.get("FIGMA_API_KEY").map(String::as_str), Some("secret"));
                assert!(spec.cwd.is_none());
            }
            other => panic!("expected stdio transport, got {:?}", other),
        }
        assert_eq!(config.timeouts, TimeoutConfig::default());
    }

    #[test]
    fn test_websocket_backend_config() {
        let config: BackendConfig = serde_json::from_value(json!({
            "name": "remote",
            "transport": "websocket",
            "endpoint": "ws://127.0.0.1:9100",
            "timeouts": {"invoke": 60}
        }))
        .unwrap();

        assert_eq!(config.transport.kind(), TransportKind::Websocket);
        assert_eq!(config.timeouts.invoke, Some(60));
        assert_eq!(config.timeouts.start, None);
    }

    #[test]
    fn test_descriptor_defaults_missing_description() {
        let backend = BackendName::new("a");
        let descriptor = ToolDescriptor::from_remote(&backend, RemoteTool::new("echo"));

        assert_eq!(descriptor.name, "echo");
        assert_eq!(descriptor.description, "");
        assert_eq!(descriptor.backend, backend);
        assert!(descriptor.input_schema.is_canonical());
    }

    #[test]
    fn test_state_display() {
        assert_eq!(ConnectionState::Ready.to_string(), "ready");
        assert_eq!(GatewayState::StartingBackends.to_string(), "starting_backends");
        assert_eq!(TransportKind::Websocket.to_string(), "websocket");
    }
}
