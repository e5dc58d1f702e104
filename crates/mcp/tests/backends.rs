// End-to-end tests against real subprocess and WebSocket backends

use serde_json::{json, Map, Value};
use std::sync::Arc;
use tokio::net::TcpListener;
use toolmux_core::{
    BackendConfig, BackendName, ConnectError, Connection, ConnectionState, FailureKind, Gateway,
    GatewayConfig, GatewayState, InvokeError, StdioSpec, Timeouts,
};
use toolmux_mcp::tools::{demo_registry, ReverseTool, ToolRegistry};
use toolmux_mcp::{serve_websocket, transport_for, McpServer};

const DEMO_SERVER: &str = env!("CARGO_BIN_EXE_toolmux-demo-server");

fn demo_backend(name: &str, extra_args: &[&str]) -> BackendConfig {
    let mut spec = StdioSpec::new(DEMO_SERVER).env("RUST_LOG", "warn");
    for arg in extra_args {
        spec = spec.arg(*arg);
    }
    BackendConfig::stdio(name, spec)
}

fn connection(config: BackendConfig) -> Connection {
    let timeouts = Timeouts::default();
    let transport = transport_for(&config, &timeouts);
    Connection::new(config, timeouts, transport)
}

fn args(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => panic!("expected object"),
    }
}

async fn websocket_backend(registry: ToolRegistry) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(serve_websocket(Arc::new(McpServer::new(registry)), listener));
    format!("ws://{}", addr)
}

#[tokio::test]
async fn test_subprocess_backend_lifecycle() {
    let conn = connection(demo_backend("local", &[]));
    conn.start().await.unwrap();
    assert_eq!(conn.state(), ConnectionState::Ready);

    let names: Vec<_> = conn
        .list_tools()
        .await
        .unwrap()
        .into_iter()
        .map(|t| t.name)
        .collect();
    assert_eq!(names, vec!["data_query", "echo", "reverse", "text_analysis"]);

    let echoed = conn.invoke("echo", &args(json!({"text": "hi"}))).await.unwrap();
    assert_eq!(echoed, json!("hi"));

    let analysis = conn
        .invoke(
            "text_analysis",
            &args(json!({"text": "love it", "operation": "summary"})),
        )
        .await
        .unwrap();
    assert_eq!(analysis, json!("Summary placeholder"));

    let data = conn
        .invoke("data_query", &args(json!({"query": "q", "source": "db"})))
        .await
        .unwrap();
    assert_eq!(
        data,
        json!({
            "result": {"product": "MacBook", "comments": "Product is exceeded our expectation"},
            "source": "db"
        })
    );

    let invalid = conn.invoke("echo", &Map::new()).await.unwrap_err();
    assert!(matches!(invalid, InvokeError::Validation(_)));

    conn.stop().await.unwrap();
    assert_eq!(conn.state(), ConnectionState::Closed);
    conn.stop().await.unwrap();
}

#[tokio::test]
async fn test_paginated_subprocess_listing() {
    let conn = connection(demo_backend("paged", &["--page-size", "1"]));
    conn.start().await.unwrap();
    assert_eq!(conn.list_tools().await.unwrap().len(), 4);
    conn.stop().await.unwrap();
}

#[tokio::test]
async fn test_missing_executable_is_unreachable() {
    let conn = connection(BackendConfig::stdio(
        "ghost",
        StdioSpec::new("/nonexistent/toolmux-backend"),
    ));
    let err = conn.start().await.unwrap_err();
    assert!(matches!(err, ConnectError::Unreachable(_)));
    assert_eq!(conn.state(), ConnectionState::Failed);
}

#[tokio::test]
async fn test_gateway_over_mixed_transports() {
    let mut remote_registry = ToolRegistry::new();
    remote_registry.register(Arc::new(ReverseTool));
    let endpoint = websocket_backend(remote_registry).await;

    let config = GatewayConfig {
        backends: vec![
            demo_backend("local", &["--only", "echo,text_analysis"]),
            BackendConfig::websocket("remote", endpoint),
            BackendConfig::stdio("broken", StdioSpec::new("/nonexistent/toolmux-backend")),
        ],
        ..Default::default()
    };
    config.validate().unwrap();

    let gateway = Gateway::from_config(&config, transport_for).unwrap();
    let report = gateway.start().await.unwrap();
    assert_eq!(gateway.state(), GatewayState::Ready);
    assert_eq!(
        report.ready,
        vec![BackendName::new("local"), BackendName::new("remote")]
    );
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].backend, BackendName::new("broken"));

    let names: Vec<_> = gateway
        .list_tools()
        .await
        .into_iter()
        .map(|t| t.name)
        .collect();
    assert_eq!(names, vec!["echo", "reverse", "text_analysis"]);

    let reverse = gateway.get_tool("reverse").await.unwrap();
    assert_eq!(reverse.backend, BackendName::new("remote"));

    assert_eq!(
        gateway
            .invoke_tool("echo", &args(json!({"text": "hi"})))
            .await
            .unwrap(),
        json!("hi")
    );
    assert_eq!(
        gateway
            .invoke_tool("reverse", &args(json!({"text": "hi"})))
            .await
            .unwrap(),
        json!("ih")
    );
    let missing = gateway.invoke_tool("missing", &Map::new()).await.unwrap_err();
    assert_eq!(missing.kind(), FailureKind::NotFound);

    assert_eq!(gateway.shutdown().await, GatewayState::Stopped);
    assert_eq!(gateway.shutdown().await, GatewayState::Stopped);
}

#[tokio::test]
async fn test_demo_registry_over_websocket_gateway() {
    let endpoint = websocket_backend(demo_registry()).await;
    let config = GatewayConfig {
        backends: vec![BackendConfig::websocket("remote", endpoint)],
        ..Default::default()
    };

    let gateway = Gateway::from_config(&config, transport_for).unwrap();
    let report = gateway.start().await.unwrap();
    assert_eq!(report.tool_count, 4);

    let statuses = gateway.backend_statuses().await;
    assert_eq!(statuses[0].tools, 4);
    assert_eq!(statuses[0].state, ConnectionState::Ready);

    gateway.shutdown().await;
    assert_eq!(
        gateway.backend_statuses().await[0].state,
        ConnectionState::Closed
    );
}
