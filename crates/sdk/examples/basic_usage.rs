//! Basic SDK usage example.
//!
//! Connects to a running gateway, prints backend health, lists the catalog
//! and invokes one tool.
//!
//! Run with: cargo run --example basic_usage

use serde_json::json;
use std::time::Duration;
use toolmux_sdk::{ToolmuxClient, ToolmuxError, ToolmuxResult};

#[tokio::main]
async fn main() -> ToolmuxResult<()> {
    // Initialize tracing for debug output
    tracing_subscriber::fmt::init();

    let client = ToolmuxClient::builder()
        .base_url("http://127.0.0.1:8001")
        .timeout(Duration::from_secs(60))
        .build()?;

    let health = client.health().check().await?;
    println!(
        "{} {} is {} with {} tools",
        health.service, health.version, health.gateway_state, health.tools
    );

    println!("\nBackends:");
    for backend in client.health().backends().await? {
        println!(
            "  {} ({:?}): {} tools, {}",
            backend.name,
            backend.transport,
            backend.tools,
            backend.state
        );
        if let Some(error) = backend.last_error {
            println!("    last error: {}", error);
        }
    }

    println!("\nTools:");
    match client.tools().list().await {
        Ok(tools) => {
            for tool in &tools {
                println!("  {}: {}", tool.name, tool.description);
            }
        }
        Err(ToolmuxError::Unavailable { message, .. }) => {
            println!("  none available ({})", message);
            return Ok(());
        }
        Err(err) => return Err(err),
    }

    let output = client
        .tools()
        .invoke("reverse", json!({"text": "hello, toolmux"}))
        .await?;
    println!("\n{} -> {}", output.tool_name, output.result);

    Ok(())
}
