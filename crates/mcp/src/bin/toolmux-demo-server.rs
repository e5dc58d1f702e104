// Reference MCP tool server, speaking over stdio or WebSocket

use anyhow::{Context, Result};
use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use toolmux_mcp::tools::demo_registry;
use toolmux_mcp::{serve_websocket, LineWire, McpServer};

#[derive(Parser, Debug)]
#[command(name = "toolmux-demo-server")]
#[command(about = "Reference MCP tool server for the toolmux gateway", long_about = None)]
struct Args {
    /// Serve over WebSocket on this address instead of stdio
    #[arg(long)]
    listen: Option<SocketAddr>,

    /// Only expose these tools (comma separated)
    #[arg(long, value_delimiter = ',')]
    only: Vec<String>,

    /// Maximum number of tools per tools/list page
    #[arg(long)]
    page_size: Option<usize>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // stdout carries the protocol, so logs go to stderr
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "toolmux=info".into()),
        )
        .with_target(false)
        .with_ansi(false)
        .init();

    let args = Args::parse();

    let mut registry = demo_registry();
    if !args.only.is_empty() {
        registry.retain(|name| args.only.iter().any(|wanted| wanted == name));
    }
    tracing::info!("Registered {} tools", registry.len());

    let mut server = McpServer::new(registry);
    if let Some(size) = args.page_size {
        server = server.with_page_size(size);
    }

    match args.listen {
        Some(addr) => {
            let listener = TcpListener::bind(addr)
                .await
                .with_context(|| format!("Failed to bind {}", addr))?;
            serve_websocket(Arc::new(server), listener).await?;
        }
        None => {
            server
                .serve(LineWire::new(tokio::io::stdin(), tokio::io::stdout()))
                .await?;
        }
    }

    Ok(())
}
