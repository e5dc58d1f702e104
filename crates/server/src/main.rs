use anyhow::Result;
use clap::Parser;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;
use toolmux_core::Gateway;

mod api;
mod config;

use config::{AppState, ServerConfig};

#[derive(Parser, Debug)]
#[command(name = "toolmux")]
#[command(about = "Aggregates MCP tool servers behind one HTTP API", long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "toolmux.toml")]
    config: PathBuf,

    /// Port to listen on (overrides the config file)
    #[arg(short, long)]
    port: Option<u16>,

    /// Host to bind to (overrides the config file)
    #[arg(long)]
    host: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "toolmux=info,tower_http=debug".into()),
        )
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .init();

    let args = Args::parse();

    tracing::info!("Starting Toolmux gateway");

    // Load configuration
    let mut config = ServerConfig::load(&args.config)?;
    if let Some(host) = args.host {
        config.http.host = host;
    }
    if let Some(port) = args.port {
        config.http.port = port;
    }

    let gateway = Arc::new(Gateway::from_config(
        &config.gateway,
        toolmux_mcp::transport_for,
    )?);

    run(gateway, &config.http.addr(), shutdown_signal()).await
}

/// Start the backends, then serve the API until `shutdown` resolves. The
/// backends are stopped on every path out, including a shutdown requested
/// while they are still starting.
async fn run<F>(gateway: Arc<Gateway>, addr: &str, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let (stop_tx, mut stop_rx) = watch::channel(false);
    tokio::spawn(async move {
        shutdown.await;
        let _ = stop_tx.send(true);
    });

    let started = tokio::select! {
        report = gateway.start() => Some(report),
        _ = stop_rx.changed() => None,
    };

    let report = match started {
        Some(Ok(report)) => report,
        Some(Err(err)) => {
            gateway.shutdown().await;
            return Err(err.into());
        }
        None => {
            tracing::info!("Shutdown requested while backends were starting");
            gateway.shutdown().await;
            return Ok(());
        }
    };
    tracing::info!(
        ready = report.ready.len(),
        failed = report.failed.len(),
        tools = report.tool_count,
        "Gateway ready"
    );

    // Start API server
    tracing::info!("Starting API server on {}", addr);

    let stopped = async move {
        let _ = stop_rx.changed().await;
    };
    let served = api::serve(addr, AppState::new(gateway.clone()), stopped).await;

    // Backends are stopped even when the listener failed
    gateway.shutdown().await;

    served
}

/// Resolves on Ctrl+C, or SIGTERM on unix
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received Ctrl+C, shutting down"),
        _ = terminate => tracing::info!("Received SIGTERM, shutting down"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::Ordering;
    use std::time::Duration;
    use tokio::sync::oneshot;
    use toolmux_core::testing::ScriptedTransport;
    use toolmux_core::{BackendConfig, Connection, GatewayState, StdioSpec, Timeouts};

    fn gateway(name: &str, transport: ScriptedTransport) -> Arc<Gateway> {
        let connection = Connection::new(
            BackendConfig::stdio(name, StdioSpec::new("unused")),
            Timeouts::default(),
            Box::new(transport),
        );
        Arc::new(Gateway::new(vec![connection]).unwrap())
    }

    #[tokio::test]
    async fn test_signal_while_backends_start_stops_gateway() {
        let transport = ScriptedTransport::new("stuck").hang_open();
        let closes = transport.close_count();
        let gateway = gateway("stuck", transport);

        let (signal, signalled) = oneshot::channel::<()>();
        let running = tokio::spawn(run(gateway.clone(), "127.0.0.1:0", async move {
            let _ = signalled.await;
        }));

        let mut states = gateway.subscribe();
        states
            .wait_for(|state| *state == GatewayState::StartingBackends)
            .await
            .unwrap();
        signal.send(()).unwrap();

        let outcome = tokio::time::timeout(Duration::from_secs(5), running)
            .await
            .unwrap()
            .unwrap();
        assert!(outcome.is_ok());
        assert_eq!(gateway.state(), GatewayState::Stopped);
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_signal_after_ready_stops_server_and_gateway() {
        let gateway = gateway("echo", ScriptedTransport::echo("echo"));

        let (signal, signalled) = oneshot::channel::<()>();
        let running = tokio::spawn(run(gateway.clone(), "127.0.0.1:0", async move {
            let _ = signalled.await;
        }));

        let mut states = gateway.subscribe();
        states
            .wait_for(|state| *state == GatewayState::Ready)
            .await
            .unwrap();
        signal.send(()).unwrap();

        let outcome = tokio::time::timeout(Duration::from_secs(5), running)
            .await
            .unwrap()
            .unwrap();
        assert!(outcome.is_ok());
        assert_eq!(gateway.state(), GatewayState::Stopped);
    }
}
