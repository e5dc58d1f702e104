//! # Toolmux SDK
//!
//! Rust client for the Toolmux gateway HTTP API.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use serde_json::json;
//! use toolmux_sdk::{ToolmuxClient, ToolmuxResult};
//!
//! #[tokio::main]
//! async fn main() -> ToolmuxResult<()> {
//!     let client = ToolmuxClient::builder()
//!         .base_url("http://127.0.0.1:8001")
//!         .build()?;
//!
//!     let health = client.health().check().await?;
//!     println!("Gateway is {} with {} tools", health.gateway_state, health.tools);
//!
//!     let output = client
//!         .tools()
//!         .invoke("reverse", json!({"text": "hello"}))
//!         .await?;
//!     println!("{}", output.result);
//!
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod client;
pub mod config;
pub mod error;
pub mod transport;

// Re-export main client
pub use client::{ToolmuxClient, ToolmuxClientBuilder};
pub use config::{ClientConfig, RetryConfig};
pub use error::{ToolmuxError, ToolmuxResult};

pub use api::health::HealthCheck;
pub use api::tools::{ToolOutput, ToolSummary};

// Re-export core types for convenience
pub use toolmux_core::{
    BackendFailure, BackendName, BackendStatus, ConnectionState, FailureStage, GatewayState,
    Schema, ShadowedTool, StartupReport, ToolDescriptor, TransportKind,
};
