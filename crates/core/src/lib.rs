// Core types and functionality for the Toolmux tool gateway

pub mod types;
pub mod error;
pub mod schema;
pub mod transport;
pub mod connection;
pub mod catalog;
pub mod gateway;
pub mod config;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use types::*;
pub use error::*;
pub use schema::{ParameterSpec, Schema, SchemaError, SchemaSource};
pub use transport::Transport;
pub use connection::Connection;
pub use catalog::{Catalog, ShadowedTool};
pub use gateway::{BackendFailure, FailureStage, Gateway, StartupReport};
pub use config::{GatewayConfig, Timeouts};
