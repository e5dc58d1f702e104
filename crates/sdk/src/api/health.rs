//! Health API endpoints.

use crate::client::ToolmuxClient;
use crate::error::ToolmuxResult;
use serde::{Deserialize, Serialize};
use toolmux_core::{BackendStatus, GatewayState};

/// Health API for checking gateway and backend status.
pub struct HealthApi<'a> {
    client: &'a ToolmuxClient,
}

impl<'a> HealthApi<'a> {
    pub(crate) fn new(client: &'a ToolmuxClient) -> Self {
        Self { client }
    }

    /// Check basic health status.
    pub async fn check(&self) -> ToolmuxResult<HealthCheck> {
        self.client.http.get(&["api", "health"]).await
    }

    /// Status of every configured backend, in registration order.
    pub async fn backends(&self) -> ToolmuxResult<Vec<BackendStatus>> {
        self.client.http.get(&["api", "backends"]).await
    }
}

/// Basic health check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheck {
    pub status: String,
    pub service: String,
    pub version: String,
    pub gateway_state: GatewayState,
    pub tools: usize,
}
