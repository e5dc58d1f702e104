//! Tools API endpoints.

use crate::client::ToolmuxClient;
use crate::error::{ToolmuxError, ToolmuxResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use toolmux_core::{Schema, StartupReport, ToolDescriptor};

/// Tools API for discovering and invoking aggregated tools.
pub struct ToolsApi<'a> {
    client: &'a ToolmuxClient,
}

impl<'a> ToolsApi<'a> {
    pub(crate) fn new(client: &'a ToolmuxClient) -> Self {
        Self { client }
    }

    /// List every tool in the catalog, ordered by name.
    pub async fn list(&self) -> ToolmuxResult<Vec<ToolSummary>> {
        self.client.http.get(&["tools"]).await
    }

    /// Get a tool by name, including the backend that owns it.
    pub async fn get(&self, name: &str) -> ToolmuxResult<ToolDescriptor> {
        self.client.http.get(&["tools", name]).await
    }

    /// Invoke a tool. `params` must be a JSON object (or null for none).
    /// Invocations are sent exactly once.
    pub async fn invoke(&self, name: &str, params: Value) -> ToolmuxResult<ToolOutput> {
        let params = match params {
            Value::Null => Value::Object(Default::default()),
            Value::Object(map) => Value::Object(map),
            other => {
                return Err(ToolmuxError::InvalidInput {
                    message: format!("params must be a JSON object, got {}", other),
                    details: None,
                })
            }
        };

        self.client
            .http
            .post(&["tools", name, "invoke"], &InvokeRequest { params })
            .await
    }

    /// Ask the gateway to re-list every ready backend.
    pub async fn refresh(&self) -> ToolmuxResult<StartupReport> {
        self.client
            .http
            .post(&["api", "tools", "refresh"], &serde_json::json!({}))
            .await
    }
}

/// Catalog entry as returned by `GET /tools`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSummary {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub input_schema: Schema,
    #[serde(default)]
    pub output_schema: Schema,
}

/// Result of a successful invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolOutput {
    pub tool_name: String,
    pub result: Value,
}

#[derive(Debug, Serialize)]
struct InvokeRequest {
    params: Value,
}
