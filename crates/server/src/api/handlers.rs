use super::{ApiError, ApiResult};
use crate::config::AppState;
use axum::{
    body::Bytes,
    extract::{Path, State},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use toolmux_core::{BackendStatus, InvokeFailure, Schema, StartupReport, ToolDescriptor};

/// Status of every configured backend
pub async fn list_backends(State(state): State<Arc<AppState>>) -> Json<Vec<BackendStatus>> {
    Json(state.gateway.backend_statuses().await)
}

/// Tool as listed by `GET /tools`
#[derive(Debug, Serialize, Deserialize)]
pub struct ToolSummary {
    pub name: String,
    pub description: String,
    pub input_schema: Schema,
    pub output_schema: Schema,
}

impl From<ToolDescriptor> for ToolSummary {
    fn from(tool: ToolDescriptor) -> Self {
        Self {
            name: tool.name,
            description: tool.description,
            input_schema: tool.input_schema,
            output_schema: tool.output_schema,
        }
    }
}

/// List the aggregated catalog
pub async fn list_tools(State(state): State<Arc<AppState>>) -> ApiResult<Json<Vec<ToolSummary>>> {
    let tools = state.gateway.list_tools().await;
    if tools.is_empty() {
        return Err(InvokeFailure::NoToolsAvailable.into());
    }
    Ok(Json(tools.into_iter().map(ToolSummary::from).collect()))
}

/// Get a single tool, including the backend that owns it
pub async fn get_tool(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> ApiResult<Json<ToolDescriptor>> {
    state
        .gateway
        .get_tool(&name)
        .await
        .map(Json)
        .ok_or_else(|| InvokeFailure::NotFound { tool: name }.into())
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct InvokeRequest {
    #[serde(default)]
    pub params: Map<String, Value>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct InvokeResponse {
    pub tool_name: String,
    pub result: Value,
}

/// Invoke a tool. An empty body is the same as `{"params": {}}`.
pub async fn invoke_tool(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    body: Bytes,
) -> ApiResult<Json<InvokeResponse>> {
    let request: InvokeRequest = if body.iter().all(u8::is_ascii_whitespace) {
        InvokeRequest::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| ApiError::BadRequest(format!("Invalid request body: {}", e)))?
    };

    let result = state.gateway.invoke_tool(&name, &request.params).await?;
    Ok(Json(InvokeResponse {
        tool_name: name,
        result,
    }))
}

/// Re-list every ready backend and rebuild the catalog
pub async fn refresh_tools(State(state): State<Arc<AppState>>) -> ApiResult<Json<StartupReport>> {
    let report = state.gateway.refresh_catalog().await?;
    tracing::info!(
        tools = report.tool_count,
        failed = report.failed.len(),
        "Catalog refreshed"
    );
    Ok(Json(report))
}
