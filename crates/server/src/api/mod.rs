use crate::config::AppState;
use anyhow::Result;
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use toolmux_core::{GatewayError, InvokeFailure};
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};

mod handlers;

/// Start the API server and run until `shutdown` resolves
pub async fn serve<F>(addr: &str, state: AppState, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("API server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    Ok(())
}

/// Create the API router
fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(health_check))
        .route("/api/backends", get(handlers::list_backends))
        .route("/api/tools/refresh", post(handlers::refresh_tools))
        .route("/tools", get(handlers::list_tools))
        .route("/tools/{name}", get(handlers::get_tool))
        .route("/tools/{name}/invoke", post(handlers::invoke_tool))
        // Middleware
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().include_headers(true))
                .on_response(DefaultOnResponse::new().include_headers(true)),
        )
        .layer(CorsLayer::permissive())
        .with_state(Arc::new(state))
}

/// Health check endpoint
async fn health_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "toolmux",
        "version": env!("CARGO_PKG_VERSION"),
        "gateway_state": state.gateway.state(),
        "tools": state.gateway.catalog().await.len(),
    }))
}

/// API error response
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

/// Custom error type for API handlers
#[derive(Debug)]
pub enum ApiError {
    Invoke(InvokeFailure),
    Gateway(GatewayError),
    BadRequest(String),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            Self::Invoke(failure) => match failure {
                InvokeFailure::Validation { .. } => StatusCode::BAD_REQUEST,
                InvokeFailure::NotFound { .. } => StatusCode::NOT_FOUND,
                InvokeFailure::BackendUnavailable { .. }
                | InvokeFailure::NoToolsAvailable
                | InvokeFailure::NotReady { .. } => StatusCode::SERVICE_UNAVAILABLE,
                InvokeFailure::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
                InvokeFailure::Unknown { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Self::Gateway(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
        }
    }

    fn body(&self) -> ErrorResponse {
        match self {
            Self::Invoke(failure) => {
                let response = ErrorResponse::new(failure.kind().as_str(), failure.to_string());
                match failure {
                    InvokeFailure::Validation { message, .. }
                    | InvokeFailure::BackendUnavailable { message, .. }
                    | InvokeFailure::Unknown { message, .. } => response.with_details(message),
                    InvokeFailure::Timeout { timeout_ms, .. } => {
                        response.with_details(format!("timeout_ms={}", timeout_ms))
                    }
                    _ => response,
                }
            }
            Self::Gateway(err) => ErrorResponse::new("not_ready", err.to_string()),
            Self::BadRequest(message) => ErrorResponse::new("bad_request", message.clone()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), Json(self.body())).into_response()
    }
}

impl From<InvokeFailure> for ApiError {
    fn from(failure: InvokeFailure) -> Self {
        Self::Invoke(failure)
    }
}

impl From<GatewayError> for ApiError {
    fn from(err: GatewayError) -> Self {
        Self::Gateway(err)
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{Method, Request};
    use serde_json::{json, Value};
    use std::time::Duration;
    use toolmux_core::testing::ScriptedTransport;
    use toolmux_core::{BackendConfig, Connection, Gateway, StdioSpec, Timeouts, TransportError};
    use tower::ServiceExt;

    fn connection(name: &str, transport: ScriptedTransport, timeouts: Timeouts) -> Connection {
        Connection::new(
            BackendConfig::stdio(name, StdioSpec::new("unused")),
            timeouts,
            Box::new(transport),
        )
    }

    async fn started(connections: Vec<Connection>) -> Arc<Gateway> {
        let gateway = Arc::new(Gateway::new(connections).unwrap());
        gateway.start().await.unwrap();
        gateway
    }

    async fn echo_reverse() -> Arc<Gateway> {
        started(vec![
            connection("a", ScriptedTransport::echo("a"), Timeouts::default()),
            connection("b", ScriptedTransport::reverse("b"), Timeouts::default()),
        ])
        .await
    }

    async fn send(
        gateway: Arc<Gateway>,
        method: Method,
        uri: &str,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let app = create_router(AppState::new(gateway));
        let body = match body {
            Some(body) => Body::from(body.to_string()),
            None => Body::empty(),
        };
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(body)
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    #[tokio::test]
    async fn test_health_check() {
        let (status, body) = send(echo_reverse().await, Method::GET, "/api/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], json!("ok"));
        assert_eq!(body["service"], json!("toolmux"));
        assert_eq!(body["gateway_state"], json!("ready"));
        assert_eq!(body["tools"], json!(2));
    }

    #[tokio::test]
    async fn test_list_and_get_tools() {
        let gateway = echo_reverse().await;

        let (status, body) = send(gateway.clone(), Method::GET, "/tools", None).await;
        assert_eq!(status, StatusCode::OK);
        let names: Vec<_> = body
            .as_array()
            .unwrap()
            .iter()
            .map(|tool| tool["name"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(names, vec!["echo", "reverse"]);
        assert_eq!(body[0]["input_schema"]["required"], json!(["text"]));
        assert!(body[0].get("backend").is_none());

        let (status, body) = send(gateway.clone(), Method::GET, "/tools/reverse", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["backend"], json!("b"));

        let (status, body) = send(gateway, Method::GET, "/tools/missing", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], json!("not_found"));
    }

    #[tokio::test]
    async fn test_empty_catalog_is_unavailable() {
        let gateway = started(vec![connection(
            "down",
            ScriptedTransport::echo("down").fail_open(TransportError::Spawn("no such file".into())),
            Timeouts::default(),
        )])
        .await;

        let (status, body) = send(gateway.clone(), Method::GET, "/tools", None).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["error"], json!("no_tools_available"));

        let (status, body) = send(
            gateway.clone(),
            Method::POST,
            "/tools/echo/invoke",
            Some(json!({"params": {"text": "hi"}})),
        )
        .await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["error"], json!("no_tools_available"));

        let (status, body) = send(gateway, Method::GET, "/api/backends", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body[0]["state"], json!("failed"));
        assert!(body[0]["last_error"].as_str().unwrap().contains("no such file"));
    }

    #[tokio::test]
    async fn test_invoke_routes_to_owner() {
        let (status, body) = send(
            echo_reverse().await,
            Method::POST,
            "/tools/reverse/invoke",
            Some(json!({"params": {"text": "abc"}})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"tool_name": "reverse", "result": "cba"}));
    }

    #[tokio::test]
    async fn test_invoke_failure_statuses() {
        let gateway = echo_reverse().await;

        // Missing params become {} and the backend rejects them
        let (status, body) = send(gateway.clone(), Method::POST, "/tools/echo/invoke", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], json!("validation_error"));
        assert_eq!(body["details"], json!("missing required argument 'text'"));

        let (status, body) = send(
            gateway.clone(),
            Method::POST,
            "/tools/nope/invoke",
            Some(json!({"params": {}})),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], json!("not_found"));

        let (status, body) = send(
            gateway,
            Method::POST,
            "/tools/echo/invoke",
            Some(json!({"params": "not an object"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], json!("bad_request"));
    }

    #[tokio::test]
    async fn test_invoke_timeout_is_gateway_timeout() {
        let timeouts = Timeouts {
            invoke: Duration::from_millis(50),
            ..Timeouts::default()
        };
        let gateway = started(vec![connection(
            "slow",
            ScriptedTransport::echo("slow").hang_calls(),
            timeouts,
        )])
        .await;

        let (status, body) = send(
            gateway,
            Method::POST,
            "/tools/echo/invoke",
            Some(json!({"params": {"text": "hi"}})),
        )
        .await;
        assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(body["error"], json!("timeout"));
    }

    #[tokio::test]
    async fn test_tool_names_do_not_collide_with_routes() {
        let gateway = started(vec![connection(
            "ops",
            ScriptedTransport::new("ops").with_tool("refresh"),
            Timeouts::default(),
        )])
        .await;

        let (status, body) = send(gateway.clone(), Method::GET, "/tools/refresh", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["name"], json!("refresh"));
        assert_eq!(body["backend"], json!("ops"));

        let (status, body) = send(
            gateway,
            Method::POST,
            "/tools/refresh/invoke",
            Some(json!({"params": {"text": "now"}})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["tool_name"], json!("refresh"));
    }

    #[tokio::test]
    async fn test_refresh_and_shutdown() {
        let gateway = echo_reverse().await;

        let (status, body) = send(gateway.clone(), Method::POST, "/api/tools/refresh", None)
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["tool_count"], json!(2));
        assert_eq!(body["ready"], json!(["a", "b"]));

        gateway.shutdown().await;

        let (status, body) = send(gateway.clone(), Method::POST, "/api/tools/refresh", None)
            .await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["error"], json!("not_ready"));

        let (status, body) = send(
            gateway,
            Method::POST,
            "/tools/echo/invoke",
            Some(json!({"params": {"text": "hi"}})),
        )
        .await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["error"], json!("not_ready"));
    }
}
