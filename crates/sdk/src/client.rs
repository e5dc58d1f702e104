//! Main client for the Toolmux SDK.

use crate::api::*;
use crate::config::{ClientConfig, RetryConfig};
use crate::error::{ToolmuxError, ToolmuxResult};
use crate::transport::HttpTransport;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// Main client for interacting with the Toolmux gateway.
#[derive(Clone)]
pub struct ToolmuxClient {
    config: Arc<ClientConfig>,
    pub(crate) http: HttpTransport,
}

impl ToolmuxClient {
    /// Create a new client builder.
    pub fn builder() -> ToolmuxClientBuilder {
        ToolmuxClientBuilder::new()
    }

    fn from_config(config: ClientConfig) -> ToolmuxResult<Self> {
        let config = Arc::new(config);
        let http = HttpTransport::new(config.clone())?;

        Ok(Self { config, http })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Get the health API.
    pub fn health(&self) -> HealthApi<'_> {
        HealthApi::new(self)
    }

    /// Get the tools API.
    pub fn tools(&self) -> ToolsApi<'_> {
        ToolsApi::new(self)
    }
}

/// Builder for creating a ToolmuxClient.
pub struct ToolmuxClientBuilder {
    base_url: Option<String>,
    timeout: Duration,
    retry_config: RetryConfig,
}

impl ToolmuxClientBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self {
            base_url: None,
            timeout: Duration::from_secs(60),
            retry_config: RetryConfig::default(),
        }
    }

    /// Set the base URL of the gateway.
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Set the request timeout. Keep it above the gateway's invoke timeout
    /// to see its 504 rather than a client-side timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the retry configuration.
    pub fn retry_config(mut self, config: RetryConfig) -> Self {
        self.retry_config = config;
        self
    }

    /// Build the client.
    pub fn build(self) -> ToolmuxResult<ToolmuxClient> {
        let base_url_str = self
            .base_url
            .ok_or_else(|| ToolmuxError::Config("base_url is required".to_string()))?;

        let base_url = Url::parse(&base_url_str)?;

        let config = ClientConfig {
            base_url,
            timeout: self.timeout,
            retry_config: self.retry_config,
        };

        ToolmuxClient::from_config(config)
    }
}

impl Default for ToolmuxClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use toolmux_core::{ConnectionState, GatewayState};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_builder_requires_base_url() {
        let result = ToolmuxClient::builder().build();
        assert!(matches!(result, Err(ToolmuxError::Config(_))));
    }

    #[test]
    fn test_builder_rejects_invalid_url() {
        let result = ToolmuxClient::builder().base_url("not a url").build();
        assert!(matches!(result, Err(ToolmuxError::InvalidUrl(_))));
    }

    #[test]
    fn test_builder_settings() {
        let client = ToolmuxClient::builder()
            .base_url("http://127.0.0.1:8001")
            .timeout(Duration::from_secs(5))
            .retry_config(RetryConfig::no_retry())
            .build()
            .unwrap();

        assert_eq!(client.config().timeout, Duration::from_secs(5));
        assert_eq!(client.config().retry_config.max_retries, 0);
    }

    #[tokio::test]
    async fn test_health_and_backends() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api/health"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "ok",
                "service": "toolmux",
                "version": "0.1.0",
                "gateway_state": "ready",
                "tools": 4
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/backends"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
                "name": "local-server",
                "transport": "stdio",
                "state": "failed",
                "since": "2026-01-01T00:00:00Z",
                "tools": 0,
                "last_error": "backend unreachable: no such file"
            }])))
            .mount(&server)
            .await;

        let client = ToolmuxClient::builder().base_url(server.uri()).build().unwrap();

        let health = client.health().check().await.unwrap();
        assert_eq!(health.gateway_state, GatewayState::Ready);
        assert_eq!(health.tools, 4);

        let backends = client.health().backends().await.unwrap();
        assert_eq!(backends[0].state, ConnectionState::Failed);
        assert!(backends[0].last_error.is_some());
    }
}
