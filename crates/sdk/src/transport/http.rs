//! HTTP transport layer for the Toolmux SDK.

use crate::config::{ClientConfig, RetryConfig};
use crate::error::{ToolmuxError, ToolmuxResult};
use reqwest::{Client, Request, Response};
use serde::{de::DeserializeOwned, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};
use url::Url;

/// HTTP transport for making API requests.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    config: Arc<ClientConfig>,
}

impl HttpTransport {
    /// Create a new HTTP transport with the given configuration.
    pub fn new(config: Arc<ClientConfig>) -> ToolmuxResult<Self> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self { client, config })
    }

    /// Append path segments to the base URL. Segments are percent-encoded,
    /// so tool names may contain `/` or spaces.
    fn build_url(&self, segments: &[&str]) -> ToolmuxResult<Url> {
        let mut url = self.config.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| ToolmuxError::Config("base_url cannot be a base".to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Send `request`, retrying transient failures as far as the retry
    /// policy allows for its method.
    async fn execute(&self, request: Request) -> ToolmuxResult<Response> {
        let retry_config = &self.config.retry_config;
        let max_retries = retry_config.retries_for(request.method());
        let mut attempts = 0;

        loop {
            let attempt = request
                .try_clone()
                .ok_or_else(|| ToolmuxError::Config("Request cannot be cloned".to_string()))?;

            match self.client.execute(attempt).await {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        return Ok(response);
                    }

                    if attempts < max_retries && RetryConfig::is_transient(status) {
                        let backoff = retry_config.backoff(attempts);
                        warn!(
                            status = status.as_u16(),
                            attempt = attempts + 1,
                            backoff_ms = backoff.as_millis() as u64,
                            "Request failed, retrying"
                        );
                        tokio::time::sleep(backoff).await;
                        attempts += 1;
                        continue;
                    }

                    let body = response.text().await.unwrap_or_default();
                    return Err(ToolmuxError::from_response(status.as_u16(), &body));
                }
                Err(e) => {
                    if attempts < max_retries && (e.is_timeout() || e.is_connect()) {
                        let backoff = retry_config.backoff(attempts);
                        warn!(
                            attempt = attempts + 1,
                            backoff_ms = backoff.as_millis() as u64,
                            error = %e,
                            "Request failed to complete, retrying"
                        );
                        tokio::time::sleep(backoff).await;
                        attempts += 1;
                        continue;
                    }
                    if e.is_timeout() {
                        return Err(ToolmuxError::Timeout {
                            message: e.to_string(),
                        });
                    }
                    return Err(e.into());
                }
            }
        }
    }

    pub async fn get<T: DeserializeOwned>(&self, segments: &[&str]) -> ToolmuxResult<T> {
        let url = self.build_url(segments)?;
        debug!(url = %url, "GET request");

        let response = self.execute(self.client.get(url).build()?).await?;
        let body = response.json().await?;
        Ok(body)
    }

    pub async fn post<T: DeserializeOwned, B: Serialize>(
        &self,
        segments: &[&str],
        body: &B,
    ) -> ToolmuxResult<T> {
        let url = self.build_url(segments)?;
        debug!(url = %url, "POST request");

        let response = self.execute(self.client.post(url).json(body).build()?).await?;
        let body = response.json().await?;
        Ok(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct TestResponse {
        message: String,
        value: i32,
    }

    fn create_config(base_url: &str, retry_config: RetryConfig) -> Arc<ClientConfig> {
        Arc::new(ClientConfig {
            base_url: Url::parse(base_url).unwrap(),
            timeout: Duration::from_secs(30),
            retry_config,
        })
    }

    fn fast_retry() -> RetryConfig {
        RetryConfig {
            max_retries: 2,
            initial_backoff: Duration::from_millis(1),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_get_request() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api/test"))
            .respond_with(ResponseTemplate::new(200).set_body_json(TestResponse {
                message: "success".to_string(),
                value: 42,
            }))
            .mount(&server)
            .await;

        let config = create_config(&server.uri(), RetryConfig::no_retry());
        let transport = HttpTransport::new(config).unwrap();

        let result: TestResponse = transport.get(&["api", "test"]).await.unwrap();
        assert_eq!(result.value, 42);
    }

    #[tokio::test]
    async fn test_get_retries_unavailable() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/tools"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/tools"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
            .mount(&server)
            .await;

        let transport = HttpTransport::new(create_config(&server.uri(), fast_retry())).unwrap();

        let tools: Vec<serde_json::Value> = transport.get(&["tools"]).await.unwrap();
        assert!(tools.is_empty());
    }

    #[tokio::test]
    async fn test_post_is_not_retried() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/tools/echo/invoke"))
            .respond_with(ResponseTemplate::new(503).set_body_json(serde_json::json!({
                "error": "backend_unavailable",
                "message": "backend 'a' is down"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let transport = HttpTransport::new(create_config(&server.uri(), fast_retry())).unwrap();

        let result: ToolmuxResult<serde_json::Value> = transport
            .post(&["tools", "echo", "invoke"], &serde_json::json!({"params": {}}))
            .await;
        assert!(matches!(result, Err(ToolmuxError::Unavailable { .. })));
    }

    #[tokio::test]
    async fn test_get_gives_up_after_max_retries() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/tools"))
            .respond_with(ResponseTemplate::new(503).set_body_json(serde_json::json!({
                "error": "no_tools_available",
                "message": "no backend is ready"
            })))
            .expect(3)
            .mount(&server)
            .await;

        let transport = HttpTransport::new(create_config(&server.uri(), fast_retry())).unwrap();

        let result: ToolmuxResult<Vec<serde_json::Value>> = transport.get(&["tools"]).await;
        assert!(matches!(result, Err(ToolmuxError::Unavailable { .. })));
    }

    #[tokio::test]
    async fn test_error_on_404() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api/notfound"))
            .respond_with(ResponseTemplate::new(404).set_body_string("Not found"))
            .mount(&server)
            .await;

        let config = create_config(&server.uri(), RetryConfig::no_retry());
        let transport = HttpTransport::new(config).unwrap();

        let result: ToolmuxResult<TestResponse> = transport.get(&["api", "notfound"]).await;
        match result {
            Err(ToolmuxError::NotFound { message, .. }) => assert_eq!(message, "Not found"),
            other => panic!("Expected NotFound, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_build_url() {
        let transport =
            HttpTransport::new(create_config("http://localhost:8001", RetryConfig::no_retry()))
                .unwrap();

        let url = transport.build_url(&["api", "health"]).unwrap();
        assert_eq!(url.as_str(), "http://localhost:8001/api/health");
    }

    #[tokio::test]
    async fn test_build_url_encodes_segments() {
        let transport =
            HttpTransport::new(create_config("http://localhost:8001/gw/", RetryConfig::no_retry()))
                .unwrap();

        let url = transport.build_url(&["tools", "a/b c", "invoke"]).unwrap();
        assert_eq!(url.as_str(), "http://localhost:8001/gw/tools/a%2Fb%20c/invoke");
    }
}
