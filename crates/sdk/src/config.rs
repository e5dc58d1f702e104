//! Client settings: where the gateway lives and how reads are retried.

use reqwest::{Method, StatusCode};
use std::time::Duration;
use url::Url;

/// Settings shared by every request a [`crate::ToolmuxClient`] sends.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the gateway, e.g. `http://127.0.0.1:8001`.
    pub base_url: Url,
    /// Per-request timeout. Should exceed the gateway's own invocation
    /// timeout so the gateway reports slow tools itself.
    pub timeout: Duration,
    pub retry_config: RetryConfig,
}

impl ClientConfig {
    pub fn new(base_url: Url) -> Self {
        Self {
            base_url,
            timeout: Duration::from_secs(60),
            retry_config: RetryConfig::default(),
        }
    }
}

/// Retry policy for requests that did not get through.
///
/// Only GET requests are retried. An invocation may already have run the
/// tool on its backend when the gateway answers with an error, so POSTs are
/// sent exactly once regardless of `max_retries`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryConfig {
    /// Retries after the first attempt of a GET
    pub max_retries: u32,
    /// Delay before the first retry, doubled for each later one
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(5),
        }
    }
}

impl RetryConfig {
    pub fn no_retry() -> Self {
        Self {
            max_retries: 0,
            ..Default::default()
        }
    }

    /// How many times a request with `method` may be retried
    pub fn retries_for(&self, method: &Method) -> u32 {
        if *method == Method::GET {
            self.max_retries
        } else {
            0
        }
    }

    /// Delay before retry number `retry`, counted from zero
    pub fn backoff(&self, retry: u32) -> Duration {
        self.initial_backoff
            .saturating_mul(2u32.saturating_pow(retry))
            .min(self.max_backoff)
    }

    /// Gateway answers that may clear up on their own: rate limiting, and
    /// no backend able to serve the request yet.
    pub fn is_transient(status: StatusCode) -> bool {
        matches!(status.as_u16(), 429 | 502 | 503 | 504)
    }
}
