use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;

use crate::error::ConfigError;
use crate::types::{BackendConfig, TimeoutConfig, TransportSpec};

/// Resolved timeouts applied to one connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    pub start: Duration,
    pub list: Duration,
    pub invoke: Duration,
    pub stop: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            start: Duration::from_secs(30),
            list: Duration::from_secs(10),
            invoke: Duration::from_secs(30),
            stop: Duration::from_secs(5),
        }
    }
}

impl Timeouts {
    /// Apply the set fields of `overrides` on top of these timeouts
    pub fn overlay(self, overrides: &TimeoutConfig) -> Self {
        Self {
            start: overrides.start.map(Duration::from_secs).unwrap_or(self.start),
            list: overrides.list.map(Duration::from_secs).unwrap_or(self.list),
            invoke: overrides.invoke.map(Duration::from_secs).unwrap_or(self.invoke),
            stop: overrides.stop.map(Duration::from_secs).unwrap_or(self.stop),
        }
    }
}

/// Backends and timeouts the gateway is built from
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Gateway-wide timeout defaults
    #[serde(default)]
    pub timeouts: TimeoutConfig,

    /// Registration order defines which backend wins a tool name
    #[serde(default)]
    pub backends: Vec<BackendConfig>,
}

impl GatewayConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_timeouts(&self.timeouts, "gateway")?;

        let mut seen = HashSet::new();
        for (index, backend) in self.backends.iter().enumerate() {
            if backend.name.as_str().trim().is_empty() {
                return Err(ConfigError::EmptyName { index });
            }
            if !seen.insert(backend.name.clone()) {
                return Err(ConfigError::DuplicateBackend(backend.name.clone()));
            }

            match &backend.transport {
                TransportSpec::Stdio(spec) => {
                    if spec.command.trim().is_empty() {
                        return Err(ConfigError::EmptyCommand(backend.name.clone()));
                    }
                }
                TransportSpec::Websocket(spec) => {
                    let url = url::Url::parse(&spec.endpoint).map_err(|e| {
                        ConfigError::InvalidEndpoint {
                            backend: backend.name.clone(),
                            endpoint: spec.endpoint.clone(),
                            reason: e.to_string(),
                        }
                    })?;
                    if url.scheme() != "ws" && url.scheme() != "wss" {
                        return Err(ConfigError::InvalidEndpoint {
                            backend: backend.name.clone(),
                            endpoint: spec.endpoint.clone(),
                            reason: format!("unsupported scheme '{}'", url.scheme()),
                        });
                    }
                }
            }

            check_timeouts(&backend.timeouts, &format!("backend '{}'", backend.name))?;
        }

        Ok(())
    }

    /// Effective timeouts for one backend
    pub fn timeouts_for(&self, backend: &BackendConfig) -> Timeouts {
        Timeouts::default()
            .overlay(&self.timeouts)
            .overlay(&backend.timeouts)
    }
}

fn check_timeouts(timeouts: &TimeoutConfig, scope: &str) -> Result<(), ConfigError> {
    let fields = [
        ("start", timeouts.start),
        ("list", timeouts.list),
        ("invoke", timeouts.invoke),
        ("stop", timeouts.stop),
    ];
    for (field, value) in fields {
        if value == Some(0) {
            return Err(ConfigError::ZeroTimeout {
                scope: scope.to_string(),
                field,
            });
        }
    }
    Ok(())
}
