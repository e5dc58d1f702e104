use futures::future::join_all;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{watch, RwLock};
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::catalog::{Catalog, ShadowedTool};
use crate::config::{GatewayConfig, Timeouts};
use crate::connection::Connection;
use crate::error::{GatewayError, InvokeFailure};
use crate::transport::Transport;
use crate::types::{
    BackendConfig, BackendName, BackendStatus, ConnectionState, GatewayState, InvocationRequest,
    InvocationResult, ToolDescriptor,
};

/// Where a backend dropped out of the catalog
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureStage {
    /// Spawn, connect or handshake failed
    Start,
    /// Reachable, but the tool listing failed
    List,
    /// Not ready when the catalog was rebuilt
    Unavailable,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendFailure {
    pub backend: BackendName,
    pub stage: FailureStage,
    pub reason: String,
}

/// Outcome of building the catalog
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StartupReport {
    /// Backends contributing tools, in registration order
    pub ready: Vec<BackendName>,
    pub failed: Vec<BackendFailure>,
    pub tool_count: usize,
    pub shadowed: Vec<ShadowedTool>,
}

/// Aggregates every configured backend behind one discovery and
/// invocation surface.
pub struct Gateway {
    connections: Vec<Connection>,
    index: HashMap<BackendName, usize>,
    catalog: RwLock<Arc<Catalog>>,
    state: watch::Sender<GatewayState>,
}

impl Gateway {
    /// Connections are registered in the given order. Backend names must be
    /// unique.
    pub fn new(connections: Vec<Connection>) -> Result<Self, GatewayError> {
        let mut index = HashMap::with_capacity(connections.len());
        for (i, connection) in connections.iter().enumerate() {
            if index.insert(connection.name().clone(), i).is_some() {
                return Err(GatewayError::DuplicateBackend(connection.name().clone()));
            }
        }
        let (state, _) = watch::channel(GatewayState::Initializing);
        Ok(Self {
            connections,
            index,
            catalog: RwLock::new(Arc::new(Catalog::empty())),
            state,
        })
    }

    /// Build one connection per configured backend using `transport_for`
    pub fn from_config<F>(
        config: &GatewayConfig,
        mut transport_for: F,
    ) -> Result<Self, GatewayError>
    where
        F: FnMut(&BackendConfig, &Timeouts) -> Box<dyn Transport>,
    {
        let connections = config
            .backends
            .iter()
            .map(|backend| {
                let timeouts = config.timeouts_for(backend);
                let transport = transport_for(backend, &timeouts);
                Connection::new(backend.clone(), timeouts, transport)
            })
            .collect();
        Self::new(connections)
    }

    pub fn state(&self) -> GatewayState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<GatewayState> {
        self.state.subscribe()
    }

    pub fn connections(&self) -> &[Connection] {
        &self.connections
    }

    pub fn connection(&self, backend: &BackendName) -> Option<&Connection> {
        self.index.get(backend).map(|&i| &self.connections[i])
    }

    /// Start every backend concurrently, then build the catalog from the
    /// ones that came up. Backend failures never fail the gateway.
    pub async fn start(&self) -> Result<StartupReport, GatewayError> {
        let claimed = self.state.send_if_modified(|state| {
            if *state == GatewayState::Initializing {
                *state = GatewayState::StartingBackends;
                true
            } else {
                false
            }
        });
        if !claimed {
            return Err(GatewayError::InvalidState {
                operation: "start",
                state: self.state(),
            });
        }

        info!(backends = self.connections.len(), "Starting backends");

        let outcomes = join_all(self.connections.iter().map(|c| c.start())).await;

        let mut failed = Vec::new();
        for (connection, outcome) in self.connections.iter().zip(outcomes) {
            if let Err(err) = outcome {
                failed.push(BackendFailure {
                    backend: connection.name().clone(),
                    stage: FailureStage::Start,
                    reason: err.to_string(),
                });
            }
        }

        self.state.send_if_modified(|state| {
            if *state == GatewayState::StartingBackends {
                *state = GatewayState::Ready;
                true
            } else {
                false
            }
        });

        let mut report = self.rebuild_catalog(false).await;
        failed.append(&mut report.failed);
        report.failed = failed;

        for failure in &report.failed {
            warn!(
                backend = %failure.backend,
                stage = ?failure.stage,
                reason = %failure.reason,
                "Backend excluded from catalog"
            );
        }
        info!(
            ready = report.ready.len(),
            failed = report.failed.len(),
            tools = report.tool_count,
            shadowed = report.shadowed.len(),
            "Gateway ready"
        );

        Ok(report)
    }

    /// Re-query every ready backend and swap in a fresh catalog
    pub async fn refresh_catalog(&self) -> Result<StartupReport, GatewayError> {
        let state = self.state();
        if state != GatewayState::Ready {
            return Err(GatewayError::InvalidState {
                operation: "refresh the catalog",
                state,
            });
        }

        let report = self.rebuild_catalog(true).await;
        info!(
            tools = report.tool_count,
            failed = report.failed.len(),
            "Catalog refreshed"
        );
        Ok(report)
    }

    /// `report_unavailable` adds backends that are not ready to the report.
    /// At startup those are already reported as start failures.
    async fn rebuild_catalog(&self, report_unavailable: bool) -> StartupReport {
        let listings = join_all(self.connections.iter().map(|connection| async move {
            if connection.state() != ConnectionState::Ready {
                return None;
            }
            Some(connection.list_tools().await)
        }))
        .await;

        let mut report = StartupReport::default();
        let mut contributions = Vec::new();

        for (connection, listing) in self.connections.iter().zip(listings) {
            let backend = connection.name().clone();
            match listing {
                Some(Ok(tools)) => {
                    info!(backend = %backend, tools = tools.len(), "Backend contributed tools");
                    report.ready.push(backend.clone());
                    contributions.push((backend, tools));
                }
                Some(Err(err)) => report.failed.push(BackendFailure {
                    backend,
                    stage: FailureStage::List,
                    reason: err.to_string(),
                }),
                None if report_unavailable => {
                    let status = connection.status();
                    let reason = status
                        .last_error
                        .unwrap_or_else(|| format!("connection is {}", status.state));
                    report.failed.push(BackendFailure {
                        backend,
                        stage: FailureStage::Unavailable,
                        reason,
                    });
                }
                None => {}
            }
        }

        let catalog = Catalog::build(contributions);
        report.tool_count = catalog.len();
        report.shadowed = catalog.shadowed().to_vec();

        *self.catalog.write().await = Arc::new(catalog);
        report
    }

    /// Snapshot of the current catalog
    pub async fn catalog(&self) -> Arc<Catalog> {
        self.catalog.read().await.clone()
    }

    /// Aggregated tools ordered by name. Empty, not an error, when no
    /// backend is healthy.
    pub async fn list_tools(&self) -> Vec<ToolDescriptor> {
        self.catalog().await.tools().cloned().collect()
    }

    pub async fn get_tool(&self, name: &str) -> Option<ToolDescriptor> {
        self.catalog().await.get(name).cloned()
    }

    /// Route one call to the backend that owns `name`
    pub async fn invoke_tool(
        &self,
        name: &str,
        parameters: &Map<String, Value>,
    ) -> Result<Value, InvokeFailure> {
        self.invoke_routed(name, parameters)
            .await
            .map(|(_, output)| output)
    }

    pub async fn invoke(
        &self,
        request: InvocationRequest,
    ) -> Result<InvocationResult, InvokeFailure> {
        let (backend, output) = self
            .invoke_routed(&request.tool_name, &request.parameters)
            .await?;
        Ok(InvocationResult {
            tool_name: request.tool_name,
            backend,
            output,
        })
    }

    async fn invoke_routed(
        &self,
        name: &str,
        parameters: &Map<String, Value>,
    ) -> Result<(BackendName, Value), InvokeFailure> {
        let state = self.state();
        if state != GatewayState::Ready {
            return Err(InvokeFailure::NotReady { state });
        }

        let catalog = self.catalog().await;
        if catalog.is_empty() {
            return Err(InvokeFailure::NoToolsAvailable);
        }
        let backend = match catalog.get(name) {
            Some(descriptor) => descriptor.backend.clone(),
            None => {
                return Err(InvokeFailure::NotFound {
                    tool: name.to_string(),
                })
            }
        };
        drop(catalog);

        let connection = match self.connection(&backend) {
            Some(connection) if connection.state() == ConnectionState::Ready => connection,
            Some(connection) => {
                return Err(InvokeFailure::BackendUnavailable {
                    tool: name.to_string(),
                    backend,
                    message: format!("connection is {}", connection.state()),
                })
            }
            None => {
                return Err(InvokeFailure::BackendUnavailable {
                    tool: name.to_string(),
                    backend,
                    message: "backend is not registered".to_string(),
                })
            }
        };

        let span = info_span!(
            "invoke",
            invocation_id = %Uuid::new_v4(),
            tool = %name,
            backend = %backend,
        );

        async {
            let started = Instant::now();
            let result = connection.invoke(name, parameters).await;
            let elapsed_ms = started.elapsed().as_millis() as u64;

            match result {
                Ok(output) => {
                    info!(elapsed_ms, "Invocation completed");
                    Ok((backend, output))
                }
                Err(err) => {
                    let failure = InvokeFailure::classify(name, &backend, err);
                    warn!(elapsed_ms, kind = %failure.kind(), error = %failure, "Invocation failed");
                    Err(failure)
                }
            }
        }
        .instrument(span)
        .await
    }

    /// Diagnostics for every configured backend, in registration order
    pub async fn backend_statuses(&self) -> Vec<BackendStatus> {
        let catalog = self.catalog().await;
        self.connections
            .iter()
            .map(|connection| {
                let status = connection.status();
                BackendStatus {
                    name: connection.name().clone(),
                    transport: connection.kind(),
                    state: status.state,
                    since: status.since,
                    tools: catalog.count_for(connection.name()),
                    last_error: status.last_error,
                }
            })
            .collect()
    }

    /// Stop every backend and report `Stopped`. Individual stop failures
    /// are logged only. Later calls return at once.
    pub async fn shutdown(&self) -> GatewayState {
        let claimed = self.state.send_if_modified(|state| match state {
            GatewayState::ShuttingDown | GatewayState::Stopped => false,
            _ => {
                *state = GatewayState::ShuttingDown;
                true
            }
        });

        if !claimed {
            let mut rx = self.subscribe();
            let _ = rx.wait_for(|state| *state == GatewayState::Stopped).await;
            return GatewayState::Stopped;
        }

        info!(backends = self.connections.len(), "Shutting down gateway");

        let outcomes = join_all(self.connections.iter().map(|c| c.stop())).await;
        for (connection, outcome) in self.connections.iter().zip(outcomes) {
            if let Err(err) = outcome {
                warn!(backend = %connection.name(), error = %err, "Backend did not stop cleanly");
            }
        }

        *self.catalog.write().await = Arc::new(Catalog::empty());
        self.state.send_replace(GatewayState::Stopped);
        info!("Gateway stopped");
        GatewayState::Stopped
    }
}

impl std::fmt::Debug for Gateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Gateway")
            .field("state", &self.state())
            .field("connections", &self.connections)
            .finish()
    }
}
