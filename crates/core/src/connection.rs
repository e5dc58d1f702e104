use serde_json::{Map, Value};
use tokio::sync::{watch, Mutex};
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::config::Timeouts;
use crate::error::{ConnectError, InvokeError, QueryError, StopError, TransportError};
use crate::transport::Transport;
use crate::types::{
    BackendConfig, BackendName, ConnectionState, ConnectionStatus, ToolDescriptor, TransportKind,
};

/// Owned session with one backend.
///
/// Every transport exchange runs under the connection's mutex, so calls to
/// the same backend are serialized while calls to different backends run
/// independently.
pub struct Connection {
    config: BackendConfig,
    timeouts: Timeouts,
    kind: TransportKind,
    status: watch::Sender<ConnectionStatus>,
    transport: Mutex<Box<dyn Transport>>,
}

impl Connection {
    pub fn new(config: BackendConfig, timeouts: Timeouts, transport: Box<dyn Transport>) -> Self {
        let (status, _) = watch::channel(ConnectionStatus::new(ConnectionState::Unstarted));
        Self {
            config,
            timeouts,
            kind: transport.kind(),
            status,
            transport: Mutex::new(transport),
        }
    }

    pub fn name(&self) -> &BackendName {
        &self.config.name
    }

    pub fn config(&self) -> &BackendConfig {
        &self.config
    }

    pub fn timeouts(&self) -> &Timeouts {
        &self.timeouts
    }

    pub fn kind(&self) -> TransportKind {
        self.kind
    }

    pub fn state(&self) -> ConnectionState {
        self.status.borrow().state
    }

    pub fn status(&self) -> ConnectionStatus {
        self.status.borrow().clone()
    }

    /// Watch state changes
    pub fn subscribe(&self) -> watch::Receiver<ConnectionStatus> {
        self.status.subscribe()
    }

    /// Establish the session and complete the handshake.
    ///
    /// No-op when already `Ready`. A `Failed` connection is never retried.
    pub async fn start(&self) -> Result<(), ConnectError> {
        let mut transport = self.transport.lock().await;

        let status = self.status();
        match status.state {
            ConnectionState::Ready => return Ok(()),
            ConnectionState::Failed => {
                return Err(ConnectError::PreviouslyFailed {
                    reason: status.last_error.unwrap_or_default(),
                })
            }
            ConnectionState::Unstarted => {}
            other => return Err(ConnectError::InvalidState(other)),
        }

        self.transition(ConnectionState::Starting, None);
        debug!(backend = %self.name(), transport = %self.kind, "Starting backend");

        let outcome = match timeout(self.timeouts.start, transport.open()).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(err)) => Err(ConnectError::from(err)),
            Err(_) => Err(ConnectError::Timeout {
                timeout_ms: millis(self.timeouts.start),
            }),
        };

        match outcome {
            Ok(()) => {
                if self.transition_from(ConnectionState::Starting, ConnectionState::Ready, None) {
                    info!(backend = %self.name(), transport = %self.kind, "Backend ready");
                    Ok(())
                } else {
                    // Stopped while the handshake was in flight
                    self.close_quietly(&mut **transport).await;
                    Err(ConnectError::InvalidState(self.state()))
                }
            }
            Err(err) => {
                self.close_quietly(&mut **transport).await;
                self.transition_from(
                    ConnectionState::Starting,
                    ConnectionState::Failed,
                    Some(err.to_string()),
                );
                warn!(backend = %self.name(), error = %err, "Backend failed to start");
                Err(err)
            }
        }
    }

    /// Query the backend's catalog and normalize every schema
    pub async fn list_tools(&self) -> Result<Vec<ToolDescriptor>, QueryError> {
        self.ensure_ready().map_err(QueryError::NotReady)?;
        let mut transport = self.transport.lock().await;
        self.ensure_ready().map_err(QueryError::NotReady)?;

        let tools = match timeout(self.timeouts.list, transport.list_tools()).await {
            Ok(Ok(tools)) => tools,
            Ok(Err(err)) => {
                self.fail_if_fatal(&err);
                return Err(QueryError::Transport(err));
            }
            Err(_) => {
                return Err(QueryError::Timeout {
                    timeout_ms: millis(self.timeouts.list),
                })
            }
        };

        debug!(backend = %self.name(), count = tools.len(), "Listed backend tools");

        Ok(tools
            .into_iter()
            .map(|tool| ToolDescriptor::from_remote(&self.config.name, tool))
            .collect())
    }

    /// Run one tool on the backend
    pub async fn invoke(
        &self,
        tool: &str,
        parameters: &Map<String, Value>,
    ) -> Result<Value, InvokeError> {
        self.ensure_ready().map_err(not_ready)?;
        let mut transport = self.transport.lock().await;
        self.ensure_ready().map_err(not_ready)?;

        match timeout(self.timeouts.invoke, transport.call_tool(tool, parameters)).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(err)) => {
                self.fail_if_fatal(&err);
                Err(InvokeError::from(err))
            }
            Err(_) => Err(InvokeError::Timeout {
                timeout_ms: millis(self.timeouts.invoke),
            }),
        }
    }

    /// Close the session. Always ends in `Closed`, except from `Unstarted`
    /// which is left untouched. Safe to call repeatedly.
    pub async fn stop(&self) -> Result<(), StopError> {
        let mut claimed = false;
        self.status.send_if_modified(|status| match status.state {
            ConnectionState::Unstarted | ConnectionState::Closing | ConnectionState::Closed => {
                false
            }
            _ => {
                status.state = ConnectionState::Closing;
                status.since = chrono::Utc::now();
                claimed = true;
                true
            }
        });

        if !claimed {
            if self.state() == ConnectionState::Closing {
                // Another caller is closing; wait for it to finish
                let mut rx = self.subscribe();
                let _ = timeout(
                    self.timeouts.stop * 2,
                    rx.wait_for(|s| s.state == ConnectionState::Closed),
                )
                .await;
            }
            return Ok(());
        }

        debug!(backend = %self.name(), "Stopping backend");

        let result = match timeout(self.timeouts.stop, self.transport.lock()).await {
            Ok(mut transport) => match timeout(self.timeouts.stop * 2, transport.close()).await {
                Ok(result) => result.map_err(StopError::from),
                Err(_) => Err(StopError::Timeout {
                    timeout_ms: millis(self.timeouts.stop * 2),
                }),
            },
            // An in-flight call still holds the session. It is released
            // when the connection is dropped.
            Err(_) => Err(StopError::Timeout {
                timeout_ms: millis(self.timeouts.stop),
            }),
        };

        let error = result.as_ref().err().map(ToString::to_string);
        self.transition(ConnectionState::Closed, error);
        info!(backend = %self.name(), "Backend stopped");
        result
    }

    fn ensure_ready(&self) -> Result<(), ConnectionState> {
        match self.state() {
            ConnectionState::Ready => Ok(()),
            other => Err(other),
        }
    }

    fn fail_if_fatal(&self, err: &TransportError) {
        if err.is_fatal()
            && self.transition_from(
                ConnectionState::Ready,
                ConnectionState::Failed,
                Some(err.to_string()),
            )
        {
            warn!(backend = %self.name(), error = %err, "Backend session lost");
        }
    }

    async fn close_quietly(&self, transport: &mut dyn Transport) {
        match timeout(self.timeouts.stop * 2, transport.close()).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => debug!(backend = %self.name(), error = %err, "Close after failed start"),
            Err(_) => debug!(backend = %self.name(), "Close after failed start timed out"),
        }
    }

    fn transition(&self, state: ConnectionState, error: Option<String>) {
        self.status.send_modify(|status| {
            status.state = state;
            status.since = chrono::Utc::now();
            if error.is_some() {
                status.last_error = error;
            }
        });
    }

    /// Move to `to` only if the connection is still in `from`
    fn transition_from(
        &self,
        from: ConnectionState,
        to: ConnectionState,
        error: Option<String>,
    ) -> bool {
        self.status.send_if_modified(|status| {
            if status.state != from {
                return false;
            }
            status.state = to;
            status.since = chrono::Utc::now();
            if error.is_some() {
                status.last_error = error;
            }
            true
        })
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("backend", &self.config.name)
            .field("transport", &self.kind)
            .field("state", &self.state())
            .finish()
    }
}

fn not_ready(state: ConnectionState) -> InvokeError {
    InvokeError::Unavailable(format!("connection is {}", state))
}

fn millis(duration: std::time::Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
