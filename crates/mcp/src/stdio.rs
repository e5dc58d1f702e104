// Subprocess backend: MCP over a child's stdin/stdout

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::process::{ExitStatus, Stdio};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use toolmux_core::{BackendName, RemoteTool, StdioSpec, Transport, TransportError, TransportKind};
use tracing::{debug, warn};

use crate::session::McpSession;
use crate::wire::LineWire;

/// Bytes of stderr kept for handshake diagnostics
pub const STDERR_HEAD_BYTES: usize = 2000;

#[cfg(windows)]
const CREATE_NO_WINDOW: u32 = 0x0800_0000;

type StdioSession = McpSession<LineWire<ChildStdout, ChildStdin>>;

pub struct StdioTransport {
    backend: BackendName,
    spec: StdioSpec,
    stop_timeout: Duration,
    child: Option<Child>,
    session: Option<StdioSession>,
    stderr: Option<StderrCapture>,
}

impl StdioTransport {
    pub fn new(backend: BackendName, spec: StdioSpec, stop_timeout: Duration) -> Self {
        Self {
            backend,
            spec,
            stop_timeout,
            child: None,
            session: None,
            stderr: None,
        }
    }

    fn spawn(&self) -> Result<Child, TransportError> {
        let mut command = Command::new(&self.spec.command);
        command
            .args(&self.spec.args)
            .envs(&self.spec.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(cwd) = &self.spec.cwd {
            command.current_dir(cwd);
        }
        #[cfg(windows)]
        command.creation_flags(CREATE_NO_WINDOW);

        command
            .spawn()
            .map_err(|e| TransportError::Spawn(format!("{}: {}", self.spec.command, e)))
    }

    fn session(&mut self) -> Result<&mut StdioSession, TransportError> {
        self.session.as_mut().ok_or(TransportError::Closed)
    }

    /// Kill the child after a failed handshake and collect what it printed
    async fn abandon(&mut self) -> String {
        if let Some(mut child) = self.child.take() {
            if let Err(err) = child.kill().await {
                debug!(backend = %self.backend, error = %err, "Failed to kill backend process");
            }
        }
        match self.stderr.take() {
            Some(capture) => capture.finish(self.stop_timeout).await,
            None => String::new(),
        }
    }
}

#[async_trait]
impl Transport for StdioTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Stdio
    }

    async fn open(&mut self) -> Result<(), TransportError> {
        if self.session.is_some() {
            return Ok(());
        }

        let mut child = self.spawn()?;
        debug!(
            backend = %self.backend,
            command = %self.spec.command,
            pid = child.id().unwrap_or_default(),
            "Spawned backend process"
        );

        let (stdin, stdout) = match (child.stdin.take(), child.stdout.take()) {
            (Some(stdin), Some(stdout)) => (stdin, stdout),
            _ => return Err(TransportError::Spawn("child stdio was not captured".to_string())),
        };
        self.stderr = child
            .stderr
            .take()
            .map(|stderr| StderrCapture::spawn(self.backend.clone(), stderr));
        self.child = Some(child);

        let mut session = McpSession::new(LineWire::new(stdout, stdin));
        match session.initialize().await {
            Ok(server) => {
                debug!(
                    backend = %self.backend,
                    server = %server.server_info.name,
                    version = %server.server_info.version,
                    "Handshake complete"
                );
                self.session = Some(session);
                Ok(())
            }
            Err(err) => {
                drop(session);
                let stderr = self.abandon().await;
                let message = if stderr.trim().is_empty() {
                    err.to_string()
                } else {
                    format!("{}; stderr: {}", err, stderr.trim())
                };
                Err(TransportError::Handshake(message))
            }
        }
    }

    async fn list_tools(&mut self) -> Result<Vec<RemoteTool>, TransportError> {
        self.session()?.list_tools().await
    }

    async fn call_tool(
        &mut self,
        name: &str,
        arguments: &Map<String, Value>,
    ) -> Result<Value, TransportError> {
        self.session()?.call_tool(name, arguments).await
    }

    /// Closing stdin asks the server to exit. A child still running after
    /// half the stop timeout gets SIGTERM, and one that outlives the rest
    /// of it is killed.
    async fn close(&mut self) -> Result<(), TransportError> {
        drop(self.session.take());

        let Some(mut child) = self.child.take() else {
            return Ok(());
        };

        let grace = self.stop_timeout / 2;
        let result = match timeout(grace, child.wait()).await {
            Ok(status) => exit_result(&self.backend, status),
            Err(_) => {
                if request_termination(&child) {
                    debug!(backend = %self.backend, "Sent SIGTERM to backend process");
                }
                match timeout(self.stop_timeout.saturating_sub(grace), child.wait()).await {
                    Ok(status) => exit_result(&self.backend, status),
                    Err(_) => {
                        warn!(
                            backend = %self.backend,
                            timeout_ms = self.stop_timeout.as_millis() as u64,
                            "Backend process did not exit, killing it"
                        );
                        child
                            .kill()
                            .await
                            .map_err(|e| TransportError::Io(e.to_string()))
                    }
                }
            }
        };

        self.stderr = None;
        result
    }
}

fn exit_result(
    backend: &BackendName,
    status: std::io::Result<ExitStatus>,
) -> Result<(), TransportError> {
    match status {
        Ok(status) => {
            debug!(backend = %backend, status = %status, "Backend process exited");
            Ok(())
        }
        Err(err) => Err(TransportError::Io(err.to_string())),
    }
}

/// Send SIGTERM. Returns false when the child is already reaped.
#[cfg(unix)]
fn request_termination(child: &Child) -> bool {
    let Some(pid) = child.id().and_then(|pid| libc::pid_t::try_from(pid).ok()) else {
        return false;
    };
    // SAFETY: kill(2) only takes plain integers. The pid is our own child,
    // which has not been waited on, so it cannot have been recycled.
    unsafe { libc::kill(pid, libc::SIGTERM) == 0 }
}

#[cfg(not(unix))]
fn request_termination(_child: &Child) -> bool {
    false
}

/// Drains a child's stderr into the log and keeps its first bytes
struct StderrCapture {
    head: Arc<Mutex<String>>,
    task: JoinHandle<()>,
}

impl StderrCapture {
    fn spawn(backend: BackendName, stderr: ChildStderr) -> Self {
        let head = Arc::new(Mutex::new(String::new()));
        let sink = head.clone();
        let task = tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                debug!(backend = %backend, "stderr: {}", line);
                if let Ok(mut head) = sink.lock() {
                    append_bounded(&mut head, &line, STDERR_HEAD_BYTES);
                }
            }
        });
        Self { head, task }
    }

    /// Wait briefly for the stream to end, then return what was kept
    async fn finish(self, wait: Duration) -> String {
        let Self { head, task } = self;
        if timeout(wait, task).await.is_err() {
            debug!("stderr drain did not finish");
        }
        head.lock().map(|head| head.clone()).unwrap_or_default()
    }
}

fn append_bounded(buffer: &mut String, line: &str, limit: usize) {
    if buffer.len() >= limit {
        return;
    }
    if !buffer.is_empty() {
        buffer.push('\n');
    }
    let mut end = line.len().min(limit.saturating_sub(buffer.len()));
    while !line.is_char_boundary(end) {
        end -= 1;
    }
    buffer.push_str(&line[..end]);
}
