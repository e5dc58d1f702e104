//! Scripted transport double for exercising connections and the gateway
//! without real backends.

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::error::TransportError;
use crate::schema::SchemaSource;
use crate::transport::Transport;
use crate::types::{RemoteTool, TransportKind};

type CallHandler =
    Arc<dyn Fn(&str, &Map<String, Value>) -> Result<Value, TransportError> + Send + Sync>;

/// One call observed by a scripted transport
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    /// Label of the transport that received the call
    pub backend: String,
    pub tool: String,
    pub arguments: Map<String, Value>,
}

/// Shared record of calls, possibly across several transports
#[derive(Debug, Clone, Default)]
pub struct CallLog(Arc<Mutex<Vec<RecordedCall>>>);

impl CallLog {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, call: RecordedCall) {
        if let Ok(mut calls) = self.0.lock() {
            calls.push(call);
        }
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.0.lock().map(|calls| calls.clone()).unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.0.lock().map(|calls| calls.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Transport whose behavior is fixed up front by a builder
pub struct ScriptedTransport {
    label: String,
    tools: Vec<RemoteTool>,
    handler: Option<CallHandler>,
    open_error: Option<TransportError>,
    list_error: Option<TransportError>,
    hang_open: bool,
    hang_calls: bool,
    hang_close: bool,
    call_delay: Option<Duration>,
    log: CallLog,
    closes: Arc<AtomicUsize>,
}

impl ScriptedTransport {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            tools: Vec::new(),
            handler: None,
            open_error: None,
            list_error: None,
            hang_open: false,
            hang_calls: false,
            hang_close: false,
            call_delay: None,
            log: CallLog::new(),
            closes: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Backend offering `echo {text}`
    pub fn echo(label: impl Into<String>) -> Self {
        Self::new(label).with_tool("echo").on_call(|_, args| {
            args.get("text")
                .cloned()
                .ok_or_else(|| TransportError::Rejected("missing required argument 'text'".into()))
        })
    }

    /// Backend offering `reverse {text}`
    pub fn reverse(label: impl Into<String>) -> Self {
        Self::new(label).with_tool("reverse").on_call(|_, args| {
            args.get("text")
                .and_then(Value::as_str)
                .map(|text| json!(text.chars().rev().collect::<String>()))
                .ok_or_else(|| TransportError::Rejected("missing required argument 'text'".into()))
        })
    }

    /// Add a tool taking a single string argument `text`
    pub fn with_tool(self, name: &str) -> Self {
        let schema = json!({
            "type": "object",
            "properties": {"text": {"type": "string"}},
            "required": ["text"]
        });
        self.with_remote_tool(
            RemoteTool::new(name)
                .with_description(format!("{} tool", name))
                .with_input_schema(SchemaSource::Structured(schema)),
        )
    }

    pub fn with_remote_tool(mut self, tool: RemoteTool) -> Self {
        self.tools.push(tool);
        self
    }

    /// Answer calls with `handler`. Without one, calls return their arguments.
    pub fn on_call<F>(mut self, handler: F) -> Self
    where
        F: Fn(&str, &Map<String, Value>) -> Result<Value, TransportError> + Send + Sync + 'static,
    {
        self.handler = Some(Arc::new(handler));
        self
    }

    pub fn fail_open(mut self, err: TransportError) -> Self {
        self.open_error = Some(err);
        self
    }

    pub fn fail_list(mut self, err: TransportError) -> Self {
        self.list_error = Some(err);
        self
    }

    pub fn hang_open(mut self) -> Self {
        self.hang_open = true;
        self
    }

    pub fn hang_calls(mut self) -> Self {
        self.hang_calls = true;
        self
    }

    pub fn hang_close(mut self) -> Self {
        self.hang_close = true;
        self
    }

    pub fn with_call_delay(mut self, delay: Duration) -> Self {
        self.call_delay = Some(delay);
        self
    }

    pub fn with_log(mut self, log: CallLog) -> Self {
        self.log = log;
        self
    }

    pub fn log(&self) -> CallLog {
        self.log.clone()
    }

    /// Counter of `close` calls, readable after the transport is boxed
    pub fn close_count(&self) -> Arc<AtomicUsize> {
        self.closes.clone()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Local
    }

    async fn open(&mut self) -> Result<(), TransportError> {
        if self.hang_open {
            futures::future::pending::<()>().await;
        }
        match &self.open_error {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    async fn list_tools(&mut self) -> Result<Vec<RemoteTool>, TransportError> {
        match &self.list_error {
            Some(err) => Err(err.clone()),
            None => Ok(self.tools.clone()),
        }
    }

    async fn call_tool(
        &mut self,
        name: &str,
        arguments: &Map<String, Value>,
    ) -> Result<Value, TransportError> {
        self.log.push(RecordedCall {
            backend: self.label.clone(),
            tool: name.to_string(),
            arguments: arguments.clone(),
        });

        if self.hang_calls {
            futures::future::pending::<()>().await;
        }
        if let Some(delay) = self.call_delay {
            tokio::time::sleep(delay).await;
        }

        match &self.handler {
            Some(handler) => handler(name, arguments),
            None => Ok(Value::Object(arguments.clone())),
        }
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        if self.hang_close {
            futures::future::pending::<()>().await;
        }
        Ok(())
    }
}
