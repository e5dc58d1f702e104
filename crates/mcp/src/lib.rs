// MCP (Model Context Protocol) client transports and a reference tool server

pub mod protocol;
pub mod server;
pub mod session;
pub mod stdio;
pub mod tools;
pub mod websocket;
pub mod wire;

pub use server::{serve_websocket, McpServer};
pub use session::McpSession;
pub use stdio::StdioTransport;
pub use websocket::WebSocketTransport;
pub use wire::{LineWire, Wire, WsWire};

use toolmux_core::{BackendConfig, Timeouts, Transport, TransportSpec};

/// Build the transport a backend's configuration asks for
pub fn transport_for(config: &BackendConfig, timeouts: &Timeouts) -> Box<dyn Transport> {
    match &config.transport {
        TransportSpec::Stdio(spec) => Box::new(StdioTransport::new(
            config.name.clone(),
            spec.clone(),
            timeouts.stop,
        )),
        TransportSpec::Websocket(spec) => Box::new(WebSocketTransport::new(
            config.name.clone(),
            spec.endpoint.clone(),
        )),
    }
}
