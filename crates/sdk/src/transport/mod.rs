//! Transport layer for the Toolmux SDK.

pub mod http;

pub use http::HttpTransport;
