//! API endpoint groups.

pub mod health;
pub mod tools;

pub use health::HealthApi;
pub use tools::ToolsApi;
