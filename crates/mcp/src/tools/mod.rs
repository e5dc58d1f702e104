pub mod data;
pub mod text;
mod registry;

pub use data::DataQueryTool;
pub use registry::{
    json_schema_enum, json_schema_object, json_schema_string, parse_arguments, Tool, ToolError,
    ToolRegistry,
};
pub use text::{EchoTool, ReverseTool, TextAnalysisTool};

use std::sync::Arc;

/// Registry with every built-in tool of the demo server
pub fn demo_registry() -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(Arc::new(EchoTool));
    registry.register(Arc::new(ReverseTool));
    registry.register(Arc::new(TextAnalysisTool));
    registry.register(Arc::new(DataQueryTool));
    registry
}
