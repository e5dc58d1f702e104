// Text tools: echo, reverse and a canned text analysis

use crate::protocol::{CallToolResult, ToolSchema};
use crate::tools::{
    json_schema_enum, json_schema_object, json_schema_string, parse_arguments, Tool, ToolError,
};
use serde::Deserialize;
use serde_json::{Map, Value};
use toolmux_core::SchemaSource;

#[derive(Debug, Deserialize)]
struct TextArgs {
    text: String,
}

fn text_input_schema(description: &str) -> SchemaSource {
    SchemaSource::Structured(json_schema_object(
        serde_json::json!({ "text": json_schema_string(description) }),
        vec!["text"],
    ))
}

/// Returns its input unchanged
pub struct EchoTool;

#[async_trait::async_trait]
impl Tool for EchoTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "echo".to_string(),
            description: Some("Return the given text unchanged".to_string()),
            input_schema: text_input_schema("Text to echo back"),
            output_schema: SchemaSource::Structured(serde_json::json!({"type": "string"})),
        }
    }

    async fn execute(&self, arguments: Map<String, Value>) -> Result<CallToolResult, ToolError> {
        let args: TextArgs = parse_arguments("echo", arguments)?;
        Ok(CallToolResult::text(args.text))
    }
}

/// Reverses its input by characters
pub struct ReverseTool;

#[async_trait::async_trait]
impl Tool for ReverseTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "reverse".to_string(),
            description: Some("Reverse the given text".to_string()),
            input_schema: text_input_schema("Text to reverse"),
            output_schema: SchemaSource::Structured(serde_json::json!({"type": "string"})),
        }
    }

    async fn execute(&self, arguments: Map<String, Value>) -> Result<CallToolResult, ToolError> {
        let args: TextArgs = parse_arguments("reverse", arguments)?;
        Ok(CallToolResult::text(args.text.chars().rev().collect::<String>()))
    }
}

#[derive(Debug, Deserialize)]
struct AnalysisArgs {
    #[allow(dead_code)]
    text: String,
    operation: String,
}

/// Placeholder analysis with fixed answers per operation
pub struct TextAnalysisTool;

#[async_trait::async_trait]
impl Tool for TextAnalysisTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "text_analysis".to_string(),
            description: Some("Analyze text (sentiment or summary)".to_string()),
            input_schema: SchemaSource::Structured(json_schema_object(
                serde_json::json!({
                    "text": json_schema_string("Text to analyze"),
                    "operation": json_schema_enum(&["sentiment", "summary"], "Analysis to run")
                }),
                vec!["text", "operation"],
            )),
            output_schema: SchemaSource::Missing,
        }
    }

    async fn execute(&self, arguments: Map<String, Value>) -> Result<CallToolResult, ToolError> {
        let args: AnalysisArgs = parse_arguments("text_analysis", arguments)?;
        let answer = match args.operation.as_str() {
            "sentiment" => "Positive",
            "summary" => "Summary placeholder",
            _ => "Invalid operation",
        };
        Ok(CallToolResult::text(answer))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn args(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[tokio::test]
    async fn test_echo_and_reverse() {
        let echoed = EchoTool.execute(args(json!({"text": "hi"}))).await.unwrap();
        assert_eq!(echoed, CallToolResult::text("hi"));

        let reversed = ReverseTool
            .execute(args(json!({"text": "héllo"})))
            .await
            .unwrap();
        assert_eq!(reversed, CallToolResult::text("olléh"));

        let err = EchoTool.execute(Map::new()).await.unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
    }

    #[tokio::test]
    async fn test_text_analysis_operations() {
        for (operation, expected) in [
            ("sentiment", "Positive"),
            ("summary", "Summary placeholder"),
            ("translate", "Invalid operation"),
        ] {
            let result = TextAnalysisTool
                .execute(args(json!({"text": "great product", "operation": operation})))
                .await
                .unwrap();
            assert_eq!(result, CallToolResult::text(expected));
        }
    }
}
