// Canned data lookup tool

use crate::protocol::{CallToolResult, ToolSchema};
use crate::tools::{json_schema_object, json_schema_string, parse_arguments, Tool, ToolError};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use toolmux_core::SchemaSource;

#[derive(Debug, Deserialize)]
struct DataQueryArgs {
    #[allow(dead_code)]
    query: String,
    source: String,
}

/// Answers every query with the same product record, tagged with the source
pub struct DataQueryTool;

#[async_trait::async_trait]
impl Tool for DataQueryTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "data_query".to_string(),
            description: Some("Query a data source".to_string()),
            input_schema: SchemaSource::Structured(json_schema_object(
                json!({
                    "query": json_schema_string("Query to run"),
                    "source": json_schema_string("Data source to query")
                }),
                vec!["query", "source"],
            )),
            output_schema: SchemaSource::Structured(json!({
                "type": "object",
                "properties": {
                    "result": {"type": "object"},
                    "source": {"type": "string"}
                }
            })),
        }
    }

    async fn execute(&self, arguments: Map<String, Value>) -> Result<CallToolResult, ToolError> {
        let args: DataQueryArgs = parse_arguments("data_query", arguments)?;
        Ok(CallToolResult::json(json!({
            "result": {
                "product": "MacBook",
                "comments": "Product is exceeded our expectation"
            },
            "source": args.source
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_data_query_tags_source() {
        let mut args = Map::new();
        args.insert("query".into(), json!("comments"));
        args.insert("source".into(), json!("crm"));

        let result = DataQueryTool.execute(args).await.unwrap();
        let structured = result.structured_content.unwrap();
        assert_eq!(structured["source"], json!("crm"));
        assert_eq!(structured["result"]["comments"], json!("Product is exceeded our expectation"));
    }

    #[tokio::test]
    async fn test_data_query_requires_source() {
        let mut args = Map::new();
        args.insert("query".into(), json!("comments"));
        let err = DataQueryTool.execute(args).await.unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
    }
}
