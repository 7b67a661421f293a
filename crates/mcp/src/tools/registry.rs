// MCP tool definitions and the shared result/error plumbing

use crate::protocol::{CallToolResult, ToolContent, ToolSchema};
use anyhow::Result;
use harvest_core::error::ToolError;
use harvest_sdk::SdkError;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tracing::warn;

/// Tool executor trait
#[async_trait::async_trait]
pub trait Tool: Send + Sync {
    /// Get the tool schema for MCP
    fn schema(&self) -> ToolSchema;

    /// Execute the tool with given arguments
    async fn execute(&self, arguments: Value) -> Result<CallToolResult>;
}

/// Tool registry for managing available tools
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    /// Register a tool
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        let schema = tool.schema();
        self.tools.insert(schema.name.clone(), tool);
    }

    /// Get a tool by name
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    /// List all tool schemas, sorted by name
    pub fn list_schemas(&self) -> Vec<ToolSchema> {
        let mut schemas: Vec<ToolSchema> = self.tools.values().map(|t| t.schema()).collect();
        schemas.sort_by(|a, b| a.name.cmp(&b.name));
        schemas
    }

    /// Check if a tool exists
    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Map any failure into the error taxonomy.
///
/// `ToolError` and `SdkError` keep their classification; anything else is
/// reported as `INTERNAL_ERROR`.
pub fn format_tool_error(err: anyhow::Error) -> ToolError {
    if let Some(tool_error) = err.downcast_ref::<ToolError>() {
        return tool_error.clone();
    }
    match err.downcast::<SdkError>() {
        Ok(sdk_error) => sdk_error.into(),
        Err(err) => ToolError::internal(err.to_string()),
    }
}

/// Deserialize tool arguments; a missing argument object counts as empty.
pub fn parse_arguments<T: DeserializeOwned>(arguments: Value, tool: &str) -> Result<T, ToolError> {
    let arguments = match arguments {
        Value::Null => json!({}),
        other => other,
    };
    serde_json::from_value(arguments).map_err(|e| {
        ToolError::validation(format!("Invalid arguments for {}: {}", tool, e))
            .with_details(json!({ "tool": tool }))
    })
}

/// Successful tool result carrying the value as structured and text content.
pub fn tool_success<T: Serialize>(value: &T) -> Result<CallToolResult> {
    let structured = serde_json::to_value(value)?;
    let text = serde_json::to_string_pretty(&structured)?;
    Ok(CallToolResult {
        content: vec![ToolContent::text(text)],
        structured_content: Some(structured),
        is_error: None,
    })
}

/// Failed tool result: `[CODE] message` text plus `{code, message, details}`.
pub fn tool_failure(err: &ToolError) -> CallToolResult {
    let mut structured = json!({
        "code": err.code,
        "message": err.message,
    });
    if let Some(details) = &err.details {
        structured["details"] = details.clone();
    }
    CallToolResult {
        content: vec![ToolContent::text(err.to_string())],
        structured_content: Some(structured),
        is_error: Some(true),
    }
}

/// Run a tool body, turning its outcome into a tool result.
pub async fn run_tool<T, F>(tool: &str, body: F) -> Result<CallToolResult>
where
    T: Serialize,
    F: Future<Output = Result<T>>,
{
    match body.await {
        Ok(value) => tool_success(&value),
        Err(err) => {
            let tool_error = format_tool_error(err);
            warn!(tool, code = %tool_error.code, error = %tool_error.message, "Tool call failed");
            Ok(tool_failure(&tool_error))
        }
    }
}

// Helper functions for creating tool schemas

pub fn json_schema_object(properties: Value, required: Vec<&str>) -> Value {
    json!({
        "type": "object",
        "properties": properties,
        "required": required
    })
}

pub fn json_schema_string(description: &str) -> Value {
    json!({
        "type": "string",
        "description": description
    })
}

pub fn json_schema_integer(description: &str, minimum: i64, maximum: Option<i64>) -> Value {
    let mut schema = json!({
        "type": "integer",
        "description": description,
        "minimum": minimum
    });
    if let Some(maximum) = maximum {
        schema["maximum"] = json!(maximum);
    }
    schema
}

pub fn json_schema_number(description: &str) -> Value {
    json!({
        "type": "number",
        "description": description
    })
}

pub fn json_schema_boolean(description: &str) -> Value {
    json!({
        "type": "boolean",
        "description": description
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;
    use harvest_core::error::ToolErrorCode;
    use serde::Deserialize;

    struct EchoTool;

    #[async_trait::async_trait]
    impl Tool for EchoTool {
        fn schema(&self) -> ToolSchema {
            ToolSchema {
                name: "echo".to_string(),
                title: None,
                description: "Echo arguments".to_string(),
                input_schema: json_schema_object(json!({}), vec![]),
            }
        }

        async fn execute(&self, arguments: Value) -> Result<CallToolResult> {
            tool_success(&arguments)
        }
    }

    #[derive(Debug, Deserialize)]
    struct LimitArgs {
        limit: Option<u32>,
    }

    #[test]
    fn test_registry_register_and_list() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool));

        assert!(registry.contains("echo"));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.list_schemas()[0].name, "echo");
        assert!(registry.get("missing").is_none());
    }

    #[test]
    fn test_format_tool_error_keeps_taxonomy() {
        let err = anyhow::Error::new(ToolError::not_found("Yield x was not found"));
        assert_eq!(format_tool_error(err).code, ToolErrorCode::NotFound);

        let sdk = SdkError::Upstream {
            message: "StakeKit request failed with status 502.".to_string(),
            status: Some(502),
            code: None,
            details: json!({}),
        };
        let err = anyhow::Error::new(sdk).context("loading yields");
        let formatted = format_tool_error(err);
        assert_eq!(formatted.code, ToolErrorCode::UpstreamError);
        assert_eq!(formatted.status, Some(502));

        let err = anyhow::anyhow!("boom");
        let formatted = format_tool_error(err);
        assert_eq!(formatted.code, ToolErrorCode::InternalError);
        assert_eq!(formatted.message, "boom");
    }

    #[test]
    fn test_format_tool_error_through_context() {
        let err: Result<()> = Err(ToolError::validation("bad limit")).context("parsing");
        let formatted = format_tool_error(err.unwrap_err());
        assert_eq!(formatted.code, ToolErrorCode::ValidationError);
    }

    #[test]
    fn test_parse_arguments() {
        let args: LimitArgs = parse_arguments(Value::Null, "echo").unwrap();
        assert!(args.limit.is_none());

        let err = parse_arguments::<LimitArgs>(json!({"limit": "ten"}), "echo").unwrap_err();
        assert_eq!(err.code, ToolErrorCode::ValidationError);
        assert!(err.message.starts_with("Invalid arguments for echo"));
    }

    #[tokio::test]
    async fn test_run_tool_wraps_errors() {
        let ok = run_tool("echo", async { Ok(json!({"n": 1})) }).await.unwrap();
        assert_eq!(ok.structured_content.unwrap()["n"], 1);
        assert!(ok.is_error.is_none());

        let failed = run_tool::<Value, _>("echo", async {
            Err(ToolError::not_found("nothing here").into())
        })
        .await
        .unwrap();
        assert_eq!(failed.is_error, Some(true));
        assert_eq!(failed.content[0].as_text(), "[NOT_FOUND] nothing here");
        assert_eq!(failed.structured_content.unwrap()["code"], "NOT_FOUND");
    }
}
