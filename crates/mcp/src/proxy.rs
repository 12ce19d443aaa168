//! Proxy tools: each discovered remote tool is wrapped in a `Tool`
//! implementation and registered under `<server>_<tool>`, so the agent
//! loop dispatches local and remote capabilities identically.

use crate::connection::McpConnection;
use crate::protocol::RemoteToolDescriptor;
use async_trait::async_trait;
use roost_core::error::{McpError, ToolError};
use roost_core::tool::{Tool, ToolResult};
use serde_json::{Value, json};
use std::sync::Arc;

pub struct McpProxyTool {
    qualified_name: String,
    description: String,
    schema: Value,
    remote_name: String,
    sensitive: bool,
    connection: Arc<McpConnection>,
}

impl McpProxyTool {
    pub fn new(
        connection: Arc<McpConnection>,
        descriptor: RemoteToolDescriptor,
        sensitive: bool,
    ) -> Self {
        let qualified_name = format!("{}_{}", connection.name(), descriptor.name);
        let description = if descriptor.description.is_empty() {
            format!("[{}] remote tool {}", connection.name(), descriptor.name)
        } else {
            format!("[{}] {}", connection.name(), descriptor.description)
        };
        let schema = if descriptor.input_schema.is_object() {
            descriptor.input_schema
        } else {
            json!({"type": "object", "properties": {}})
        };
        Self {
            qualified_name,
            description,
            schema,
            remote_name: descriptor.name,
            sensitive,
            connection,
        }
    }
}

#[async_trait]
impl Tool for McpProxyTool {
    fn name(&self) -> &str {
        &self.qualified_name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameters_schema(&self) -> Value {
        self.schema.clone()
    }

    fn sensitive(&self) -> bool {
        self.sensitive
    }

    async fn execute(&self, arguments: Value) -> Result<ToolResult, ToolError> {
        match self.connection.call_tool(&self.remote_name, arguments).await {
            Ok(text) => Ok(ToolResult::ok("", text)),
            // Tool-level failures are reported to the model so it can
            // adjust; they are not infrastructure errors.
            Err(McpError::Server { message, .. }) => Ok(ToolResult::failure("", message)),
            Err(e) => Err(ToolError::ExecutionFailed {
                tool_name: self.qualified_name.clone(),
                reason: e.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(name: &str, schema: Value) -> RemoteToolDescriptor {
        RemoteToolDescriptor {
            name: name.into(),
            description: "does things".into(),
            input_schema: schema,
        }
    }

    fn dummy_connection() -> Arc<McpConnection> {
        McpConnection::from_config(roost_config::McpServerConfig {
            name: "srv".into(),
            transport: "http".into(),
            command: None,
            args: vec![],
            env: Default::default(),
            url: Some("http://127.0.0.1:1".into()),
            headers: Default::default(),
            sensitive: false,
            enabled: true,
            request_timeout_secs: 1,
            max_reconnects: 0,
        })
    }

    #[test]
    fn qualified_name_is_namespaced() {
        let tool = McpProxyTool::new(
            dummy_connection(),
            descriptor("search", json!({"type": "object"})),
            false,
        );
        assert_eq!(tool.name(), "srv_search");
        assert!(tool.description().starts_with("[srv]"));
    }

    #[test]
    fn missing_schema_defaults_to_empty_object() {
        let tool = McpProxyTool::new(dummy_connection(), descriptor("x", Value::Null), true);
        assert_eq!(tool.parameters_schema()["type"], json!("object"));
        assert!(tool.sensitive());
    }

    #[tokio::test]
    async fn unconnected_proxy_reports_execution_failure() {
        let tool = McpProxyTool::new(
            dummy_connection(),
            descriptor("x", json!({"type": "object"})),
            false,
        );
        let err = tool.execute(json!({})).await.unwrap_err();
        assert!(matches!(err, ToolError::ExecutionFailed { .. }));
    }
}
