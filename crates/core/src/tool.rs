//! Tool contract and registry — the uniform invocation interface for any
//! callable capability, local or proxied from an external server.
//!
//! The registry is process-wide and shared: built-in tools register once at
//! startup, capability-server tools register when their connection becomes
//! ready and are revoked atomically when it drops. The agent loop never
//! branches on where a tool lives — it only sees the `Tool` trait.

use crate::error::ToolError;
use crate::provider::ToolDefinition;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

/// Per-call timeout applied to every invocation unless overridden.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// A request to execute a tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    /// Correlation id, unique within the conversation turn
    pub id: String,

    /// Qualified name of the tool to execute
    pub name: String,

    /// Arguments as a JSON value
    pub arguments: serde_json::Value,
}

/// The result of a tool execution. Produced exactly once per ToolCall,
/// including synthesized results for denied, expired, or timed-out calls.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    /// The correlation id this result answers
    pub call_id: String,

    /// Whether the tool executed successfully
    pub success: bool,

    /// The output content (or error detail)
    pub output: String,

    /// Optional structured data
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,

    /// Wall-clock execution duration, measured from dispatch
    #[serde(default)]
    pub duration_ms: u64,
}

impl ToolResult {
    /// A successful result.
    pub fn ok(call_id: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            call_id: call_id.into(),
            success: true,
            output: output.into(),
            data: None,
            duration_ms: 0,
        }
    }

    /// A failed result carrying the error detail as output.
    pub fn failure(call_id: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            call_id: call_id.into(),
            success: false,
            output: output.into(),
            data: None,
            duration_ms: 0,
        }
    }
}

/// The core Tool trait, implemented uniformly by built-in tools and by
/// proxies for externally discovered ones.
#[async_trait]
pub trait Tool: Send + Sync {
    /// The unique qualified name of this tool.
    fn name(&self) -> &str;

    /// A description of what this tool does (sent to the model).
    fn description(&self) -> &str;

    /// JSON Schema describing this tool's parameters.
    fn parameters_schema(&self) -> serde_json::Value;

    /// Whether invocations have real-world side effects and must pass the
    /// approval gate before executing. Defaults to read-only.
    fn sensitive(&self) -> bool {
        false
    }

    /// Execute the tool with the given (already validated) arguments.
    async fn execute(
        &self,
        arguments: serde_json::Value,
    ) -> std::result::Result<ToolResult, ToolError>;

    /// Convert this tool into a ToolDefinition for the model.
    fn to_definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters_schema(),
            sensitive: self.sensitive(),
        }
    }
}

/// The process-wide tool registry.
///
/// Registration and revocation happen inside single write-lock critical
/// sections, so concurrent `definitions()`/`execute()` readers never
/// observe a descriptor whose backing connection is mid-teardown.
pub struct ToolRegistry {
    tools: RwLock<HashMap<String, Arc<dyn Tool>>>,
    call_timeout: Duration,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::with_call_timeout(DEFAULT_CALL_TIMEOUT)
    }

    pub fn with_call_timeout(call_timeout: Duration) -> Self {
        Self {
            tools: RwLock::new(HashMap::new()),
            call_timeout,
        }
    }

    /// Register a tool.
    ///
    /// A duplicate name fails with `RegistrationConflict`; the existing
    /// registration stays active, the newer one is rejected.
    pub fn register(&self, tool: Arc<dyn Tool>) -> std::result::Result<(), ToolError> {
        let name = tool.name().to_string();
        let mut tools = self.tools.write().expect("tool registry poisoned");
        if tools.contains_key(&name) {
            tracing::warn!(tool = %name, "Rejecting duplicate tool registration");
            return Err(ToolError::RegistrationConflict(name));
        }
        tools.insert(name, tool);
        Ok(())
    }

    /// Remove a single tool by name. Returns whether it was present.
    pub fn remove(&self, name: &str) -> bool {
        self.tools
            .write()
            .expect("tool registry poisoned")
            .remove(name)
            .is_some()
    }

    /// Atomically revoke every tool published by one provider (all names
    /// under the `<provider>_` prefix). Returns how many were removed.
    pub fn remove_provider(&self, provider: &str) -> usize {
        let prefix = format!("{provider}_");
        let mut tools = self.tools.write().expect("tool registry poisoned");
        let before = tools.len();
        tools.retain(|name, _| !name.starts_with(&prefix));
        before - tools.len()
    }

    /// Get a tool by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools
            .read()
            .expect("tool registry poisoned")
            .get(name)
            .cloned()
    }

    /// Get all tool definitions (for sending to the model).
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools
            .read()
            .expect("tool registry poisoned")
            .values()
            .map(|t| t.to_definition())
            .collect()
    }

    /// Whether the named tool requires approval. `None` if unknown.
    pub fn is_sensitive(&self, name: &str) -> Option<bool> {
        self.tools
            .read()
            .expect("tool registry poisoned")
            .get(name)
            .map(|t| t.sensitive())
    }

    /// List all registered tool names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .tools
            .read()
            .expect("tool registry poisoned")
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }

    /// Execute a tool call: look up the tool, validate arguments against
    /// its input schema, and run it under the per-call timeout.
    pub async fn execute(&self, call: &ToolCall) -> std::result::Result<ToolResult, ToolError> {
        let tool = self
            .get(&call.name)
            .ok_or_else(|| ToolError::NotFound(call.name.clone()))?;

        validate_arguments(&tool.parameters_schema(), &call.arguments)?;

        let start = std::time::Instant::now();
        match tokio::time::timeout(self.call_timeout, tool.execute(call.arguments.clone())).await {
            Ok(Ok(mut result)) => {
                result.call_id = call.id.clone();
                result.duration_ms = start.elapsed().as_millis() as u64;
                Ok(result)
            }
            Ok(Err(e)) => Err(e),
            Err(_) => Err(ToolError::Timeout {
                tool_name: call.name.clone(),
                timeout_secs: self.call_timeout.as_secs(),
            }),
        }
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Validate `args` against a JSON-Schema-style parameter description:
/// the payload must be an object, all `required` keys must be present,
/// and declared property types must match. Unknown extra keys pass
/// through untouched — the tool itself decides what to do with them.
pub fn validate_arguments(
    schema: &serde_json::Value,
    args: &serde_json::Value,
) -> std::result::Result<(), ToolError> {
    let Some(schema_obj) = schema.as_object() else {
        return Ok(());
    };
    if schema_obj.get("type").and_then(|t| t.as_str()) != Some("object") {
        return Ok(());
    }

    let Some(args_obj) = args.as_object() else {
        return Err(ToolError::InvalidArguments(
            "arguments must be a JSON object".into(),
        ));
    };

    if let Some(required) = schema_obj.get("required").and_then(|r| r.as_array()) {
        for key in required.iter().filter_map(|k| k.as_str()) {
            if !args_obj.contains_key(key) {
                return Err(ToolError::InvalidArguments(format!(
                    "missing required argument '{key}'"
                )));
            }
        }
    }

    if let Some(props) = schema_obj.get("properties").and_then(|p| p.as_object()) {
        for (key, value) in args_obj {
            let Some(expected) = props
                .get(key)
                .and_then(|p| p.get("type"))
                .and_then(|t| t.as_str())
            else {
                continue;
            };
            if !type_matches(expected, value) {
                return Err(ToolError::InvalidArguments(format!(
                    "argument '{key}' must be of type {expected}"
                )));
            }
        }
    }

    Ok(())
}

fn type_matches(expected: &str, value: &serde_json::Value) -> bool {
    match expected {
        "string" => value.is_string(),
        "number" => value.is_number(),
        "integer" => value.is_i64() || value.is_u64(),
        "boolean" => value.is_boolean(),
        "array" => value.is_array(),
        "object" => value.is_object(),
        "null" => value.is_null(),
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }
        fn description(&self) -> &str {
            "Echoes back the input"
        }
        fn parameters_schema(&self) -> serde_json::Value {
            json!({
                "type": "object",
                "properties": {
                    "text": { "type": "string" }
                },
                "required": ["text"]
            })
        }
        async fn execute(
            &self,
            arguments: serde_json::Value,
        ) -> std::result::Result<ToolResult, ToolError> {
            let text = arguments["text"].as_str().unwrap_or("").to_string();
            Ok(ToolResult::ok("", text))
        }
    }

    struct SlowTool;

    #[async_trait]
    impl Tool for SlowTool {
        fn name(&self) -> &str {
            "slow"
        }
        fn description(&self) -> &str {
            "Sleeps longer than the call timeout"
        }
        fn parameters_schema(&self) -> serde_json::Value {
            json!({"type": "object", "properties": {}})
        }
        async fn execute(
            &self,
            _arguments: serde_json::Value,
        ) -> std::result::Result<ToolResult, ToolError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(ToolResult::ok("", "never"))
        }
    }

    fn registry_with_echo() -> ToolRegistry {
        let registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool)).unwrap();
        registry
    }

    #[test]
    fn register_and_lookup() {
        let registry = registry_with_echo();
        assert!(registry.get("echo").is_some());
        assert!(registry.get("nonexistent").is_none());
    }

    #[test]
    fn duplicate_registration_rejected_first_wins() {
        struct OtherEcho;

        #[async_trait]
        impl Tool for OtherEcho {
            fn name(&self) -> &str {
                "echo"
            }
            fn description(&self) -> &str {
                "A different echo"
            }
            fn parameters_schema(&self) -> serde_json::Value {
                json!({"type": "object"})
            }
            async fn execute(
                &self,
                _arguments: serde_json::Value,
            ) -> std::result::Result<ToolResult, ToolError> {
                Ok(ToolResult::ok("", "other"))
            }
        }

        let registry = registry_with_echo();
        let err = registry.register(Arc::new(OtherEcho)).unwrap_err();
        assert!(matches!(err, ToolError::RegistrationConflict(name) if name == "echo"));

        // The first registration remains active.
        let def = &registry.definitions()[0];
        assert_eq!(def.description, "Echoes back the input");
    }

    #[test]
    fn remove_provider_revokes_all_its_tools() {
        struct Named(&'static str);

        #[async_trait]
        impl Tool for Named {
            fn name(&self) -> &str {
                self.0
            }
            fn description(&self) -> &str {
                "remote"
            }
            fn parameters_schema(&self) -> serde_json::Value {
                json!({"type": "object"})
            }
            async fn execute(
                &self,
                _arguments: serde_json::Value,
            ) -> std::result::Result<ToolResult, ToolError> {
                Ok(ToolResult::ok("", ""))
            }
        }

        let registry = registry_with_echo();
        registry.register(Arc::new(Named("github_search"))).unwrap();
        registry.register(Arc::new(Named("github_get_issue"))).unwrap();
        registry.register(Arc::new(Named("weather_lookup"))).unwrap();

        let removed = registry.remove_provider("github");
        assert_eq!(removed, 2);
        assert!(registry.get("github_search").is_none());
        assert!(registry.get("github_get_issue").is_none());
        // Unrelated tools are untouched.
        assert!(registry.get("weather_lookup").is_some());
        assert!(registry.get("echo").is_some());
    }

    #[tokio::test]
    async fn execute_tool() {
        let registry = registry_with_echo();
        let call = ToolCall {
            id: "call_1".into(),
            name: "echo".into(),
            arguments: json!({"text": "hello world"}),
        };
        let result = registry.execute(&call).await.unwrap();
        assert!(result.success);
        assert_eq!(result.output, "hello world");
        assert_eq!(result.call_id, "call_1");
    }

    #[tokio::test]
    async fn execute_missing_tool() {
        let registry = ToolRegistry::new();
        let call = ToolCall {
            id: "call_1".into(),
            name: "nonexistent".into(),
            arguments: json!({}),
        };
        let err = registry.execute(&call).await.unwrap_err();
        assert!(matches!(err, ToolError::NotFound(_)));
    }

    #[tokio::test]
    async fn execute_rejects_schema_violation_before_dispatch() {
        let registry = registry_with_echo();
        // Missing the required "text" argument.
        let call = ToolCall {
            id: "call_1".into(),
            name: "echo".into(),
            arguments: json!({}),
        };
        let err = registry.execute(&call).await.unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));

        // Wrong type for "text".
        let call = ToolCall {
            id: "call_2".into(),
            name: "echo".into(),
            arguments: json!({"text": 42}),
        };
        let err = registry.execute(&call).await.unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn execute_times_out() {
        let registry = ToolRegistry::with_call_timeout(Duration::from_secs(5));
        registry.register(Arc::new(SlowTool)).unwrap();

        let call = ToolCall {
            id: "call_1".into(),
            name: "slow".into(),
            arguments: json!({}),
        };
        let err = registry.execute(&call).await.unwrap_err();
        assert!(matches!(
            err,
            ToolError::Timeout { timeout_secs: 5, .. }
        ));
    }

    #[test]
    fn validate_arguments_allows_extra_keys() {
        let schema = json!({
            "type": "object",
            "properties": { "a": { "type": "string" } },
            "required": ["a"]
        });
        let args = json!({"a": "x", "extra": true});
        assert!(validate_arguments(&schema, &args).is_ok());
    }

    #[test]
    fn validate_arguments_non_object_schema_passes() {
        assert!(validate_arguments(&json!(null), &json!({"any": 1})).is_ok());
    }

    #[test]
    fn definitions_carry_sensitivity() {
        struct Mutating;

        #[async_trait]
        impl Tool for Mutating {
            fn name(&self) -> &str {
                "send_payment"
            }
            fn description(&self) -> &str {
                "Sends money"
            }
            fn parameters_schema(&self) -> serde_json::Value {
                json!({"type": "object"})
            }
            fn sensitive(&self) -> bool {
                true
            }
            async fn execute(
                &self,
                _arguments: serde_json::Value,
            ) -> std::result::Result<ToolResult, ToolError> {
                Ok(ToolResult::ok("", "sent"))
            }
        }

        let registry = ToolRegistry::new();
        registry.register(Arc::new(Mutating)).unwrap();
        let defs = registry.definitions();
        assert!(defs[0].sensitive);
        assert_eq!(registry.is_sensitive("send_payment"), Some(true));
    }
}
