//! JSON-RPC 2.0 envelope helpers and MCP payload types.
//!
//! Requests carry monotonically increasing numeric ids; responses are
//! correlated back by that id. An `error` member in a response is an
//! application-level server error scoped to that one call.

use roost_core::error::McpError;
use serde::Deserialize;
use serde_json::{Value, json};

/// Build a JSON-RPC request envelope.
pub fn request(id: u64, method: &str, params: Value) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "method": method,
        "params": params,
    })
}

/// The `initialize` handshake parameters.
pub fn initialize_params() -> Value {
    json!({
        "protocolVersion": "2024-11-05",
        "clientInfo": {
            "name": "roost",
            "version": env!("CARGO_PKG_VERSION"),
        },
        "capabilities": {
            "tools": {}
        }
    })
}

/// The correlation id of a response payload, if any.
pub fn response_id(payload: &Value) -> Option<u64> {
    match payload.get("id") {
        Some(Value::Number(num)) => num.as_u64(),
        Some(Value::String(text)) => text.parse::<u64>().ok(),
        _ => None,
    }
}

/// Unwrap a JSON-RPC response: an `error` member becomes `McpError::Server`,
/// a missing `result` is a protocol violation.
pub fn extract_result(payload: Value) -> Result<Value, McpError> {
    if let Some(error) = payload.get("error") {
        let code = error.get("code").and_then(|c| c.as_i64()).unwrap_or(0);
        let message = error
            .get("message")
            .and_then(|m| m.as_str())
            .unwrap_or("unknown server error")
            .to_string();
        return Err(McpError::Server { code, message });
    }
    match payload.get("result") {
        Some(result) => Ok(result.clone()),
        None => Err(McpError::Protocol("response has no result".into())),
    }
}

/// One tool as described by `tools/list`.
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteToolDescriptor {
    pub name: String,

    #[serde(default)]
    pub description: String,

    #[serde(default, alias = "inputSchema")]
    pub input_schema: Value,
}

#[derive(Debug, Deserialize)]
pub struct ToolListResponse {
    #[serde(default)]
    pub tools: Vec<RemoteToolDescriptor>,
}

/// Flatten a `tools/call` result into the text the model sees.
///
/// MCP results carry a `content` array of typed items; we join the text
/// items. `isError: true` marks a tool-level failure (still a valid
/// response — not a protocol error).
pub fn flatten_call_result(result: &Value) -> (String, bool) {
    let is_error = result
        .get("isError")
        .and_then(|e| e.as_bool())
        .unwrap_or(false);

    let text = match result.get("content").and_then(|c| c.as_array()) {
        Some(items) => items
            .iter()
            .filter_map(|item| item.get("text").and_then(|t| t.as_str()))
            .collect::<Vec<_>>()
            .join("\n"),
        None => result.to_string(),
    };

    (text, is_error)
}
