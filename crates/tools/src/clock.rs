//! Clock tool — current date and time.
//!
//! The smallest useful read-only tool: lets the model anchor relative
//! dates ("tomorrow", "in two hours") before scheduling anything.

use async_trait::async_trait;
use chrono::{Local, Utc};
use roost_core::error::ToolError;
use roost_core::tool::{Tool, ToolResult};

pub struct ClockTool;

#[async_trait]
impl Tool for ClockTool {
    fn name(&self) -> &str {
        "clock"
    }

    fn description(&self) -> &str {
        "Get the current date and time. Use before interpreting relative dates or scheduling tasks."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "timezone": {
                    "type": "string",
                    "description": "\"utc\" or \"local\" (default: local)"
                }
            }
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let zone = arguments["timezone"].as_str().unwrap_or("local");
        let (formatted, iso) = match zone {
            "utc" => {
                let now = Utc::now();
                (now.format("%A, %B %e %Y, %H:%M:%S UTC").to_string(), now.to_rfc3339())
            }
            "local" => {
                let now = Local::now();
                (now.format("%A, %B %e %Y, %H:%M:%S %Z").to_string(), now.to_rfc3339())
            }
            other => {
                return Err(ToolError::InvalidArguments(format!(
                    "unknown timezone '{other}', use \"utc\" or \"local\""
                )));
            }
        };

        Ok(ToolResult {
            call_id: String::new(),
            success: true,
            output: formatted,
            data: Some(serde_json::json!({ "iso": iso })),
            duration_ms: 0,
        })
    }
}
