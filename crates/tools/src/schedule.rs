//! Schedule-management tools — the model's access to the scheduler
//! definition interface.
//!
//! `schedule_create` takes the same natural schedule strings the CLI
//! accepts ("every 30 minutes", "daily at 9:00", "in 5 minutes", raw
//! cron). A task created here fires back into the agent through the
//! normal turn path, approvals included.

use async_trait::async_trait;
use roost_core::error::ToolError;
use roost_core::tool::{Tool, ToolResult};
use roost_scheduler::Scheduler;
use std::sync::Arc;

pub struct ScheduleCreateTool {
    scheduler: Arc<Scheduler>,
}

impl ScheduleCreateTool {
    pub fn new(scheduler: Arc<Scheduler>) -> Self {
        Self { scheduler }
    }
}

#[async_trait]
impl Tool for ScheduleCreateTool {
    fn name(&self) -> &str {
        "schedule_create"
    }

    fn description(&self) -> &str {
        "Schedule a recurring or one-time task. The prompt will be sent back to you at the \
         scheduled time. Schedules: 'every N minutes/hours', 'daily at HH:MM', 'in N minutes', \
         or a 5-field cron expression."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "name": {
                    "type": "string",
                    "description": "Short unique name for the task"
                },
                "schedule": {
                    "type": "string",
                    "description": "When to run, e.g. 'every 30 minutes' or 'daily at 9:00'"
                },
                "prompt": {
                    "type": "string",
                    "description": "What to do when the task fires"
                }
            },
            "required": ["name", "schedule", "prompt"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let name = arguments["name"].as_str().unwrap_or_default();
        let schedule = arguments["schedule"].as_str().unwrap_or_default();
        let prompt = arguments["prompt"].as_str().unwrap_or_default();

        match self.scheduler.create_task_from_str(name, prompt, schedule).await {
            Ok(task) => Ok(ToolResult::ok(
                "",
                format!(
                    "Scheduled task '{}' ({}). Next run: {}",
                    task.name,
                    schedule,
                    task.next_due.format("%Y-%m-%d %H:%M:%S UTC")
                ),
            )),
            Err(e) => Ok(ToolResult::failure("", format!("Could not schedule: {e}"))),
        }
    }
}

pub struct ScheduleListTool {
    scheduler: Arc<Scheduler>,
}

impl ScheduleListTool {
    pub fn new(scheduler: Arc<Scheduler>) -> Self {
        Self { scheduler }
    }
}

#[async_trait]
impl Tool for ScheduleListTool {
    fn name(&self) -> &str {
        "schedule_list"
    }

    fn description(&self) -> &str {
        "List all scheduled tasks with their next run time and enabled state."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({"type": "object", "properties": {}})
    }

    async fn execute(&self, _arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let tasks = self
            .scheduler
            .list()
            .await
            .map_err(|e| ToolError::ExecutionFailed {
                tool_name: "schedule_list".into(),
                reason: e.to_string(),
            })?;

        if tasks.is_empty() {
            return Ok(ToolResult::ok("", "No scheduled tasks."));
        }

        let lines: Vec<String> = tasks
            .iter()
            .map(|t| {
                format!(
                    "- {} [{}] next: {} (runs: {})",
                    t.name,
                    if t.enabled { "enabled" } else { "disabled" },
                    t.next_due.format("%Y-%m-%d %H:%M UTC"),
                    t.run_count,
                )
            })
            .collect();
        Ok(ToolResult::ok("", lines.join("\n")))
    }
}

pub struct ScheduleToggleTool {
    scheduler: Arc<Scheduler>,
}

impl ScheduleToggleTool {
    pub fn new(scheduler: Arc<Scheduler>) -> Self {
        Self { scheduler }
    }
}

#[async_trait]
impl Tool for ScheduleToggleTool {
    fn name(&self) -> &str {
        "schedule_toggle"
    }

    fn description(&self) -> &str {
        "Enable or disable a scheduled task by name. Disabling does not interrupt a run already in progress."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "name": { "type": "string", "description": "Task name" },
                "enabled": { "type": "boolean", "description": "true to enable, false to disable" }
            },
            "required": ["name", "enabled"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let name = arguments["name"].as_str().unwrap_or_default();
        let enabled = arguments["enabled"].as_bool().unwrap_or(true);

        let found = self
            .scheduler
            .set_enabled(name, enabled)
            .await
            .map_err(|e| ToolError::ExecutionFailed {
                tool_name: "schedule_toggle".into(),
                reason: e.to_string(),
            })?;

        if found {
            Ok(ToolResult::ok(
                "",
                format!(
                    "Task '{name}' is now {}.",
                    if enabled { "enabled" } else { "disabled" }
                ),
            ))
        } else {
            Ok(ToolResult::failure("", format!("No task named '{name}'.")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use roost_core::error::Error;
    use roost_core::event::EventBus;
    use roost_core::originate::{TurnOriginator, TurnRequest};
    use roost_storage::InMemoryStore;
    use std::time::Duration;

    struct NullOriginator;

    #[async_trait]
    impl TurnOriginator for NullOriginator {
        async fn submit_turn(&self, _request: TurnRequest) -> Result<String, Error> {
            Ok(String::new())
        }
    }

    fn scheduler() -> Arc<Scheduler> {
        Scheduler::new(
            Arc::new(InMemoryStore::new()),
            Arc::new(NullOriginator),
            Arc::new(EventBus::default()),
            Duration::from_secs(5),
        )
    }

    #[tokio::test]
    async fn create_then_list_then_toggle() {
        let scheduler = scheduler();

        let create = ScheduleCreateTool::new(scheduler.clone());
        let result = create
            .execute(serde_json::json!({
                "name": "briefing",
                "schedule": "every 30 minutes",
                "prompt": "Summarize my day"
            }))
            .await
            .unwrap();
        assert!(result.success, "{}", result.output);
        assert!(result.output.contains("briefing"));

        let list = ScheduleListTool::new(scheduler.clone());
        let result = list.execute(serde_json::json!({})).await.unwrap();
        assert!(result.output.contains("briefing"));
        assert!(result.output.contains("enabled"));

        let toggle = ScheduleToggleTool::new(scheduler.clone());
        let result = toggle
            .execute(serde_json::json!({"name": "briefing", "enabled": false}))
            .await
            .unwrap();
        assert!(result.success);

        let result = list.execute(serde_json::json!({})).await.unwrap();
        assert!(result.output.contains("disabled"));
    }

    #[tokio::test]
    async fn bad_schedule_string_is_a_tool_failure_not_an_error() {
        let create = ScheduleCreateTool::new(scheduler());
        let result = create
            .execute(serde_json::json!({
                "name": "x",
                "schedule": "whenever",
                "prompt": "p"
            }))
            .await
            .unwrap();
        assert!(!result.success);
        assert!(result.output.contains("Could not schedule"));
    }

    #[tokio::test]
    async fn toggle_unknown_task_fails_cleanly() {
        let toggle = ScheduleToggleTool::new(scheduler());
        let result = toggle
            .execute(serde_json::json!({"name": "ghost", "enabled": true}))
            .await
            .unwrap();
        assert!(!result.success);
    }

    #[tokio::test]
    async fn empty_list_message() {
        let list = ScheduleListTool::new(scheduler());
        let result = list.execute(serde_json::json!({})).await.unwrap();
        assert_eq!(result.output, "No scheduled tasks.");
    }
}
