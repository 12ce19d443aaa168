//! Built-in tool implementations for Roost.
//!
//! Heavy capabilities live behind MCP servers; the built-ins here are the
//! ones the runtime itself provides: a clock, and the model-facing side
//! of the scheduler definition interface.

pub mod clock;
pub mod schedule;

pub use clock::ClockTool;
pub use schedule::{ScheduleCreateTool, ScheduleListTool, ScheduleToggleTool};

use roost_core::tool::ToolRegistry;
use roost_scheduler::Scheduler;
use std::sync::Arc;
use tracing::warn;

/// Register every built-in tool into `registry`.
///
/// Conflicts (e.g. from a misconfigured MCP server that registered first)
/// are logged and skipped; the first registration always wins.
pub fn register_builtins(registry: &ToolRegistry, scheduler: Arc<Scheduler>) {
    let tools: Vec<Arc<dyn roost_core::tool::Tool>> = vec![
        Arc::new(ClockTool),
        Arc::new(ScheduleCreateTool::new(scheduler.clone())),
        Arc::new(ScheduleListTool::new(scheduler.clone())),
        Arc::new(ScheduleToggleTool::new(scheduler)),
    ];
    for tool in tools {
        let name = tool.name().to_string();
        if let Err(e) = registry.register(tool) {
            warn!(tool = %name, error = %e, "Skipping built-in tool registration");
        }
    }
}
