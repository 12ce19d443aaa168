//! Scheduled task domain types.
//!
//! Trigger evaluation (cron parsing, next-due computation) lives in
//! `roost-scheduler`; the data model lives here so the task store and the
//! schedule-management tools can share it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// When a task fires.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum TriggerSpec {
    /// Every `secs` seconds, measured from the previous firing.
    Interval { secs: u64 },

    /// A 5-field cron expression (minute hour dom month dow).
    Cron { expr: String },

    /// Fire once at a fixed instant, then disable.
    Once { at: DateTime<Utc> },
}

/// A scheduled task: at its due time the scheduler originates a synthetic
/// turn from `prompt` through the same path a user message takes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduledTask {
    pub id: String,

    /// Human-readable name, unique per store
    pub name: String,

    /// The conversation template: what to tell the agent when firing
    pub prompt: String,

    pub trigger: TriggerSpec,

    /// Next due instant; advances strictly forward after each firing
    pub next_due: DateTime<Utc>,

    pub enabled: bool,

    pub created_at: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_run: Option<DateTime<Utc>>,

    #[serde(default)]
    pub run_count: u64,
}

impl ScheduledTask {
    pub fn new(
        name: impl Into<String>,
        prompt: impl Into<String>,
        trigger: TriggerSpec,
        next_due: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            prompt: prompt.into(),
            trigger,
            next_due,
            enabled: true,
            created_at: Utc::now(),
            last_run: None,
            run_count: 0,
        }
    }
}
