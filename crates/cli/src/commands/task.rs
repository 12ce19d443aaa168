//! `roost task` — manage scheduled tasks.
//!
//! Management only touches the task table; no model, registry, or
//! capability connections are brought up for it.

use async_trait::async_trait;
use roost_config::AppConfig;
use roost_core::error::Error;
use roost_core::event::EventBus;
use roost_core::originate::{TurnOriginator, TurnRequest};
use roost_scheduler::Scheduler;
use roost_storage::{SqliteStore, TaskStore};
use std::sync::Arc;
use std::time::Duration;

/// Firing never happens from management commands; the daemon side owns
/// that. This originator exists only to satisfy the constructor.
struct InertOriginator;

#[async_trait]
impl TurnOriginator for InertOriginator {
    async fn submit_turn(&self, _request: TurnRequest) -> Result<String, Error> {
        Err(Error::Internal(
            "task management does not originate turns".into(),
        ))
    }
}

async fn open_scheduler() -> Result<Arc<Scheduler>, Box<dyn std::error::Error>> {
    let config = AppConfig::load()?;
    if let Some(parent) = std::path::Path::new(&config.database_path()).parent() {
        std::fs::create_dir_all(parent).ok();
    }
    let store: Arc<dyn TaskStore> = Arc::new(SqliteStore::new(&config.database_path()).await?);
    Ok(Scheduler::new(
        store,
        Arc::new(InertOriginator),
        Arc::new(EventBus::default()),
        Duration::from_secs(config.scheduler.heartbeat_secs),
    ))
}

pub async fn list() -> Result<(), Box<dyn std::error::Error>> {
    let scheduler = open_scheduler().await?;
    let tasks = scheduler.list().await?;

    if tasks.is_empty() {
        println!("📋 No tasks scheduled.");
        println!();
        println!("   Add one with:");
        println!("   roost task add daily_check \"daily at 9:00\" \"Summarize my pending tasks\"");
        return Ok(());
    }

    println!("📋 Tasks ({}):", tasks.len());
    println!("{:-<72}", "");
    for task in &tasks {
        let status = if task.enabled { "✅" } else { "⏸️ " };
        println!(
            "  {status} {:<20} next: {}  runs: {}",
            task.name,
            task.next_due.format("%Y-%m-%d %H:%M UTC"),
            task.run_count,
        );
    }
    Ok(())
}

pub async fn add(
    name: &str,
    schedule: &str,
    prompt: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let scheduler = open_scheduler().await?;
    match scheduler.create_task_from_str(name, prompt, schedule).await {
        Ok(task) => {
            println!(
                "✅ Task '{name}' scheduled. Next run: {}",
                task.next_due.format("%Y-%m-%d %H:%M:%S UTC")
            );
        }
        Err(e) => println!("❌ {e}"),
    }
    Ok(())
}

pub async fn remove(name: &str) -> Result<(), Box<dyn std::error::Error>> {
    let scheduler = open_scheduler().await?;
    if scheduler.remove(name).await? {
        println!("🗑️  Task '{name}' removed.");
    } else {
        println!("❌ Task '{name}' not found.");
    }
    Ok(())
}

pub async fn pause(name: &str) -> Result<(), Box<dyn std::error::Error>> {
    let scheduler = open_scheduler().await?;
    if scheduler.set_enabled(name, false).await? {
        println!("⏸️  Task '{name}' paused.");
    } else {
        println!("❌ Task '{name}' not found.");
    }
    Ok(())
}

pub async fn resume(name: &str) -> Result<(), Box<dyn std::error::Error>> {
    let scheduler = open_scheduler().await?;
    if scheduler.set_enabled(name, true).await? {
        println!("▶️  Task '{name}' resumed.");
    } else {
        println!("❌ Task '{name}' not found.");
    }
    Ok(())
}
