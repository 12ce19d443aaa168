//! Runtime wiring: build the orchestration context once at startup and
//! hand explicit references to every component — no ambient globals.

use roost_agent::{AgentLoop, AgentService};
use roost_approval::ApprovalGate;
use roost_config::AppConfig;
use roost_core::event::EventBus;
use roost_core::originate::TurnOriginator;
use roost_core::tool::ToolRegistry;
use roost_mcp::McpManager;
use roost_providers::OllamaProvider;
use roost_scheduler::Scheduler;
use roost_storage::{ConversationStore, SqliteStore, TaskStore};
use std::sync::Arc;
use std::time::Duration;

pub struct Runtime {
    pub config: AppConfig,
    pub events: Arc<EventBus>,
    pub registry: Arc<ToolRegistry>,
    pub gate: Arc<ApprovalGate>,
    pub service: Arc<AgentService>,
    pub scheduler: Arc<Scheduler>,
    pub mcp: Arc<McpManager>,
}

/// Build the full runtime from configuration. Capability server
/// connections start in the background; tools appear in the registry as
/// each server becomes ready.
pub async fn build(config: AppConfig) -> Result<Runtime, Box<dyn std::error::Error>> {
    let events = Arc::new(EventBus::default());
    let registry = Arc::new(ToolRegistry::with_call_timeout(Duration::from_secs(
        config.agent.tool_timeout_secs,
    )));
    let gate = ApprovalGate::new(
        Duration::from_secs(config.approval.deadline_secs),
        events.clone(),
    );

    if let Some(parent) = std::path::Path::new(&config.database_path()).parent() {
        std::fs::create_dir_all(parent).ok();
    }
    let store = Arc::new(SqliteStore::new(&config.database_path()).await?);

    let provider = Arc::new(OllamaProvider::new(
        &config.provider.host,
        Duration::from_secs(config.provider.request_timeout_secs),
    ));

    let mut agent = AgentLoop::new(
        provider,
        &config.provider.model,
        registry.clone(),
        gate.clone(),
        events.clone(),
    )
    .with_temperature(config.provider.temperature)
    .with_max_rounds(config.agent.max_rounds)
    .with_system_prompt(&config.agent.system_prompt);
    if let Some(max_tokens) = config.provider.max_tokens {
        agent = agent.with_max_tokens(max_tokens);
    }

    let conversations: Arc<dyn ConversationStore> = store.clone();
    let service = AgentService::new(Arc::new(agent), conversations);

    let tasks: Arc<dyn TaskStore> = store.clone();
    let originator: Arc<dyn TurnOriginator> = service.clone();
    let scheduler = Scheduler::new(
        tasks,
        originator,
        events.clone(),
        Duration::from_secs(config.scheduler.heartbeat_secs),
    );

    roost_tools::register_builtins(&registry, scheduler.clone());

    let mcp = McpManager::new(registry.clone(), events.clone());
    mcp.start(&config.mcp_servers).await;

    Ok(Runtime {
        config,
        events,
        registry,
        gate,
        service,
        scheduler,
        mcp,
    })
}
