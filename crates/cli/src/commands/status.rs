//! `roost status` — configuration summary and provider health.

use roost_config::AppConfig;
use roost_core::provider::Provider;
use roost_providers::OllamaProvider;
use std::time::Duration;

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load()?;

    println!("🪺 roost status");
    println!("{:-<48}", "");
    println!("  model:     {}", config.provider.model);
    println!("  provider:  {}", config.provider.host);
    println!("  database:  {}", config.database_path());
    println!(
        "  scheduler: {} (heartbeat {}s)",
        if config.scheduler.enabled { "enabled" } else { "disabled" },
        config.scheduler.heartbeat_secs
    );
    println!("  approval:  {}s deadline", config.approval.deadline_secs);
    println!(
        "  servers:   {} configured",
        config.mcp_servers.len()
    );

    let provider = OllamaProvider::new(&config.provider.host, Duration::from_secs(5));
    match provider.health_check().await {
        Ok(true) => println!("  health:    ✅ model endpoint reachable"),
        Ok(false) => println!("  health:    ⚠️ model endpoint responded with an error"),
        Err(e) => println!("  health:    ❌ {e}"),
    }

    Ok(())
}
