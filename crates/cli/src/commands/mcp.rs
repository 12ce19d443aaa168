//! `roost mcp` — inspect capability server connections.

use crate::runtime;
use roost_config::AppConfig;
use std::time::Duration;

pub async fn status() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load()?;
    if config.mcp_servers.is_empty() {
        println!("🔌 No capability servers configured.");
        println!();
        println!("   Add one to ~/.roost/config.toml:");
        println!("   [[mcp_servers]]");
        println!("   name = \"github\"");
        println!("   transport = \"stdio\"");
        println!("   command = \"npx\"");
        println!("   args = [\"-y\", \"@modelcontextprotocol/server-github\"]");
        return Ok(());
    }

    let rt = runtime::build(config).await?;
    // Give connections a moment to handshake and discover tools.
    tokio::time::sleep(Duration::from_secs(2)).await;

    println!("🔌 Capability servers:");
    for status in rt.mcp.status().await {
        println!(
            "  {:<16} {:<12} {} tools",
            status.server,
            status.state.as_str(),
            status.tools
        );
    }

    let remote: Vec<String> = rt
        .registry
        .names()
        .into_iter()
        .filter(|name| {
            rt.config
                .mcp_servers
                .iter()
                .any(|s| name.starts_with(&format!("{}_", s.name)))
        })
        .collect();
    if !remote.is_empty() {
        println!();
        println!("  Discovered tools: {}", remote.join(", "));
    }

    rt.mcp.shutdown().await;
    Ok(())
}
