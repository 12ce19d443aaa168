//! Roost CLI — the main entry point.
//!
//! Commands:
//! - `chat`   — Interactive chat or single-message mode
//! - `task`   — Manage scheduled tasks
//! - `mcp`    — Inspect capability server connections
//! - `status` — Show configuration and provider health

use clap::{Parser, Subcommand};

mod commands;
mod runtime;

#[derive(Parser)]
#[command(
    name = "roost",
    about = "Roost — a local-first personal agent",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Chat with the agent
    Chat {
        /// Send a single message instead of entering interactive mode
        #[arg(short, long)]
        message: Option<String>,
    },

    /// Manage scheduled tasks
    Task {
        #[command(subcommand)]
        action: TaskAction,
    },

    /// Inspect capability server connections
    Mcp {
        #[command(subcommand)]
        action: McpAction,
    },

    /// Show configuration and provider health
    Status,
}

#[derive(Subcommand)]
enum TaskAction {
    /// List all tasks
    List,
    /// Add a task: name, schedule ("every 30 minutes", "daily at 9:00",
    /// cron), and the prompt to run
    Add {
        name: String,
        schedule: String,
        prompt: String,
    },
    /// Remove a task by name
    Remove { name: String },
    /// Pause a task (future firings only; an in-flight run completes)
    Pause { name: String },
    /// Resume a paused task
    Resume { name: String },
}

#[derive(Subcommand)]
enum McpAction {
    /// Connect to the configured servers and show their state and tools
    Status,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();

    match cli.command {
        Commands::Chat { message } => commands::chat::run(message).await?,
        Commands::Task { action } => match action {
            TaskAction::List => commands::task::list().await?,
            TaskAction::Add {
                name,
                schedule,
                prompt,
            } => commands::task::add(&name, &schedule, &prompt).await?,
            TaskAction::Remove { name } => commands::task::remove(&name).await?,
            TaskAction::Pause { name } => commands::task::pause(&name).await?,
            TaskAction::Resume { name } => commands::task::resume(&name).await?,
        },
        Commands::Mcp { action } => match action {
            McpAction::Status => commands::mcp::status().await?,
        },
        Commands::Status => commands::status::run().await?,
    }

    Ok(())
}
