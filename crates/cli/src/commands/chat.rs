//! `roost chat` — interactive chat or single-message mode.
//!
//! Streams model output as it arrives. Approval prompts (from this chat
//! or from a scheduled task firing in the background) are rendered from
//! the event bus; the user answers inline with `approve <id>` /
//! `deny <id>`, which works even while a turn is still running — the
//! turn is parked at the gate waiting for exactly that input.

use crate::runtime::{self, Runtime};
use roost_agent::AgentStreamEvent;
use roost_channels::cli::{CliInput, classify_line};
use roost_config::AppConfig;
use roost_core::event::DomainEvent;
use roost_core::message::ConversationOrigin;
use roost_core::originate::TurnRequest;
use std::io::Write;
use std::sync::Arc;
use tokio::io::AsyncBufReadExt;
use tokio::sync::mpsc;

pub async fn run(message: Option<String>) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load()?;
    let rt = Arc::new(runtime::build(config).await?);

    if rt.config.scheduler.enabled {
        rt.scheduler.start();
    }
    spawn_approval_renderer(&rt);

    let origin = ConversationOrigin::new("cli", "terminal");

    match message {
        Some(message) => {
            run_turn(rt.clone(), origin, message).await;
        }
        None => {
            println!("🪺 roost — chat with your local agent ('exit' to quit)");
            println!("   tools: {}", rt.registry.names().join(", "));
            interactive(rt.clone(), origin).await;
        }
    }

    rt.mcp.shutdown().await;
    Ok(())
}

async fn interactive(rt: Arc<Runtime>, origin: ConversationOrigin) {
    let stdin = tokio::io::stdin();
    let reader = tokio::io::BufReader::new(stdin);
    let mut lines = reader.lines();

    loop {
        prompt();
        let line = match lines.next_line().await {
            Ok(Some(line)) => line.trim().to_string(),
            _ => break,
        };
        if line.is_empty() {
            continue;
        }

        match classify_line(&line) {
            CliInput::Exit => break,
            CliInput::Decision {
                correlation_id,
                approved,
            } => resolve_decision(&rt, &correlation_id, approved).await,
            CliInput::Turn(content) => {
                // Run the turn in the background so approval decisions
                // can still be typed while it is parked at the gate.
                let mut turn = tokio::spawn(run_turn(rt.clone(), origin.clone(), content));
                loop {
                    tokio::select! {
                        _ = &mut turn => break,
                        line = lines.next_line() => {
                            let Ok(Some(line)) = line else { continue };
                            match classify_line(&line) {
                                CliInput::Decision { correlation_id, approved } => {
                                    resolve_decision(&rt, &correlation_id, approved).await;
                                }
                                CliInput::Exit => {
                                    turn.abort();
                                    return;
                                }
                                CliInput::Turn(_) => {
                                    println!("⏳ still working on the previous message...");
                                }
                            }
                        }
                    }
                }
            }
        }
    }
}

async fn resolve_decision(rt: &Runtime, correlation_id: &str, approved: bool) {
    match rt.gate.resolve(correlation_id, approved).await {
        Ok(()) => println!(
            "{} {correlation_id}",
            if approved { "✅ approved" } else { "❌ denied" }
        ),
        Err(e) => println!("⚠️  {e}"),
    }
}

/// Run one turn, rendering stream events as they arrive.
async fn run_turn(rt: Arc<Runtime>, origin: ConversationOrigin, content: String) {
    let (tx, mut rx) = mpsc::channel(64);

    let printer = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            match event {
                AgentStreamEvent::Chunk { content } => {
                    print!("{content}");
                    let _ = std::io::stdout().flush();
                }
                AgentStreamEvent::ToolCall { name, sensitive, .. } => {
                    if sensitive {
                        println!("\n🔐 {name} (waiting for approval)");
                    } else {
                        println!("\n🔧 {name}");
                    }
                }
                AgentStreamEvent::ToolResult { name, success, .. } => {
                    println!("{} {name}", if success { "  ✓" } else { "  ✗" });
                }
                AgentStreamEvent::Done { .. } => println!(),
                _ => {}
            }
        }
    });

    let result = rt
        .service
        .submit_turn_streaming(TurnRequest::new(origin, content), Some(tx), None)
        .await;
    let _ = printer.await;

    if let Err(e) = result {
        println!("⚠️  {e}");
    }
}

/// Render approval prompts from anywhere — this chat, or a scheduled
/// task that fired in the background.
fn spawn_approval_renderer(rt: &Arc<Runtime>) {
    let mut events = rt.events.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            if let DomainEvent::ApprovalRequested {
                correlation_id,
                summary,
                deadline,
                ..
            } = event.as_ref()
            {
                println!(
                    "\n🔐 Approval required: {summary}\n   expires {}\n   reply `approve {correlation_id}` or `deny {correlation_id}`",
                    deadline.format("%H:%M:%S"),
                );
            }
        }
    });
}

fn prompt() {
    print!("> ");
    let _ = std::io::stdout().flush();
}
