//! CLI channel — interactive terminal chat.
//!
//! The simplest adapter: reads lines from stdin, writes responses to
//! stdout. Approval decisions are ordinary input lines (`approve <id>`,
//! `deny <id>`), parsed here so the chat command can route them to the
//! gate instead of the model.

use async_trait::async_trait;
use roost_core::channel::{Channel, ChannelMessage};
use roost_core::error::ChannelError;
use tokio::io::{self, AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

/// What one input line means.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CliInput {
    /// A normal chat turn
    Turn(String),
    /// An approval decision for a pending request
    Decision { correlation_id: String, approved: bool },
    /// The user asked to leave
    Exit,
}

/// Classify a line of terminal input.
pub fn classify_line(line: &str) -> CliInput {
    let trimmed = line.trim();
    if matches!(trimmed, "exit" | "quit" | "/exit" | "/quit" | ":q") {
        return CliInput::Exit;
    }

    let mut parts = trimmed.split_whitespace();
    match (parts.next(), parts.next(), parts.next()) {
        (Some("approve"), Some(id), None) => CliInput::Decision {
            correlation_id: id.to_string(),
            approved: true,
        },
        (Some("deny"), Some(id), None) => CliInput::Decision {
            correlation_id: id.to_string(),
            approved: false,
        },
        _ => CliInput::Turn(trimmed.to_string()),
    }
}

/// Interactive CLI channel.
pub struct CliChannel {
    session: String,
}

impl CliChannel {
    pub fn new(session: impl Into<String>) -> Self {
        Self {
            session: session.into(),
        }
    }
}

impl Default for CliChannel {
    fn default() -> Self {
        Self::new("terminal")
    }
}

#[async_trait]
impl Channel for CliChannel {
    fn name(&self) -> &str {
        "cli"
    }

    async fn start(
        &self,
    ) -> Result<mpsc::Receiver<Result<ChannelMessage, ChannelError>>, ChannelError> {
        let (tx, rx) = mpsc::channel(32);
        let session = self.session.clone();

        tokio::spawn(async move {
            let stdin = io::stdin();
            let reader = BufReader::new(stdin);
            let mut lines = reader.lines();

            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        let line = line.trim().to_string();
                        if line.is_empty() {
                            continue;
                        }
                        if classify_line(&line) == CliInput::Exit {
                            break;
                        }

                        let msg = ChannelMessage {
                            sender_id: "local_user".into(),
                            content: line,
                            session: session.clone(),
                        };
                        if tx.send(Ok(msg)).await.is_err() {
                            break;
                        }
                    }
                    Ok(None) => break, // EOF (Ctrl+D)
                    Err(e) => {
                        let _ = tx
                            .send(Err(ChannelError::ConnectionLost(e.to_string())))
                            .await;
                        break;
                    }
                }
            }
        });

        Ok(rx)
    }

    async fn send(&self, _session: &str, content: &str) -> Result<(), ChannelError> {
        println!("{content}");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_properties() {
        let ch = CliChannel::default();
        assert_eq!(ch.name(), "cli");
    }

    #[test]
    fn classifies_exit_commands() {
        assert_eq!(classify_line("exit"), CliInput::Exit);
        assert_eq!(classify_line(" /quit "), CliInput::Exit);
        assert_eq!(classify_line(":q"), CliInput::Exit);
    }

    #[test]
    fn classifies_approval_decisions() {
        assert_eq!(
            classify_line("approve call_3"),
            CliInput::Decision {
                correlation_id: "call_3".into(),
                approved: true
            }
        );
        assert_eq!(
            classify_line("deny call_3"),
            CliInput::Decision {
                correlation_id: "call_3".into(),
                approved: false
            }
        );
    }

    #[test]
    fn everything_else_is_a_turn() {
        assert_eq!(
            classify_line("approve of my plan?"),
            CliInput::Turn("approve of my plan?".into())
        );
        assert_eq!(
            classify_line("hello there"),
            CliInput::Turn("hello there".into())
        );
    }
}
