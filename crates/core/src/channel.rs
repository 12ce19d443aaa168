//! Channel trait — the presentation adapter boundary.
//!
//! A Channel connects Roost to wherever the user is (terminal, bot
//! front-end). It yields incoming turn submissions and renders responses.
//! Approval prompts reach channels through the event bus, not this trait.

use crate::error::ChannelError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A message received from a channel, ready to become a turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelMessage {
    /// Sender identifier within the channel
    pub sender_id: String,

    /// The text content
    pub content: String,

    /// Session key (terminal session, chat id, ...)
    pub session: String,
}

/// The presentation adapter port.
#[async_trait]
pub trait Channel: Send + Sync {
    /// Adapter name (e.g., "cli").
    fn name(&self) -> &str;

    /// Start listening for incoming messages. The implementation owns its
    /// own polling/reading task and pushes into the returned receiver.
    async fn start(
        &self,
    ) -> std::result::Result<
        tokio::sync::mpsc::Receiver<std::result::Result<ChannelMessage, ChannelError>>,
        ChannelError,
    >;

    /// Deliver a (complete) response to the user.
    async fn send(&self, session: &str, content: &str) -> std::result::Result<(), ChannelError>;

    /// Stop the channel gracefully.
    async fn stop(&self) -> std::result::Result<(), ChannelError> {
        Ok(())
    }
}
