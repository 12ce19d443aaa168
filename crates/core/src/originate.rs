//! Turn origination port.
//!
//! Presentation adapters and the scheduler both submit turns through this
//! one interface, so scheduler-fired work follows the exact same dispatch
//! and approval path as a user message — there is no parallel code path.

use crate::error::Error;
use crate::message::ConversationOrigin;
use async_trait::async_trait;

/// A request to process one turn of a conversation.
#[derive(Debug, Clone)]
pub struct TurnRequest {
    /// Who is submitting; also keys the conversation get-or-create
    pub origin: ConversationOrigin,

    /// The user-role content of the turn
    pub content: String,
}

impl TurnRequest {
    pub fn new(origin: ConversationOrigin, content: impl Into<String>) -> Self {
        Self {
            origin,
            content: content.into(),
        }
    }
}

/// Anything that can accept a turn and drive it to completion.
///
/// Implemented by the agent core; consumed by adapters and the scheduler.
/// Returns the final assistant text (including the terminal diagnostic
/// message for aborted turns — an abort is never a silent drop).
#[async_trait]
pub trait TurnOriginator: Send + Sync {
    async fn submit_turn(&self, request: TurnRequest) -> Result<String, Error>;
}
