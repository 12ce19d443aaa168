//! Agent-level streaming events.
//!
//! `AgentStreamEvent` wraps provider-level stream fragments into the
//! higher-level sequence an adapter renders: text chunks as they arrive,
//! tool activity, approval prompts, and a terminal marker.

use roost_core::provider::Usage;
use serde::{Deserialize, Serialize};

/// Events emitted by the agent while processing a turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentStreamEvent {
    /// Partial text fragment from the model, forwarded as it arrives.
    Chunk { content: String },

    /// A fully assembled tool call is being dispatched.
    ToolCall {
        id: String,
        name: String,
        sensitive: bool,
    },

    /// A sensitive call is parked at the approval gate.
    ApprovalPending { id: String, summary: String },

    /// Tool execution completed (including synthesized results).
    ToolResult {
        id: String,
        name: String,
        output: String,
        success: bool,
    },

    /// The turn is complete — final metadata.
    Done {
        conversation_id: String,
        usage: Option<Usage>,
        rounds: u32,
        tool_calls_made: usize,
        aborted: bool,
    },

    /// An error terminated the turn.
    Error { message: String },
}

impl AgentStreamEvent {
    /// Wire-level event name for this event type.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Chunk { .. } => "chunk",
            Self::ToolCall { .. } => "tool_call",
            Self::ApprovalPending { .. } => "approval_pending",
            Self::ToolResult { .. } => "tool_result",
            Self::Done { .. } => "done",
            Self::Error { .. } => "error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_serialization() {
        let event = AgentStreamEvent::Chunk {
            content: "Hello".into(),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""type":"chunk""#));
        assert!(json.contains(r#""content":"Hello""#));
    }

    #[test]
    fn tool_call_carries_sensitivity() {
        let event = AgentStreamEvent::ToolCall {
            id: "call_1".into(),
            name: "send_mail".into(),
            sensitive: true,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""sensitive":true"#));
    }

    #[test]
    fn done_serialization() {
        let event = AgentStreamEvent::Done {
            conversation_id: "abc".into(),
            usage: Some(Usage {
                prompt_tokens: 10,
                completion_tokens: 20,
                total_tokens: 30,
            }),
            rounds: 2,
            tool_calls_made: 1,
            aborted: false,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""rounds":2"#));
        assert!(json.contains(r#""aborted":false"#));
    }

    #[test]
    fn event_type_names() {
        assert_eq!(
            AgentStreamEvent::Chunk { content: "x".into() }.event_type(),
            "chunk"
        );
        assert_eq!(
            AgentStreamEvent::ApprovalPending {
                id: "a".into(),
                summary: "b".into()
            }
            .event_type(),
            "approval_pending"
        );
        assert_eq!(
            AgentStreamEvent::Error { message: "x".into() }.event_type(),
            "error"
        );
    }

    #[test]
    fn deserialization() {
        let json = r#"{"type":"chunk","content":"hi"}"#;
        let event: AgentStreamEvent = serde_json::from_str(json).unwrap();
        match event {
            AgentStreamEvent::Chunk { content } => assert_eq!(content, "hi"),
            _ => panic!("Wrong variant"),
        }
    }
}
