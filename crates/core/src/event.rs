//! Domain event system — decoupled notification between components.
//!
//! The agent core, approval gate, capability client, and scheduler publish
//! events here; adapters subscribe to render approval prompts and status,
//! without any component holding a reference to another's internals.

use crate::approval::ApprovalState;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

/// All domain events in the system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DomainEvent {
    /// A turn started processing (user-initiated or scheduler-fired)
    TurnStarted {
        conversation_id: String,
        origin: String,
        timestamp: DateTime<Utc>,
    },

    /// The model produced a response (one drafting round)
    ResponseGenerated {
        conversation_id: String,
        model: String,
        tokens_used: u32,
        timestamp: DateTime<Utc>,
    },

    /// A tool call completed (success or failure, including synthesized
    /// denial/timeout results)
    ToolExecuted {
        tool_name: String,
        success: bool,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },

    /// A sensitive tool call is waiting for a human decision.
    /// This is the approval notification port: adapters render it and
    /// answer through the gate.
    ApprovalRequested {
        correlation_id: String,
        summary: String,
        deadline: DateTime<Utc>,
        timestamp: DateTime<Utc>,
    },

    /// An approval request reached a terminal state
    ApprovalResolved {
        correlation_id: String,
        state: ApprovalState,
        timestamp: DateTime<Utc>,
    },

    /// A capability server connection changed state
    ConnectionStateChanged {
        server: String,
        state: String,
        timestamp: DateTime<Utc>,
    },

    /// A scheduled task fired
    TaskFired {
        task_id: String,
        name: String,
        timestamp: DateTime<Utc>,
    },

    /// A turn reached Final or Aborted
    TurnCompleted {
        conversation_id: String,
        aborted: bool,
        rounds: u32,
        timestamp: DateTime<Utc>,
    },

    /// An error occurred somewhere
    ErrorOccurred {
        context: String,
        error_message: String,
        timestamp: DateTime<Utc>,
    },
}

/// A broadcast-based event bus.
///
/// Uses `tokio::sync::broadcast` for multi-consumer pub/sub. Publishing
/// with no subscribers is fine.
pub struct EventBus {
    sender: broadcast::Sender<Arc<DomainEvent>>,
}

impl EventBus {
    /// Create a new event bus with the given capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all subscribers.
    pub fn publish(&self, event: DomainEvent) {
        let _ = self.sender.send(Arc::new(event));
    }

    /// Subscribe to receive events.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<DomainEvent>> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publish_subscribe() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();

        bus.publish(DomainEvent::ToolExecuted {
            tool_name: "clock".into(),
            success: true,
            duration_ms: 3,
            timestamp: Utc::now(),
        });

        let event = rx.recv().await.unwrap();
        match event.as_ref() {
            DomainEvent::ToolExecuted {
                tool_name, success, ..
            } => {
                assert_eq!(tool_name, "clock");
                assert!(success);
            }
            _ => panic!("Expected ToolExecuted event"),
        }
    }

    #[test]
    fn no_subscribers_doesnt_panic() {
        let bus = EventBus::new(16);
        bus.publish(DomainEvent::ErrorOccurred {
            context: "test".into(),
            error_message: "no subscribers".into(),
            timestamp: Utc::now(),
        });
    }

    #[tokio::test]
    async fn approval_event_roundtrips_state() {
        let bus = EventBus::default();
        let mut rx = bus.subscribe();
        bus.publish(DomainEvent::ApprovalResolved {
            correlation_id: "c1".into(),
            state: ApprovalState::Expired,
            timestamp: Utc::now(),
        });
        let event = rx.recv().await.unwrap();
        match event.as_ref() {
            DomainEvent::ApprovalResolved { state, .. } => {
                assert_eq!(*state, ApprovalState::Expired)
            }
            _ => panic!("Expected ApprovalResolved"),
        }
    }
}
