//! Approval domain types.
//!
//! The gate implementation lives in `roost-approval`; the data model lives
//! here so events, the agent core, and adapters can speak about approvals
//! without depending on the gate.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle state of an approval request. Resolved states are terminal:
/// the first decision or expiry to occur wins, later events are ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalState {
    Pending,
    Approved,
    Denied,
    Expired,
    /// The owning turn was cancelled while the request was pending.
    Cancelled,
}

/// The outcome a waiting caller observes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Approved,
    Denied,
    Expired,
    Cancelled,
}

impl Decision {
    pub fn state(self) -> ApprovalState {
        match self {
            Decision::Approved => ApprovalState::Approved,
            Decision::Denied => ApprovalState::Denied,
            Decision::Expired => ApprovalState::Expired,
            Decision::Cancelled => ApprovalState::Cancelled,
        }
    }
}

/// A human-in-the-loop approval request for one sensitive tool call.
/// `correlation_id` is shared with the ToolCall it gates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalRequest {
    pub correlation_id: String,

    /// Short human-readable summary of the requested action
    pub summary: String,

    pub created_at: DateTime<Utc>,

    /// Wall-clock deadline; reaching it with no decision expires the
    /// request automatically.
    pub deadline: DateTime<Utc>,

    pub state: ApprovalState,
}

impl ApprovalRequest {
    /// Format as a user-facing prompt.
    pub fn to_prompt(&self) -> String {
        format!(
            "🔐 Approval required: {}\n   id: {}  expires: {}\n   reply with `approve {}` or `deny {}`",
            self.summary,
            &self.correlation_id,
            self.deadline.format("%H:%M:%S"),
            &self.correlation_id,
            &self.correlation_id,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decision_maps_to_terminal_state() {
        assert_eq!(Decision::Approved.state(), ApprovalState::Approved);
        assert_eq!(Decision::Expired.state(), ApprovalState::Expired);
        assert_eq!(Decision::Cancelled.state(), ApprovalState::Cancelled);
    }

    #[test]
    fn prompt_mentions_the_correlation_id() {
        let req = ApprovalRequest {
            correlation_id: "call_9".into(),
            summary: "Send an email to bob@example.com".into(),
            created_at: Utc::now(),
            deadline: Utc::now(),
            state: ApprovalState::Pending,
        };
        let prompt = req.to_prompt();
        assert!(prompt.contains("call_9"));
        assert!(prompt.contains("bob@example.com"));
    }
}
