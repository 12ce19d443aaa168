//! The approval gate — a per-invocation state machine that suspends a
//! sensitive tool call until a human decides, a deadline expires, or the
//! owning turn is cancelled.
//!
//! Resolution is exactly-once and first-writer-wins: whichever of decision,
//! expiry, or cancellation lands first is recorded; later events for the
//! same correlation id are ignored and logged, never double-applied.

use chrono::{DateTime, Utc};
use roost_core::approval::{ApprovalRequest, ApprovalState, Decision};
use roost_core::error::ApprovalError;
use roost_core::event::{DomainEvent, EventBus};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, oneshot};
use tracing::{debug, warn};

/// How many resolved outcomes to remember, so a late decision for an
/// already-expired request can be distinguished from an unknown id.
const RESOLVED_HISTORY: usize = 256;

struct PendingEntry {
    tx: oneshot::Sender<Decision>,
    summary: String,
    created_at: DateTime<Utc>,
    deadline: DateTime<Utc>,
}

#[derive(Default)]
struct ResolvedLog {
    states: HashMap<String, ApprovalState>,
    order: VecDeque<String>,
}

impl ResolvedLog {
    fn record(&mut self, correlation_id: &str, state: ApprovalState) {
        if self.states.insert(correlation_id.to_string(), state).is_none() {
            self.order.push_back(correlation_id.to_string());
            if self.order.len() > RESOLVED_HISTORY {
                if let Some(evicted) = self.order.pop_front() {
                    self.states.remove(&evicted);
                }
            }
        }
    }

    fn get(&self, correlation_id: &str) -> Option<ApprovalState> {
        self.states.get(correlation_id).copied()
    }
}

/// The gate itself. One instance per process, shared by the agent core and
/// every adapter that can answer approval prompts.
pub struct ApprovalGate {
    deadline: Duration,
    events: Arc<EventBus>,
    pending: Mutex<HashMap<String, PendingEntry>>,
    resolved: Mutex<ResolvedLog>,
}

impl ApprovalGate {
    pub fn new(deadline: Duration, events: Arc<EventBus>) -> Arc<Self> {
        Arc::new(Self {
            deadline,
            events,
            pending: Mutex::new(HashMap::new()),
            resolved: Mutex::new(ResolvedLog::default()),
        })
    }

    /// Suspend until the request identified by `correlation_id` is decided,
    /// expires, or is cancelled. Publishes the approval notification on the
    /// event bus so adapters can prompt the user.
    pub async fn request(&self, correlation_id: &str, summary: &str) -> Decision {
        let (tx, mut rx) = oneshot::channel();
        let created_at = Utc::now();
        let deadline = created_at
            + chrono::Duration::from_std(self.deadline).unwrap_or(chrono::Duration::seconds(300));

        {
            let mut pending = self.pending.lock().await;
            pending.insert(
                correlation_id.to_string(),
                PendingEntry {
                    tx,
                    summary: summary.to_string(),
                    created_at,
                    deadline,
                },
            );
        }

        self.events.publish(DomainEvent::ApprovalRequested {
            correlation_id: correlation_id.to_string(),
            summary: summary.to_string(),
            deadline,
            timestamp: created_at,
        });

        debug!(correlation_id, summary, "Approval requested");

        let decision = tokio::select! {
            result = &mut rx => result.unwrap_or(Decision::Cancelled),
            _ = tokio::time::sleep(self.deadline) => {
                // Claim expiry by removing the entry; if a decision landed
                // concurrently the entry is already gone and the decision
                // wins.
                let claimed = self.pending.lock().await.remove(correlation_id).is_some();
                if claimed {
                    Decision::Expired
                } else {
                    rx.await.unwrap_or(Decision::Cancelled)
                }
            }
        };

        self.record_outcome(correlation_id, decision).await;
        decision
    }

    /// Answer a pending request. The first resolution wins; answering a
    /// request that already expired (or was already answered) fails with
    /// `AlreadyResolved` and changes nothing.
    pub async fn resolve(
        &self,
        correlation_id: &str,
        approved: bool,
    ) -> Result<(), ApprovalError> {
        let decision = if approved {
            Decision::Approved
        } else {
            Decision::Denied
        };
        self.finish(correlation_id.to_string(), decision).await
    }

    /// Release a pending request because its turn was cancelled. Distinct
    /// from expiry so adapters can tell the two apart.
    pub async fn cancel(&self, correlation_id: &str) -> bool {
        self.finish(correlation_id.to_string(), Decision::Cancelled)
            .await
            .is_ok()
    }

    async fn finish(
        &self,
        correlation_id: String,
        decision: Decision,
    ) -> Result<(), ApprovalError> {
        let entry = self.pending.lock().await.remove(&correlation_id);
        match entry {
            Some(entry) => {
                // The waiter may have vanished on cancellation; that's fine.
                let _ = entry.tx.send(decision);
                Ok(())
            }
            None => {
                if let Some(state) = self.resolved.lock().await.get(&correlation_id) {
                    warn!(
                        correlation_id,
                        ?state,
                        "Ignoring decision for already-resolved approval"
                    );
                    Err(ApprovalError::AlreadyResolved(correlation_id))
                } else {
                    Err(ApprovalError::UnknownRequest(correlation_id))
                }
            }
        }
    }

    async fn record_outcome(&self, correlation_id: &str, decision: Decision) {
        let state = decision.state();
        self.resolved.lock().await.record(correlation_id, state);
        self.events.publish(DomainEvent::ApprovalResolved {
            correlation_id: correlation_id.to_string(),
            state,
            timestamp: Utc::now(),
        });
        debug!(correlation_id, ?state, "Approval resolved");
    }

    /// Snapshot of requests still waiting for a decision.
    pub async fn pending_requests(&self) -> Vec<ApprovalRequest> {
        self.pending
            .lock()
            .await
            .iter()
            .map(|(id, entry)| ApprovalRequest {
                correlation_id: id.clone(),
                summary: entry.summary.clone(),
                created_at: entry.created_at,
                deadline: entry.deadline,
                state: ApprovalState::Pending,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn gate(deadline_secs: u64) -> Arc<ApprovalGate> {
        ApprovalGate::new(
            Duration::from_secs(deadline_secs),
            Arc::new(EventBus::default()),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn approve_resolves_the_waiter() {
        let gate = gate(300);
        let waiter = {
            let gate = gate.clone();
            tokio::spawn(async move { gate.request("call_1", "send an email").await })
        };
        tokio::task::yield_now().await;

        gate.resolve("call_1", true).await.unwrap();
        assert_eq!(waiter.await.unwrap(), Decision::Approved);
    }

    #[tokio::test(start_paused = true)]
    async fn deny_resolves_the_waiter() {
        let gate = gate(300);
        let waiter = {
            let gate = gate.clone();
            tokio::spawn(async move { gate.request("call_1", "pay $20").await })
        };
        tokio::task::yield_now().await;

        gate.resolve("call_1", false).await.unwrap();
        assert_eq!(waiter.await.unwrap(), Decision::Denied);
    }

    #[tokio::test(start_paused = true)]
    async fn second_decision_is_ignored() {
        let gate = gate(300);
        let waiter = {
            let gate = gate.clone();
            tokio::spawn(async move { gate.request("call_1", "pay $20").await })
        };
        tokio::task::yield_now().await;

        gate.resolve("call_1", true).await.unwrap();
        let decision = waiter.await.unwrap();
        assert_eq!(decision, Decision::Approved);

        // The losing decision is rejected, not double-applied.
        let err = gate.resolve("call_1", false).await.unwrap_err();
        assert!(matches!(err, ApprovalError::AlreadyResolved(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn expires_at_the_deadline_not_before() {
        let gate = gate(5);
        let waiter = {
            let gate = gate.clone();
            tokio::spawn(async move { gate.request("call_1", "risky action").await })
        };
        tokio::task::yield_now().await;

        // Just before the deadline the request is still pending.
        tokio::time::sleep(Duration::from_millis(4_900)).await;
        assert!(!waiter.is_finished());
        assert_eq!(gate.pending_requests().await.len(), 1);

        // Just after, it has expired.
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(waiter.await.unwrap(), Decision::Expired);
        assert!(gate.pending_requests().await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn decision_after_expiry_is_rejected() {
        let gate = gate(1);
        let waiter = {
            let gate = gate.clone();
            tokio::spawn(async move { gate.request("call_1", "x").await })
        };
        tokio::task::yield_now().await;
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(waiter.await.unwrap(), Decision::Expired);

        let err = gate.resolve("call_1", true).await.unwrap_err();
        assert!(matches!(err, ApprovalError::AlreadyResolved(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_releases_as_cancelled_not_expired() {
        let gate = gate(300);
        let waiter = {
            let gate = gate.clone();
            tokio::spawn(async move { gate.request("call_1", "x").await })
        };
        tokio::task::yield_now().await;

        assert!(gate.cancel("call_1").await);
        assert_eq!(waiter.await.unwrap(), Decision::Cancelled);
    }

    #[tokio::test]
    async fn unknown_request_is_distinguished() {
        let gate = gate(300);
        let err = gate.resolve("never_seen", true).await.unwrap_err();
        assert!(matches!(err, ApprovalError::UnknownRequest(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn request_publishes_notification_event() {
        let events = Arc::new(EventBus::default());
        let gate = ApprovalGate::new(Duration::from_secs(300), events.clone());
        let mut rx = events.subscribe();

        let waiter = {
            let gate = gate.clone();
            tokio::spawn(async move { gate.request("call_9", "send a message").await })
        };
        tokio::task::yield_now().await;

        let event = rx.recv().await.unwrap();
        match event.as_ref() {
            DomainEvent::ApprovalRequested {
                correlation_id,
                summary,
                ..
            } => {
                assert_eq!(correlation_id, "call_9");
                assert_eq!(summary, "send a message");
            }
            other => panic!("expected ApprovalRequested, got {other:?}"),
        }

        gate.resolve("call_9", true).await.unwrap();
        waiter.await.unwrap();
    }
}
