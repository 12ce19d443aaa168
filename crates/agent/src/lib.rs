//! The Roost agent core.
//!
//! `AgentLoop` drives a single conversation turn; `AgentService` wraps a
//! loop plus a conversation store into the `TurnOriginator` port that the
//! CLI adapter and the scheduler both submit turns through — scheduled
//! work takes exactly the same dispatch and approval path as a user
//! message.

pub mod loop_runner;
pub mod stream_event;
pub mod turn;

pub use loop_runner::AgentLoop;
pub use stream_event::AgentStreamEvent;
pub use turn::{CancelSource, CancelToken, TurnReport, TurnState, cancel_pair};

use async_trait::async_trait;
use roost_core::error::Error;
use roost_core::message::{Conversation, ConversationId, ConversationStatus, Message};
use roost_core::originate::{TurnOriginator, TurnRequest};
use roost_storage::ConversationStore;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, mpsc};
use tracing::debug;

/// Loads history, runs the loop, and persists what the turn appended.
///
/// Turns are serialized per conversation: the loop owns a conversation
/// exclusively for the duration of a turn, while turns on different
/// conversations run independently in parallel.
pub struct AgentService {
    agent: Arc<AgentLoop>,
    store: Arc<dyn ConversationStore>,
    turn_locks: Mutex<HashMap<ConversationId, Arc<Mutex<()>>>>,
}

impl AgentService {
    pub fn new(agent: Arc<AgentLoop>, store: Arc<dyn ConversationStore>) -> Arc<Self> {
        Arc::new(Self {
            agent,
            store,
            turn_locks: Mutex::new(HashMap::new()),
        })
    }

    async fn turn_lock(&self, id: &ConversationId) -> Arc<Mutex<()>> {
        self.turn_locks
            .lock()
            .await
            .entry(id.clone())
            .or_default()
            .clone()
    }

    /// Like `submit_turn`, but streams agent events to `stream` while the
    /// turn runs (used by interactive adapters).
    pub async fn submit_turn_streaming(
        &self,
        request: TurnRequest,
        stream: Option<mpsc::Sender<AgentStreamEvent>>,
        cancel: Option<CancelToken>,
    ) -> Result<String, Error> {
        let id = self.store.get_or_create(&request.origin).await?;
        let lock = self.turn_lock(&id).await;
        let _turn = lock.lock().await;

        let history = self.store.load_messages(&id).await?;

        let mut conversation = Conversation::new(request.origin.clone());
        conversation.id = id.clone();
        conversation.messages = history;

        let user_message = Message::user(&request.content);
        self.store.append_message(&id, &user_message).await?;
        conversation.push(user_message);

        // Everything the loop appends past this point is new.
        let persisted = conversation.messages.len();

        let report = self.agent.process(&mut conversation, stream, cancel).await;

        for message in &conversation.messages[persisted..] {
            self.store.append_message(&id, message).await?;
        }
        let status = match report.state {
            TurnState::Aborted => ConversationStatus::Failed,
            _ => ConversationStatus::Completed,
        };
        self.store.set_status(&id, status).await?;

        debug!(
            conversation_id = %id,
            rounds = report.rounds,
            tool_calls = report.tool_calls,
            state = report.state.as_str(),
            "Turn persisted"
        );
        Ok(report.text)
    }
}

#[async_trait]
impl TurnOriginator for AgentService {
    async fn submit_turn(&self, request: TurnRequest) -> Result<String, Error> {
        self.submit_turn_streaming(request, None, None).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use roost_approval::ApprovalGate;
    use roost_core::error::ProviderError;
    use roost_core::event::EventBus;
    use roost_core::message::{ConversationOrigin, Role};
    use roost_core::provider::{Provider, ProviderRequest, ProviderResponse};
    use roost_core::tool::ToolRegistry;
    use roost_storage::InMemoryStore;
    use std::time::Duration;

    struct CountingProvider;

    #[async_trait]
    impl Provider for CountingProvider {
        fn name(&self) -> &str {
            "counting"
        }

        async fn complete(
            &self,
            request: ProviderRequest,
        ) -> Result<ProviderResponse, ProviderError> {
            // Answer with how many non-system messages it was shown.
            let seen = request
                .messages
                .iter()
                .filter(|m| m.role != Role::System)
                .count();
            Ok(ProviderResponse {
                message: Message::assistant(format!("seen:{seen}")),
                usage: None,
                model: "mock".into(),
            })
        }
    }

    fn service() -> (Arc<AgentService>, Arc<InMemoryStore>) {
        let events = Arc::new(EventBus::default());
        let gate = ApprovalGate::new(Duration::from_secs(300), events.clone());
        let agent = Arc::new(AgentLoop::new(
            Arc::new(CountingProvider),
            "mock",
            Arc::new(ToolRegistry::new()),
            gate,
            events,
        ));
        let store = Arc::new(InMemoryStore::new());
        (AgentService::new(agent, store.clone()), store)
    }

    #[tokio::test]
    async fn turns_accumulate_history_per_origin() {
        let (service, _) = service();
        let origin = ConversationOrigin::new("cli", "s1");

        let first = service
            .submit_turn(TurnRequest::new(origin.clone(), "one"))
            .await
            .unwrap();
        // First turn: the model sees just the user message.
        assert_eq!(first, "seen:1");

        let second = service
            .submit_turn(TurnRequest::new(origin.clone(), "two"))
            .await
            .unwrap();
        // Second turn: user + assistant + user.
        assert_eq!(second, "seen:3");
    }

    #[tokio::test]
    async fn concurrent_turns_on_one_conversation_are_serialized() {
        let (service, _) = service();
        let origin = ConversationOrigin::new("cli", "s1");

        let (a, b) = tokio::join!(
            service.submit_turn(TurnRequest::new(origin.clone(), "one")),
            service.submit_turn(TurnRequest::new(origin.clone(), "two")),
        );

        // Whichever turn ran second saw the first turn's full history.
        let mut seen = vec![a.unwrap(), b.unwrap()];
        seen.sort();
        assert_eq!(seen, vec!["seen:1", "seen:3"]);
    }

    #[tokio::test]
    async fn separate_origins_are_isolated() {
        let (service, _) = service();

        service
            .submit_turn(TurnRequest::new(ConversationOrigin::new("cli", "a"), "x"))
            .await
            .unwrap();
        let other = service
            .submit_turn(TurnRequest::new(ConversationOrigin::new("cli", "b"), "y"))
            .await
            .unwrap();
        assert_eq!(other, "seen:1");
    }

    #[tokio::test]
    async fn turn_messages_are_persisted() {
        let (service, store) = service();
        let origin = ConversationOrigin::new("cli", "s1");

        service
            .submit_turn(TurnRequest::new(origin.clone(), "hello"))
            .await
            .unwrap();

        let id = store.get_or_create(&origin).await.unwrap();
        let messages = store.load_messages(&id).await.unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, Role::User);
        assert_eq!(messages[1].role, Role::Assistant);
    }
}
