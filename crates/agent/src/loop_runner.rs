//! The conversation loop.
//!
//! One `AgentLoop` drives one conversation at a time through:
//! submit history to the model → consume the stream → dispatch any tool
//! calls (sensitive ones through the approval gate) → append results in
//! issuance order → repeat, until the model answers in plain text or the
//! round budget forces a stop.
//!
//! Every failure mode ends with a terminal assistant message — an aborted
//! turn is never a silent drop.

use crate::stream_event::AgentStreamEvent;
use crate::turn::{CancelToken, TurnReport, TurnState};
use roost_approval::ApprovalGate;
use roost_core::approval::Decision;
use roost_core::error::ProviderError;
use roost_core::event::{DomainEvent, EventBus};
use roost_core::message::{Conversation, Message, MessageToolCall};
use roost_core::provider::{Provider, ProviderRequest, Usage};
use roost_core::tool::{ToolCall, ToolRegistry, ToolResult};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

pub struct AgentLoop {
    provider: Arc<dyn Provider>,
    model: String,
    temperature: f32,
    max_tokens: Option<u32>,
    tools: Arc<ToolRegistry>,
    gate: Arc<ApprovalGate>,
    events: Arc<EventBus>,
    system_prompt: String,
    max_rounds: u32,
}

/// What one drafting round produced.
enum Drafted {
    Answer {
        content: String,
        usage: Option<Usage>,
    },
    ToolCalls {
        content: String,
        calls: Vec<MessageToolCall>,
        usage: Option<Usage>,
    },
    Cancelled,
    Failed(ProviderError),
}

/// One dispatched call while its result is outstanding.
enum Slot {
    /// Result synthesized without reaching a tool (bad arguments)
    Ready { name: String, result: ToolResult },
    /// Running concurrently
    Task {
        id: String,
        name: String,
        handle: JoinHandle<ToolResult>,
    },
    /// Parked until the approval gate decides; executed sequentially in
    /// issuance order so approvals are serialized per conversation
    Sensitive { call: ToolCall },
}

impl AgentLoop {
    pub fn new(
        provider: Arc<dyn Provider>,
        model: impl Into<String>,
        tools: Arc<ToolRegistry>,
        gate: Arc<ApprovalGate>,
        events: Arc<EventBus>,
    ) -> Self {
        Self {
            provider,
            model: model.into(),
            temperature: 0.7,
            max_tokens: None,
            tools,
            gate,
            events,
            system_prompt: String::new(),
            max_rounds: 10,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max: u32) -> Self {
        self.max_tokens = Some(max);
        self
    }

    pub fn with_max_rounds(mut self, max: u32) -> Self {
        self.max_rounds = max.max(1);
        self
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    /// Drive one turn to Final or Aborted.
    ///
    /// The conversation is owned exclusively for the duration; text
    /// fragments and tool activity stream out through `stream` as they
    /// happen. The returned report's text is always a real message —
    /// aborts carry a terminal diagnostic instead of failing silently.
    pub async fn process(
        &self,
        conversation: &mut Conversation,
        stream: Option<mpsc::Sender<AgentStreamEvent>>,
        cancel: Option<CancelToken>,
    ) -> TurnReport {
        let mut cancel = cancel;
        let mut usage_total: Option<Usage> = None;
        let mut tool_calls_made = 0usize;

        info!(
            conversation_id = %conversation.id,
            messages = conversation.messages.len(),
            "Processing turn"
        );
        self.events.publish(DomainEvent::TurnStarted {
            conversation_id: conversation.id.to_string(),
            origin: conversation.origin.to_string(),
            timestamp: chrono::Utc::now(),
        });

        let mut rounds = 0u32;
        while rounds < self.max_rounds {
            rounds += 1;
            debug!(conversation_id = %conversation.id, round = rounds, "Drafting");

            let drafted = self.draft(conversation, &stream, &mut cancel).await;

            match drafted {
                Drafted::Answer { content, usage } => {
                    self.track_usage(&conversation.id.to_string(), &usage, &mut usage_total);
                    conversation.push(Message::assistant(&content));
                    return self
                        .finish(
                            conversation,
                            content,
                            TurnState::Final,
                            rounds,
                            tool_calls_made,
                            usage_total,
                            stream,
                        )
                        .await;
                }
                Drafted::ToolCalls {
                    content,
                    calls,
                    usage,
                } => {
                    self.track_usage(&conversation.id.to_string(), &usage, &mut usage_total);
                    tool_calls_made += calls.len();

                    match self.dispatch_round(&calls, &stream, &mut cancel).await {
                        Some(results) => {
                            // The assistant message and its results land
                            // together, results in issuance order, so the
                            // model's view of cause and effect is stable.
                            let mut assistant = Message::assistant(&content);
                            assistant.tool_calls = calls;
                            conversation.push(assistant);
                            for (name, result) in results {
                                self.events.publish(DomainEvent::ToolExecuted {
                                    tool_name: name.clone(),
                                    success: result.success,
                                    duration_ms: result.duration_ms,
                                    timestamp: chrono::Utc::now(),
                                });
                                Self::emit(
                                    &stream,
                                    AgentStreamEvent::ToolResult {
                                        id: result.call_id.clone(),
                                        name,
                                        output: result.output.clone(),
                                        success: result.success,
                                    },
                                )
                                .await;
                                conversation
                                    .push(Message::tool_result(&result.call_id, &result.output));
                            }
                        }
                        None => {
                            // Cancelled mid-dispatch: in-flight results are
                            // discarded, nothing of this round is kept.
                            return self.abort(conversation, "Turn cancelled.", rounds, tool_calls_made, stream).await;
                        }
                    }
                }
                Drafted::Cancelled => {
                    return self.abort(conversation, "Turn cancelled.", rounds, tool_calls_made, stream).await;
                }
                Drafted::Failed(e) => {
                    warn!(conversation_id = %conversation.id, error = %e, "Model failure, aborting turn");
                    self.events.publish(DomainEvent::ErrorOccurred {
                        context: "provider".into(),
                        error_message: e.to_string(),
                        timestamp: chrono::Utc::now(),
                    });
                    let text = format!("⚠️ Unable to complete this request: {e}");
                    return self.abort(conversation, &text, rounds, tool_calls_made, stream).await;
                }
            }
        }

        // Round budget exhausted: force a Final state with a diagnostic
        // note rather than looping forever.
        warn!(
            conversation_id = %conversation.id,
            rounds,
            "Max tool rounds reached, forcing final response"
        );
        let text = format!(
            "I stopped after reaching the limit of {} tool rounds without a final answer. \
             Let me know if you'd like me to continue.",
            self.max_rounds
        );
        conversation.push(Message::assistant(&text));
        self.finish(
            conversation,
            text,
            TurnState::Final,
            rounds,
            tool_calls_made,
            usage_total,
            stream,
        )
        .await
    }

    /// Consume one model stream: text fragments are forwarded as they
    /// arrive, tool calls are only ever surfaced fully assembled.
    async fn draft(
        &self,
        conversation: &Conversation,
        stream: &Option<mpsc::Sender<AgentStreamEvent>>,
        cancel: &mut Option<CancelToken>,
    ) -> Drafted {
        let request = self.build_request(conversation);
        let mut rx = match self.provider.stream(request).await {
            Ok(rx) => rx,
            Err(e) => return Drafted::Failed(e),
        };

        let mut content = String::new();
        let mut calls: Vec<MessageToolCall> = Vec::new();
        let mut usage: Option<Usage> = None;

        loop {
            let next = match cancel.as_mut() {
                Some(token) => {
                    tokio::select! {
                        _ = token.cancelled() => return Drafted::Cancelled,
                        next = rx.recv() => next,
                    }
                }
                None => rx.recv().await,
            };

            match next {
                Some(Ok(chunk)) => {
                    if let Some(text) = chunk.content {
                        content.push_str(&text);
                        Self::emit(stream, AgentStreamEvent::Chunk { content: text }).await;
                    }
                    calls.extend(chunk.tool_calls);
                    if chunk.usage.is_some() {
                        usage = chunk.usage;
                    }
                    if chunk.done {
                        break;
                    }
                }
                Some(Err(e)) => return Drafted::Failed(e),
                // Channel closed without a done marker — treat as done.
                None => break,
            }
        }

        if calls.is_empty() {
            Drafted::Answer { content, usage }
        } else {
            Drafted::ToolCalls {
                content,
                calls,
                usage,
            }
        }
    }

    /// Dispatch one round of tool calls.
    ///
    /// Read-only calls run concurrently; sensitive calls are gated and
    /// executed sequentially in issuance order. Results come back in
    /// issuance order regardless of completion order — one result per
    /// call, synthesized results included. Returns None if the turn was
    /// cancelled (in-flight results are discarded).
    async fn dispatch_round(
        &self,
        calls: &[MessageToolCall],
        stream: &Option<mpsc::Sender<AgentStreamEvent>>,
        cancel: &mut Option<CancelToken>,
    ) -> Option<Vec<(String, ToolResult)>> {
        let mut slots = Vec::with_capacity(calls.len());

        for tc in calls {
            let sensitive = self.tools.is_sensitive(&tc.name).unwrap_or(false);
            Self::emit(
                stream,
                AgentStreamEvent::ToolCall {
                    id: tc.id.clone(),
                    name: tc.name.clone(),
                    sensitive,
                },
            )
            .await;

            let arguments: serde_json::Value = match serde_json::from_str(&tc.arguments) {
                Ok(value) => value,
                Err(e) => {
                    // A call whose arguments never became valid JSON is
                    // failed without reaching any tool; the model can retry
                    // with corrected arguments.
                    slots.push(Slot::Ready {
                        name: tc.name.clone(),
                        result: ToolResult::failure(
                            &tc.id,
                            format!("Error: invalid tool arguments: {e}"),
                        ),
                    });
                    continue;
                }
            };

            let call = ToolCall {
                id: tc.id.clone(),
                name: tc.name.clone(),
                arguments,
            };

            if sensitive {
                slots.push(Slot::Sensitive { call });
            } else {
                let registry = self.tools.clone();
                let handle =
                    tokio::spawn(async move { execute_and_convert(&registry, &call).await });
                slots.push(Slot::Task {
                    id: tc.id.clone(),
                    name: tc.name.clone(),
                    handle,
                });
            }
        }

        let mut results = Vec::with_capacity(slots.len());
        let mut slots = slots.into_iter();

        while let Some(slot) = slots.next() {
            if cancel.as_ref().is_some_and(|c| c.is_cancelled()) {
                Self::discard_remaining(slot, slots).await;
                return None;
            }

            match slot {
                Slot::Ready { name, result } => results.push((name, result)),
                Slot::Task {
                    id,
                    name,
                    mut handle,
                } => {
                    let joined = match cancel.as_mut() {
                        Some(token) => {
                            tokio::select! {
                                _ = token.cancelled() => {
                                    handle.abort();
                                    Self::discard_remaining_iter(slots).await;
                                    return None;
                                }
                                joined = &mut handle => joined,
                            }
                        }
                        None => (&mut handle).await,
                    };
                    let result = joined.unwrap_or_else(|e| {
                        ToolResult::failure(&id, format!("Error: tool task failed: {e}"))
                    });
                    results.push((name, result));
                }
                Slot::Sensitive { call } => {
                    let summary = approval_summary(&call);
                    Self::emit(
                        stream,
                        AgentStreamEvent::ApprovalPending {
                            id: call.id.clone(),
                            summary: summary.clone(),
                        },
                    )
                    .await;

                    let decision = match cancel.as_mut() {
                        Some(token) => {
                            tokio::select! {
                                _ = token.cancelled() => {
                                    // Release the pending request as
                                    // cancelled, not expired.
                                    self.gate.cancel(&call.id).await;
                                    self.events.publish(DomainEvent::ApprovalResolved {
                                        correlation_id: call.id.clone(),
                                        state: roost_core::approval::ApprovalState::Cancelled,
                                        timestamp: chrono::Utc::now(),
                                    });
                                    Decision::Cancelled
                                }
                                decision = self.gate.request(&call.id, &summary) => decision,
                            }
                        }
                        None => self.gate.request(&call.id, &summary).await,
                    };

                    let result = match decision {
                        Decision::Approved => execute_and_convert(&self.tools, &call).await,
                        Decision::Denied => {
                            ToolResult::failure(&call.id, "Denied by user.")
                        }
                        Decision::Expired => ToolResult::failure(
                            &call.id,
                            "Approval request expired with no decision; denied by timeout.",
                        ),
                        Decision::Cancelled => {
                            Self::discard_remaining_iter(slots).await;
                            return None;
                        }
                    };
                    results.push((call.name.clone(), result));
                }
            }
        }

        Some(results)
    }

    async fn discard_remaining(slot: Slot, rest: std::vec::IntoIter<Slot>) {
        Self::discard_slot(slot).await;
        Self::discard_remaining_iter(rest).await;
    }

    async fn discard_remaining_iter(rest: std::vec::IntoIter<Slot>) {
        for slot in rest {
            Self::discard_slot(slot).await;
        }
    }

    async fn discard_slot(slot: Slot) {
        match slot {
            Slot::Task { handle, .. } => handle.abort(),
            Slot::Sensitive { .. } | Slot::Ready { .. } => {}
        }
    }

    fn build_request(&self, conversation: &Conversation) -> ProviderRequest {
        let mut messages = Vec::with_capacity(conversation.messages.len() + 1);
        if !self.system_prompt.is_empty() {
            messages.push(Message::system(&self.system_prompt));
        }
        messages.extend(conversation.messages.iter().cloned());

        ProviderRequest {
            model: self.model.clone(),
            messages,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            tools: self.tools.definitions(),
        }
    }

    fn track_usage(
        &self,
        conversation_id: &str,
        usage: &Option<Usage>,
        total: &mut Option<Usage>,
    ) {
        if let Some(usage) = usage {
            self.events.publish(DomainEvent::ResponseGenerated {
                conversation_id: conversation_id.to_string(),
                model: self.model.clone(),
                tokens_used: usage.total_tokens,
                timestamp: chrono::Utc::now(),
            });
            let entry = total.get_or_insert(Usage {
                prompt_tokens: 0,
                completion_tokens: 0,
                total_tokens: 0,
            });
            entry.prompt_tokens += usage.prompt_tokens;
            entry.completion_tokens += usage.completion_tokens;
            entry.total_tokens += usage.total_tokens;
        }
    }

    async fn abort(
        &self,
        conversation: &mut Conversation,
        text: &str,
        rounds: u32,
        tool_calls: usize,
        stream: Option<mpsc::Sender<AgentStreamEvent>>,
    ) -> TurnReport {
        conversation.push(Message::assistant(text));
        Self::emit(&stream, AgentStreamEvent::Error {
            message: text.to_string(),
        })
        .await;
        self.finish(
            conversation,
            text.to_string(),
            TurnState::Aborted,
            rounds,
            tool_calls,
            None,
            stream,
        )
        .await
    }

    #[allow(clippy::too_many_arguments)]
    async fn finish(
        &self,
        conversation: &Conversation,
        text: String,
        state: TurnState,
        rounds: u32,
        tool_calls: usize,
        usage: Option<Usage>,
        stream: Option<mpsc::Sender<AgentStreamEvent>>,
    ) -> TurnReport {
        let aborted = state == TurnState::Aborted;
        self.events.publish(DomainEvent::TurnCompleted {
            conversation_id: conversation.id.to_string(),
            aborted,
            rounds,
            timestamp: chrono::Utc::now(),
        });
        Self::emit(
            &stream,
            AgentStreamEvent::Done {
                conversation_id: conversation.id.to_string(),
                usage,
                rounds,
                tool_calls_made: tool_calls,
                aborted,
            },
        )
        .await;
        TurnReport {
            text,
            state,
            rounds,
            tool_calls,
        }
    }

    async fn emit(stream: &Option<mpsc::Sender<AgentStreamEvent>>, event: AgentStreamEvent) {
        if let Some(tx) = stream {
            let _ = tx.send(event).await;
        }
    }
}

/// Run a call through the registry and fold any error into a failed
/// result the model can read. Tool-level failures never abort the turn.
async fn execute_and_convert(registry: &ToolRegistry, call: &ToolCall) -> ToolResult {
    match registry.execute(call).await {
        Ok(result) => result,
        Err(e) => ToolResult::failure(&call.id, format!("Error: {e}")),
    }
}

fn approval_summary(call: &ToolCall) -> String {
    let mut args = call.arguments.to_string();
    if args.len() > 120 {
        let mut cut = 117;
        while !args.is_char_boundary(cut) {
            cut -= 1;
        }
        args.truncate(cut);
        args.push_str("...");
    }
    format!("Run tool '{}' with arguments {}", call.name, args)
}
