//! # Roost Core
//!
//! Domain types, traits, and error definitions for the Roost agent runtime.
//! This crate has **zero framework dependencies** — it defines the domain
//! model that all other crates implement against.
//!
//! ## Design Philosophy
//!
//! Every subsystem is defined as a trait here. Implementations live in their
//! respective crates: the model port in `roost-providers`, the approval gate
//! in `roost-approval`, the capability client in `roost-mcp`, and so on.
//! All crates depend inward on core; there is no ambient global state — the
//! registry, event bus, and gate are created at startup and passed by
//! reference to the components that need them.

pub mod approval;
pub mod channel;
pub mod error;
pub mod event;
pub mod message;
pub mod originate;
pub mod provider;
pub mod schedule;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use approval::{ApprovalRequest, ApprovalState, Decision};
pub use channel::{Channel, ChannelMessage};
pub use error::{Error, Result};
pub use event::{DomainEvent, EventBus};
pub use message::{
    Conversation, ConversationId, ConversationOrigin, ConversationStatus, Message,
    MessageToolCall, Role,
};
pub use originate::{TurnOriginator, TurnRequest};
pub use provider::{Provider, ProviderRequest, ProviderResponse, StreamChunk, ToolDefinition, Usage};
pub use schedule::{ScheduledTask, TriggerSpec};
pub use tool::{Tool, ToolCall, ToolRegistry, ToolResult};
