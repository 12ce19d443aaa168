//! Durable storage ports for Roost: conversation history and the
//! scheduled-task table.
//!
//! Two implementations: SQLite (WAL, via sqlx) for real use and an
//! in-memory store for tests and ephemeral sessions. Guarantees are
//! per-entity atomicity only — no cross-entity transactions are required
//! by any consumer.

pub mod in_memory;
pub mod sqlite;

pub use in_memory::InMemoryStore;
pub use sqlite::SqliteStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use roost_core::error::StorageError;
use roost_core::message::{ConversationId, ConversationOrigin, ConversationStatus, Message};
use roost_core::schedule::ScheduledTask;

/// Append/read message history by conversation, keyed by origin.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    fn name(&self) -> &str;

    /// Look up the conversation owned by `origin`, creating it if absent.
    async fn get_or_create(
        &self,
        origin: &ConversationOrigin,
    ) -> Result<ConversationId, StorageError>;

    /// Append one message. Messages are immutable once appended.
    async fn append_message(
        &self,
        id: &ConversationId,
        message: &Message,
    ) -> Result<(), StorageError>;

    /// Load the full ordered history.
    async fn load_messages(&self, id: &ConversationId) -> Result<Vec<Message>, StorageError>;

    /// Update the conversation status.
    async fn set_status(
        &self,
        id: &ConversationId,
        status: ConversationStatus,
    ) -> Result<(), StorageError>;

    /// Drop all messages of a conversation (the conversation itself stays).
    async fn clear(&self, id: &ConversationId) -> Result<(), StorageError>;
}

/// Persist and query the scheduled-task table.
///
/// Read for firing purposes by a single timing authority (the scheduler
/// heartbeat); mutated by scheduling operations.
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Insert or fully replace a task by id.
    async fn upsert(&self, task: &ScheduledTask) -> Result<(), StorageError>;

    async fn get(&self, id: &str) -> Result<Option<ScheduledTask>, StorageError>;

    async fn get_by_name(&self, name: &str) -> Result<Option<ScheduledTask>, StorageError>;

    /// All tasks, ordered by next due time.
    async fn list(&self) -> Result<Vec<ScheduledTask>, StorageError>;

    /// Enabled tasks with `next_due <= now`, ordered by next due time.
    async fn due_before(&self, now: DateTime<Utc>) -> Result<Vec<ScheduledTask>, StorageError>;

    /// Enable or disable a task. Returns whether it existed.
    async fn set_enabled(&self, id: &str, enabled: bool) -> Result<bool, StorageError>;

    /// Delete a task. Returns whether it existed.
    async fn remove(&self, id: &str) -> Result<bool, StorageError>;
}
