//! SQLite store for conversations, messages, and scheduled tasks.
//!
//! One database file, WAL journal, small pool. Three tables:
//! - `conversations` — identity + origin + status, unique per origin
//! - `messages`      — append-only history, ordered by insertion rowid
//! - `scheduled_tasks` — the task table the scheduler heartbeat polls

use crate::{ConversationStore, TaskStore};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use roost_core::error::StorageError;
use roost_core::message::{
    ConversationId, ConversationOrigin, ConversationStatus, Message, MessageToolCall, Role,
};
use roost_core::schedule::{ScheduledTask, TriggerSpec};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use tracing::{debug, info};
use uuid::Uuid;

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (or create) the database at `path` and run migrations.
    /// Pass `"sqlite::memory:"` for an ephemeral database in tests.
    pub async fn new(path: &str) -> Result<Self, StorageError> {
        let options = SqliteConnectOptions::from_str(path)
            .map_err(|e| StorageError::Open(format!("invalid SQLite path: {e}")))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .pragma("foreign_keys", "ON");

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(|e| StorageError::Open(format!("failed to open SQLite: {e}")))?;

        let store = Self { pool };
        store.run_migrations().await?;
        info!("SQLite store initialized at {path}");
        Ok(store)
    }

    async fn run_migrations(&self) -> Result<(), StorageError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS conversations (
                id         TEXT PRIMARY KEY,
                adapter    TEXT NOT NULL,
                session    TEXT NOT NULL,
                status     TEXT NOT NULL DEFAULT 'active',
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                UNIQUE(adapter, session)
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Migration(format!("conversations table: {e}")))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS messages (
                iid             INTEGER PRIMARY KEY AUTOINCREMENT,
                conversation_id TEXT NOT NULL,
                id              TEXT NOT NULL,
                role            TEXT NOT NULL,
                content         TEXT NOT NULL,
                tool_calls      TEXT NOT NULL DEFAULT '[]',
                tool_call_id    TEXT,
                timestamp       TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Migration(format!("messages table: {e}")))?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_messages_conversation
             ON messages(conversation_id, iid)",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Migration(format!("messages index: {e}")))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS scheduled_tasks (
                id         TEXT PRIMARY KEY,
                name       TEXT UNIQUE NOT NULL,
                prompt     TEXT NOT NULL,
                trigger    TEXT NOT NULL,
                next_due   TEXT NOT NULL,
                enabled    INTEGER NOT NULL DEFAULT 1,
                created_at TEXT NOT NULL,
                last_run   TEXT,
                run_count  INTEGER NOT NULL DEFAULT 0
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Migration(format!("scheduled_tasks table: {e}")))?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_scheduled_tasks_due
             ON scheduled_tasks(next_due) WHERE enabled = 1",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Migration(format!("tasks index: {e}")))?;

        debug!("SQLite migrations complete");
        Ok(())
    }

    fn role_to_str(role: &Role) -> &'static str {
        match role {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
            Role::Tool => "tool",
        }
    }

    fn role_from_str(s: &str) -> Role {
        match s {
            "assistant" => Role::Assistant,
            "system" => Role::System,
            "tool" => Role::Tool,
            _ => Role::User,
        }
    }

    fn status_to_str(status: ConversationStatus) -> &'static str {
        match status {
            ConversationStatus::Active => "active",
            ConversationStatus::Completed => "completed",
            ConversationStatus::Failed => "failed",
        }
    }

    fn parse_timestamp(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now())
    }

    fn row_to_message(row: &sqlx::sqlite::SqliteRow) -> Result<Message, StorageError> {
        let id: String = row
            .try_get("id")
            .map_err(|e| StorageError::Query(format!("id column: {e}")))?;
        let role: String = row
            .try_get("role")
            .map_err(|e| StorageError::Query(format!("role column: {e}")))?;
        let content: String = row
            .try_get("content")
            .map_err(|e| StorageError::Query(format!("content column: {e}")))?;
        let tool_calls_json: String = row
            .try_get("tool_calls")
            .map_err(|e| StorageError::Query(format!("tool_calls column: {e}")))?;
        let tool_call_id: Option<String> = row
            .try_get("tool_call_id")
            .map_err(|e| StorageError::Query(format!("tool_call_id column: {e}")))?;
        let timestamp: String = row
            .try_get("timestamp")
            .map_err(|e| StorageError::Query(format!("timestamp column: {e}")))?;

        let tool_calls: Vec<MessageToolCall> =
            serde_json::from_str(&tool_calls_json).unwrap_or_default();

        Ok(Message {
            id,
            role: Self::role_from_str(&role),
            content,
            tool_calls,
            tool_call_id,
            timestamp: Self::parse_timestamp(&timestamp),
        })
    }

    fn row_to_task(row: &sqlx::sqlite::SqliteRow) -> Result<ScheduledTask, StorageError> {
        let trigger_json: String = row
            .try_get("trigger")
            .map_err(|e| StorageError::Query(format!("trigger column: {e}")))?;
        let trigger: TriggerSpec = serde_json::from_str(&trigger_json)
            .map_err(|e| StorageError::Query(format!("trigger decode: {e}")))?;

        let next_due: String = row
            .try_get("next_due")
            .map_err(|e| StorageError::Query(format!("next_due column: {e}")))?;
        let created_at: String = row
            .try_get("created_at")
            .map_err(|e| StorageError::Query(format!("created_at column: {e}")))?;
        let last_run: Option<String> = row
            .try_get("last_run")
            .map_err(|e| StorageError::Query(format!("last_run column: {e}")))?;
        let enabled: i64 = row
            .try_get("enabled")
            .map_err(|e| StorageError::Query(format!("enabled column: {e}")))?;
        let run_count: i64 = row
            .try_get("run_count")
            .map_err(|e| StorageError::Query(format!("run_count column: {e}")))?;

        Ok(ScheduledTask {
            id: row
                .try_get("id")
                .map_err(|e| StorageError::Query(format!("id column: {e}")))?,
            name: row
                .try_get("name")
                .map_err(|e| StorageError::Query(format!("name column: {e}")))?,
            prompt: row
                .try_get("prompt")
                .map_err(|e| StorageError::Query(format!("prompt column: {e}")))?,
            trigger,
            next_due: Self::parse_timestamp(&next_due),
            enabled: enabled != 0,
            created_at: Self::parse_timestamp(&created_at),
            last_run: last_run.as_deref().map(Self::parse_timestamp),
            run_count: run_count as u64,
        })
    }
}

#[async_trait]
impl ConversationStore for SqliteStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn get_or_create(
        &self,
        origin: &ConversationOrigin,
    ) -> Result<ConversationId, StorageError> {
        let existing = sqlx::query(
            "SELECT id FROM conversations WHERE adapter = ?1 AND session = ?2",
        )
        .bind(&origin.adapter)
        .bind(&origin.session)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StorageError::Query(format!("conversation lookup: {e}")))?;

        if let Some(row) = existing {
            let id: String = row
                .try_get("id")
                .map_err(|e| StorageError::Query(format!("id column: {e}")))?;
            return Ok(ConversationId(id));
        }

        let id = Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();
        sqlx::query(
            r#"
            INSERT INTO conversations (id, adapter, session, status, created_at, updated_at)
            VALUES (?1, ?2, ?3, 'active', ?4, ?4)
            "#,
        )
        .bind(&id)
        .bind(&origin.adapter)
        .bind(&origin.session)
        .bind(&now)
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Query(format!("conversation insert: {e}")))?;

        debug!(conversation_id = %id, origin = %origin, "Created conversation");
        Ok(ConversationId(id))
    }

    async fn append_message(
        &self,
        id: &ConversationId,
        message: &Message,
    ) -> Result<(), StorageError> {
        let tool_calls = serde_json::to_string(&message.tool_calls)
            .map_err(|e| StorageError::Query(format!("tool_calls encode: {e}")))?;

        sqlx::query(
            r#"
            INSERT INTO messages (conversation_id, id, role, content, tool_calls, tool_call_id, timestamp)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
        )
        .bind(&id.0)
        .bind(&message.id)
        .bind(Self::role_to_str(&message.role))
        .bind(&message.content)
        .bind(&tool_calls)
        .bind(&message.tool_call_id)
        .bind(message.timestamp.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Query(format!("message insert: {e}")))?;

        sqlx::query("UPDATE conversations SET updated_at = ?1 WHERE id = ?2")
            .bind(Utc::now().to_rfc3339())
            .bind(&id.0)
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::Query(format!("conversation touch: {e}")))?;

        Ok(())
    }

    async fn load_messages(&self, id: &ConversationId) -> Result<Vec<Message>, StorageError> {
        let rows = sqlx::query(
            "SELECT * FROM messages WHERE conversation_id = ?1 ORDER BY iid ASC",
        )
        .bind(&id.0)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::Query(format!("message load: {e}")))?;

        rows.iter().map(Self::row_to_message).collect()
    }

    async fn set_status(
        &self,
        id: &ConversationId,
        status: ConversationStatus,
    ) -> Result<(), StorageError> {
        sqlx::query("UPDATE conversations SET status = ?1, updated_at = ?2 WHERE id = ?3")
            .bind(Self::status_to_str(status))
            .bind(Utc::now().to_rfc3339())
            .bind(&id.0)
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::Query(format!("status update: {e}")))?;
        Ok(())
    }

    async fn clear(&self, id: &ConversationId) -> Result<(), StorageError> {
        sqlx::query("DELETE FROM messages WHERE conversation_id = ?1")
            .bind(&id.0)
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::Query(format!("message clear: {e}")))?;
        Ok(())
    }
}

#[async_trait]
impl TaskStore for SqliteStore {
    async fn upsert(&self, task: &ScheduledTask) -> Result<(), StorageError> {
        let trigger = serde_json::to_string(&task.trigger)
            .map_err(|e| StorageError::Query(format!("trigger encode: {e}")))?;

        sqlx::query(
            r#"
            INSERT INTO scheduled_tasks
                (id, name, prompt, trigger, next_due, enabled, created_at, last_run, run_count)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                prompt = excluded.prompt,
                trigger = excluded.trigger,
                next_due = excluded.next_due,
                enabled = excluded.enabled,
                last_run = excluded.last_run,
                run_count = excluded.run_count
            "#,
        )
        .bind(&task.id)
        .bind(&task.name)
        .bind(&task.prompt)
        .bind(&trigger)
        .bind(task.next_due.to_rfc3339())
        .bind(if task.enabled { 1i64 } else { 0i64 })
        .bind(task.created_at.to_rfc3339())
        .bind(task.last_run.map(|t| t.to_rfc3339()))
        .bind(task.run_count as i64)
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Query(format!("task upsert: {e}")))?;
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<ScheduledTask>, StorageError> {
        let row = sqlx::query("SELECT * FROM scheduled_tasks WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StorageError::Query(format!("task get: {e}")))?;
        row.as_ref().map(Self::row_to_task).transpose()
    }

    async fn get_by_name(&self, name: &str) -> Result<Option<ScheduledTask>, StorageError> {
        let row = sqlx::query("SELECT * FROM scheduled_tasks WHERE name = ?1")
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StorageError::Query(format!("task get_by_name: {e}")))?;
        row.as_ref().map(Self::row_to_task).transpose()
    }

    async fn list(&self) -> Result<Vec<ScheduledTask>, StorageError> {
        let rows = sqlx::query("SELECT * FROM scheduled_tasks ORDER BY next_due ASC")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StorageError::Query(format!("task list: {e}")))?;
        rows.iter().map(Self::row_to_task).collect()
    }

    async fn due_before(&self, now: DateTime<Utc>) -> Result<Vec<ScheduledTask>, StorageError> {
        let rows = sqlx::query(
            "SELECT * FROM scheduled_tasks
             WHERE enabled = 1 AND next_due <= ?1
             ORDER BY next_due ASC",
        )
        .bind(now.to_rfc3339())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::Query(format!("task due query: {e}")))?;
        rows.iter().map(Self::row_to_task).collect()
    }

    async fn set_enabled(&self, id: &str, enabled: bool) -> Result<bool, StorageError> {
        let result = sqlx::query("UPDATE scheduled_tasks SET enabled = ?1 WHERE id = ?2")
            .bind(if enabled { 1i64 } else { 0i64 })
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::Query(format!("task enable: {e}")))?;
        Ok(result.rows_affected() > 0)
    }

    async fn remove(&self, id: &str) -> Result<bool, StorageError> {
        let result = sqlx::query("DELETE FROM scheduled_tasks WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::Query(format!("task remove: {e}")))?;
        Ok(result.rows_affected() > 0)
    }
}
