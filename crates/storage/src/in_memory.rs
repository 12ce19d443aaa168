//! In-memory store — for tests and ephemeral sessions.

use crate::{ConversationStore, TaskStore};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use roost_core::error::StorageError;
use roost_core::message::{ConversationId, ConversationOrigin, ConversationStatus, Message};
use roost_core::schedule::ScheduledTask;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Default)]
struct Inner {
    /// origin -> conversation id
    by_origin: HashMap<ConversationOrigin, ConversationId>,
    /// conversation id -> ordered messages
    messages: HashMap<ConversationId, Vec<Message>>,
    statuses: HashMap<ConversationId, ConversationStatus>,
    tasks: HashMap<String, ScheduledTask>,
}

pub struct InMemoryStore {
    inner: RwLock<Inner>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ConversationStore for InMemoryStore {
    fn name(&self) -> &str {
        "in_memory"
    }

    async fn get_or_create(
        &self,
        origin: &ConversationOrigin,
    ) -> Result<ConversationId, StorageError> {
        let mut inner = self.inner.write().await;
        if let Some(id) = inner.by_origin.get(origin) {
            return Ok(id.clone());
        }
        let id = ConversationId(Uuid::new_v4().to_string());
        inner.by_origin.insert(origin.clone(), id.clone());
        inner.messages.insert(id.clone(), Vec::new());
        inner.statuses.insert(id.clone(), ConversationStatus::Active);
        Ok(id)
    }

    async fn append_message(
        &self,
        id: &ConversationId,
        message: &Message,
    ) -> Result<(), StorageError> {
        let mut inner = self.inner.write().await;
        inner
            .messages
            .entry(id.clone())
            .or_default()
            .push(message.clone());
        Ok(())
    }

    async fn load_messages(&self, id: &ConversationId) -> Result<Vec<Message>, StorageError> {
        Ok(self
            .inner
            .read()
            .await
            .messages
            .get(id)
            .cloned()
            .unwrap_or_default())
    }

    async fn set_status(
        &self,
        id: &ConversationId,
        status: ConversationStatus,
    ) -> Result<(), StorageError> {
        self.inner
            .write()
            .await
            .statuses
            .insert(id.clone(), status);
        Ok(())
    }

    async fn clear(&self, id: &ConversationId) -> Result<(), StorageError> {
        if let Some(messages) = self.inner.write().await.messages.get_mut(id) {
            messages.clear();
        }
        Ok(())
    }
}

#[async_trait]
impl TaskStore for InMemoryStore {
    async fn upsert(&self, task: &ScheduledTask) -> Result<(), StorageError> {
        self.inner
            .write()
            .await
            .tasks
            .insert(task.id.clone(), task.clone());
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<ScheduledTask>, StorageError> {
        Ok(self.inner.read().await.tasks.get(id).cloned())
    }

    async fn get_by_name(&self, name: &str) -> Result<Option<ScheduledTask>, StorageError> {
        Ok(self
            .inner
            .read()
            .await
            .tasks
            .values()
            .find(|t| t.name == name)
            .cloned())
    }

    async fn list(&self) -> Result<Vec<ScheduledTask>, StorageError> {
        let mut tasks: Vec<ScheduledTask> = self.inner.read().await.tasks.values().cloned().collect();
        tasks.sort_by_key(|t| t.next_due);
        Ok(tasks)
    }

    async fn due_before(&self, now: DateTime<Utc>) -> Result<Vec<ScheduledTask>, StorageError> {
        let mut due: Vec<ScheduledTask> = self
            .inner
            .read()
            .await
            .tasks
            .values()
            .filter(|t| t.enabled && t.next_due <= now)
            .cloned()
            .collect();
        due.sort_by_key(|t| t.next_due);
        Ok(due)
    }

    async fn set_enabled(&self, id: &str, enabled: bool) -> Result<bool, StorageError> {
        let mut inner = self.inner.write().await;
        match inner.tasks.get_mut(id) {
            Some(task) => {
                task.enabled = enabled;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn remove(&self, id: &str) -> Result<bool, StorageError> {
        Ok(self.inner.write().await.tasks.remove(id).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use roost_core::schedule::TriggerSpec;

    #[tokio::test]
    async fn conversation_roundtrip() {
        let store = InMemoryStore::new();
        let origin = ConversationOrigin::new("cli", "s1");
        let id = store.get_or_create(&origin).await.unwrap();
        assert_eq!(store.get_or_create(&origin).await.unwrap(), id);

        store.append_message(&id, &Message::user("hello")).await.unwrap();
        let messages = store.load_messages(&id).await.unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].content, "hello");
    }

    #[tokio::test]
    async fn due_filtering_respects_enabled() {
        let store = InMemoryStore::new();
        let now = Utc::now();
        let mut task = ScheduledTask::new(
            "t",
            "p",
            TriggerSpec::Interval { secs: 60 },
            now - Duration::seconds(1),
        );
        task.enabled = false;
        store.upsert(&task).await.unwrap();
        assert!(store.due_before(now).await.unwrap().is_empty());

        store.set_enabled(&task.id, true).await.unwrap();
        assert_eq!(store.due_before(now).await.unwrap().len(), 1);
    }
}
