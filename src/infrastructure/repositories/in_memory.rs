use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::domain::{
    errors::{StoreError, ValidationError},
    models::{Message, MessageStatus, NewMessage, StatusCounts},
    repositories::MessageRepository,
};

#[derive(Default)]
pub struct InMemoryMessageRepository {
    messages: Arc<RwLock<HashMap<Uuid, Message>>>,
}

impl InMemoryMessageRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, id: Uuid) -> Option<Message> {
        let messages = self.messages.read().await;
        messages.get(&id).cloned()
    }

    async fn transition(
        &self,
        message: &Message,
        apply: impl FnOnce(&mut Message),
    ) -> Result<Message, StoreError> {
        let mut messages = self.messages.write().await;
        match messages.get_mut(&message.id) {
            Some(entry) if entry.status == MessageStatus::Pending => {
                apply(entry);
                Ok(entry.clone())
            }
            _ => Err(StoreError::Conflict(message.id)),
        }
    }
}

#[async_trait]
impl MessageRepository for InMemoryMessageRepository {
    async fn insert(&self, message: NewMessage) -> Result<Message, StoreError> {
        if message.content.is_empty() {
            return Err(ValidationError::EmptyContent.into());
        }

        let mut messages = self.messages.write().await;
        let taken = messages
            .values()
            .any(|m| m.group == message.group && m.sequence_index == message.sequence_index);
        if taken {
            return Err(StoreError::AlreadyExists {
                group: message.group,
                sequence_index: message.sequence_index,
            });
        }

        let entry = Message {
            id: Uuid::new_v4(),
            group: message.group,
            sequence_index: message.sequence_index,
            recipient: message.recipient,
            content: message.content,
            status: MessageStatus::Pending,
            failure_reason: None,
            created_at: Utc::now(),
            sent_at: None,
        };
        messages.insert(entry.id, entry.clone());
        Ok(entry)
    }

    async fn list_due(&self) -> Result<Vec<Message>, StoreError> {
        let messages = self.messages.read().await;
        let mut due: Vec<Message> = messages.values().filter(|m| m.is_due()).cloned().collect();
        due.sort_by_key(Message::queue_key);
        Ok(due)
    }

    async fn mark_sent(&self, message: &Message) -> Result<Message, StoreError> {
        self.transition(message, |entry| {
            entry.status = MessageStatus::Sent;
            entry.sent_at = Some(Utc::now().max(entry.created_at));
        })
        .await
    }

    async fn mark_failed(&self, message: &Message, reason: &str) -> Result<Message, StoreError> {
        self.transition(message, |entry| {
            entry.status = MessageStatus::Failed;
            entry.failure_reason = Some(reason.to_string());
        })
        .await
    }

    async fn delete_where_status(&self, status: MessageStatus) -> Result<u64, StoreError> {
        if !status.is_terminal() {
            return Err(ValidationError::NonTerminalPurge(status.as_str()).into());
        }

        let mut messages = self.messages.write().await;
        let before = messages.len();
        messages.retain(|_, m| m.status != status);
        Ok((before - messages.len()) as u64)
    }

    async fn requeue_failed(&self) -> Result<u64, StoreError> {
        let mut messages = self.messages.write().await;
        let mut requeued = 0;
        for entry in messages.values_mut().filter(|m| m.status == MessageStatus::Failed) {
            entry.status = MessageStatus::Pending;
            entry.failure_reason = None;
            requeued += 1;
        }
        Ok(requeued)
    }

    async fn count_by_status(&self) -> Result<StatusCounts, StoreError> {
        let messages = self.messages.read().await;
        let mut counts = StatusCounts::default();
        for message in messages.values() {
            match message.status {
                MessageStatus::Pending => counts.pending += 1,
                MessageStatus::Sent => counts.sent += 1,
                MessageStatus::Failed => counts.failed += 1,
            }
        }
        Ok(counts)
    }
}
