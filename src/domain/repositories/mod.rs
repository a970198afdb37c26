use async_trait::async_trait;

use crate::domain::{
    errors::StoreError,
    models::{Message, MessageStatus, NewMessage, StatusCounts},
};

#[async_trait]
pub trait MessageRepository: Send + Sync {
    async fn insert(&self, message: NewMessage) -> Result<Message, StoreError>;

    /// All `pending` messages ordered by `(group, sequence_index)` ascending.
    async fn list_due(&self) -> Result<Vec<Message>, StoreError>;

    /// `pending -> sent`, stamping `sent_at`. Fails with `Conflict` when the
    /// record is gone or has left `pending`.
    async fn mark_sent(&self, message: &Message) -> Result<Message, StoreError>;

    /// `pending -> failed`. Same conflict rules as `mark_sent`.
    async fn mark_failed(&self, message: &Message, reason: &str) -> Result<Message, StoreError>;

    async fn delete_where_status(&self, status: MessageStatus) -> Result<u64, StoreError>;

    /// `failed -> pending` for every failed record. Returns how many moved.
    async fn requeue_failed(&self) -> Result<u64, StoreError>;

    async fn count_by_status(&self) -> Result<StatusCounts, StoreError>;
}
