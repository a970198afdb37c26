use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, Pool, Postgres, postgres::PgPoolOptions};
use uuid::Uuid;

use crate::domain::{
    errors::{StoreError, ValidationError},
    models::{Message, MessageGroup, MessageStatus, NewMessage, StatusCounts},
    repositories::MessageRepository,
};

pub type PgPool = Pool<Postgres>;

/// Opens the pool and brings the schema up to date. Any failure here is a
/// connection error: the process cannot do anything useful without the store.
pub async fn connect(url: &str, max_connections: u32) -> Result<PgPool, StoreError> {
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(url)
        .await
        .map_err(|err| StoreError::Connection(err.to_string()))?;

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .map_err(|err| StoreError::Connection(format!("migration failed: {err}")))?;

    Ok(pool)
}

#[derive(Clone)]
pub struct PostgresMessageRepository {
    pool: PgPool,
}

impl PostgresMessageRepository {
    pub fn new(pool: PgPool) -> Arc<Self> {
        Arc::new(Self { pool })
    }
}

#[async_trait]
impl MessageRepository for PostgresMessageRepository {
    async fn insert(&self, message: NewMessage) -> Result<Message, StoreError> {
        if message.content.is_empty() {
            return Err(ValidationError::EmptyContent.into());
        }

        let record = sqlx::query_as::<_, MessageRecord>(
            r#"
            INSERT INTO messages (id, group_name, sequence_index, recipient, content, status, created_at)
            VALUES ($1, $2, $3, $4, $5, 'pending', NOW())
            RETURNING id, group_name, sequence_index, recipient, content, status,
                      failure_reason, created_at, sent_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(message.group.as_str())
        .bind(message.sequence_index)
        .bind(&message.recipient)
        .bind(&message.content)
        .fetch_one(&self.pool)
        .await
        .map_err(|err| {
            if is_unique_violation(&err) {
                StoreError::AlreadyExists {
                    group: message.group,
                    sequence_index: message.sequence_index,
                }
            } else {
                map_sqlx(err)
            }
        })?;

        Ok(record.try_into()?)
    }

    async fn list_due(&self) -> Result<Vec<Message>, StoreError> {
        let rows = sqlx::query_as::<_, MessageRecord>(
            r#"
            SELECT id, group_name, sequence_index, recipient, content, status,
                   failure_reason, created_at, sent_at
            FROM messages
            WHERE status = 'pending'
            ORDER BY group_name COLLATE "C" ASC, sequence_index ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx)?;

        rows.into_iter()
            .map(|record| Message::try_from(record).map_err(StoreError::Other))
            .collect()
    }

    async fn mark_sent(&self, message: &Message) -> Result<Message, StoreError> {
        let record = sqlx::query_as::<_, MessageRecord>(
            r#"
            UPDATE messages
            SET status = 'sent',
                sent_at = GREATEST($2, created_at),
                failure_reason = NULL
            WHERE id = $1 AND status = 'pending'
            RETURNING id, group_name, sequence_index, recipient, content, status,
                      failure_reason, created_at, sent_at
            "#,
        )
        .bind(message.id)
        .bind(Utc::now())
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx)?
        .ok_or(StoreError::Conflict(message.id))?;

        Ok(record.try_into()?)
    }

    async fn mark_failed(&self, message: &Message, reason: &str) -> Result<Message, StoreError> {
        let record = sqlx::query_as::<_, MessageRecord>(
            r#"
            UPDATE messages
            SET status = 'failed',
                failure_reason = $2
            WHERE id = $1 AND status = 'pending'
            RETURNING id, group_name, sequence_index, recipient, content, status,
                      failure_reason, created_at, sent_at
            "#,
        )
        .bind(message.id)
        .bind(reason)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx)?
        .ok_or(StoreError::Conflict(message.id))?;

        Ok(record.try_into()?)
    }

    async fn delete_where_status(&self, status: MessageStatus) -> Result<u64, StoreError> {
        if !status.is_terminal() {
            return Err(ValidationError::NonTerminalPurge(status.as_str()).into());
        }

        let result = sqlx::query(r#"DELETE FROM messages WHERE status = $1"#)
            .bind(status.as_str())
            .execute(&self.pool)
            .await
            .map_err(map_sqlx)?;
        Ok(result.rows_affected())
    }

    async fn requeue_failed(&self) -> Result<u64, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE messages
            SET status = 'pending',
                failure_reason = NULL
            WHERE status = 'failed'
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(map_sqlx)?;
        Ok(result.rows_affected())
    }

    async fn count_by_status(&self) -> Result<StatusCounts, StoreError> {
        let rows: Vec<(String, i64)> =
            sqlx::query_as(r#"SELECT status, COUNT(*) FROM messages GROUP BY status"#)
                .fetch_all(&self.pool)
                .await
                .map_err(map_sqlx)?;

        let mut counts = StatusCounts::default();
        for (status, count) in rows {
            let count = count as u64;
            match MessageStatus::from_str(&status) {
                Some(MessageStatus::Pending) => counts.pending = count,
                Some(MessageStatus::Sent) => counts.sent = count,
                Some(MessageStatus::Failed) => counts.failed = count,
                None => return Err(anyhow::anyhow!("unknown message status {status}").into()),
            }
        }
        Ok(counts)
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}

fn map_sqlx(err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
            StoreError::Connection(err.to_string())
        }
        other => StoreError::Other(other.into()),
    }
}

#[derive(FromRow)]
struct MessageRecord {
    id: Uuid,
    group_name: String,
    sequence_index: i32,
    recipient: String,
    content: String,
    status: String,
    failure_reason: Option<String>,
    created_at: DateTime<Utc>,
    sent_at: Option<DateTime<Utc>>,
}

impl TryFrom<MessageRecord> for Message {
    type Error = anyhow::Error;

    fn try_from(value: MessageRecord) -> Result<Self, Self::Error> {
        let group = MessageGroup::from_str(&value.group_name)
            .ok_or_else(|| anyhow::anyhow!("unknown message group {}", value.group_name))?;
        let status = MessageStatus::from_str(&value.status)
            .ok_or_else(|| anyhow::anyhow!("unknown message status {}", value.status))?;

        Ok(Self {
            id: value.id,
            group,
            sequence_index: value.sequence_index,
            recipient: value.recipient,
            content: value.content,
            status,
            failure_reason: value.failure_reason,
            created_at: value.created_at,
            sent_at: value.sent_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(group: &str, status: &str) -> MessageRecord {
        MessageRecord {
            id: Uuid::new_v4(),
            group_name: group.to_string(),
            sequence_index: 4,
            recipient: "0300 1234567".to_string(),
            content: "hi".to_string(),
            status: status.to_string(),
            failure_reason: None,
            created_at: Utc::now(),
            sent_at: None,
        }
    }

    #[test]
    fn maps_known_rows() {
        let message = Message::try_from(record("PIEAS", "pending")).unwrap();
        assert_eq!(message.group, MessageGroup::Pieas);
        assert_eq!(message.status, MessageStatus::Pending);
        assert_eq!(message.sequence_index, 4);
    }

    #[test]
    fn rejects_unknown_group_and_status() {
        assert!(Message::try_from(record("LUMS", "pending")).is_err());
        assert!(Message::try_from(record("NUST", "retrying")).is_err());
    }

    fn new_message(group: MessageGroup, sequence_index: i32) -> NewMessage {
        NewMessage {
            group,
            sequence_index,
            recipient: "0300-1234567".to_string(),
            content: format!("{group} #{sequence_index}"),
        }
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "requires DATABASE_URL pointing at a PostgreSQL server"]
    async fn duplicate_position_is_rejected(pool: PgPool) {
        let repo = PostgresMessageRepository::new(pool);
        repo.insert(new_message(MessageGroup::Nust, 1)).await.unwrap();

        let err = repo.insert(new_message(MessageGroup::Nust, 1)).await.unwrap_err();
        assert!(matches!(
            err,
            StoreError::AlreadyExists { group: MessageGroup::Nust, sequence_index: 1 }
        ));

        let mut empty = new_message(MessageGroup::Nust, 2);
        empty.content.clear();
        assert!(matches!(
            repo.insert(empty).await.unwrap_err(),
            StoreError::Validation(ValidationError::EmptyContent)
        ));
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "requires DATABASE_URL pointing at a PostgreSQL server"]
    async fn due_messages_follow_group_then_sequence(pool: PgPool) {
        let repo = PostgresMessageRepository::new(pool);
        for (group, seq) in [
            (MessageGroup::Pieas, 1),
            (MessageGroup::Nust, 10),
            (MessageGroup::Fast, 3),
            (MessageGroup::Nust, 2),
            (MessageGroup::Giki, 1),
        ] {
            repo.insert(new_message(group, seq)).await.unwrap();
        }
        let skipped = repo.insert(new_message(MessageGroup::Nums, 1)).await.unwrap();
        repo.mark_failed(&skipped, "rejected").await.unwrap();

        let order: Vec<_> = repo
            .list_due()
            .await
            .unwrap()
            .iter()
            .map(Message::queue_key)
            .collect();
        assert_eq!(
            order,
            vec![
                (MessageGroup::Fast, 3),
                (MessageGroup::Giki, 1),
                (MessageGroup::Nust, 2),
                (MessageGroup::Nust, 10),
                (MessageGroup::Pieas, 1),
            ]
        );
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "requires DATABASE_URL pointing at a PostgreSQL server"]
    async fn transitions_only_apply_to_pending(pool: PgPool) {
        let repo = PostgresMessageRepository::new(pool);
        let a = repo.insert(new_message(MessageGroup::Fast, 1)).await.unwrap();
        let b = repo.insert(new_message(MessageGroup::Fast, 2)).await.unwrap();

        let sent = repo.mark_sent(&a).await.unwrap();
        assert_eq!(sent.status, MessageStatus::Sent);
        assert!(sent.sent_at.unwrap() >= sent.created_at);

        let failed = repo.mark_failed(&b, "chat not found").await.unwrap();
        assert_eq!(failed.status, MessageStatus::Failed);
        assert_eq!(failed.failure_reason.as_deref(), Some("chat not found"));
        assert_eq!(failed.sent_at, None);

        assert!(matches!(repo.mark_sent(&a).await.unwrap_err(), StoreError::Conflict(id) if id == a.id));
        assert!(matches!(repo.mark_sent(&b).await.unwrap_err(), StoreError::Conflict(id) if id == b.id));
        assert!(matches!(
            repo.mark_failed(&a, "late").await.unwrap_err(),
            StoreError::Conflict(_)
        ));

        let counts = repo.count_by_status().await.unwrap();
        assert_eq!((counts.pending, counts.sent, counts.failed), (0, 1, 1));
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "requires DATABASE_URL pointing at a PostgreSQL server"]
    async fn purge_and_requeue(pool: PgPool) {
        let repo = PostgresMessageRepository::new(pool);
        let a = repo.insert(new_message(MessageGroup::Giki, 1)).await.unwrap();
        let b = repo.insert(new_message(MessageGroup::Giki, 2)).await.unwrap();
        repo.insert(new_message(MessageGroup::Giki, 3)).await.unwrap();
        repo.mark_sent(&a).await.unwrap();
        repo.mark_failed(&b, "rejected").await.unwrap();

        assert!(matches!(
            repo.delete_where_status(MessageStatus::Pending).await.unwrap_err(),
            StoreError::Validation(ValidationError::NonTerminalPurge(_))
        ));
        assert_eq!(repo.delete_where_status(MessageStatus::Sent).await.unwrap(), 1);
        assert_eq!(repo.requeue_failed().await.unwrap(), 1);

        let due = repo.list_due().await.unwrap();
        assert_eq!(due.len(), 2);
        assert!(due.iter().all(|m| m.failure_reason.is_none()));
        assert_eq!(repo.count_by_status().await.unwrap().sent, 0);
    }

    #[test]
    fn pool_failures_are_connection_errors() {
        assert!(matches!(map_sqlx(sqlx::Error::PoolTimedOut), StoreError::Connection(_)));
        assert!(matches!(map_sqlx(sqlx::Error::RowNotFound), StoreError::Other(_)));
    }
}
