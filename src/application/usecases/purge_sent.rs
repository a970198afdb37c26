use std::sync::Arc;

use tracing::info;

use crate::domain::{errors::StoreError, models::MessageStatus, repositories::MessageRepository};

/// Removes delivered records after a pass. Disabled unless configured.
#[derive(Clone)]
pub struct PurgeSentMessages {
    repo: Arc<dyn MessageRepository>,
    enabled: bool,
}

impl PurgeSentMessages {
    pub fn new(repo: Arc<dyn MessageRepository>, enabled: bool) -> Self {
        Self { repo, enabled }
    }

    pub async fn execute(&self) -> Result<u64, StoreError> {
        if !self.enabled {
            return Ok(0);
        }

        info!("deleting sent messages from store");
        let deleted = self.repo.delete_where_status(MessageStatus::Sent).await?;
        info!(deleted, "sent messages deleted");
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        domain::models::{MessageGroup, NewMessage},
        infrastructure::repositories::in_memory::InMemoryMessageRepository,
    };

    async fn seeded() -> Arc<InMemoryMessageRepository> {
        let repo = Arc::new(InMemoryMessageRepository::new());
        for seq in 1..=4 {
            let message = repo
                .insert(NewMessage {
                    group: MessageGroup::Nust,
                    sequence_index: seq,
                    recipient: "03001234567".to_string(),
                    content: format!("hello {seq}"),
                })
                .await
                .unwrap();
            match seq {
                1 | 2 => {
                    repo.mark_sent(&message).await.unwrap();
                }
                3 => {
                    repo.mark_failed(&message, "boom").await.unwrap();
                }
                _ => {}
            }
        }
        repo
    }

    #[tokio::test]
    async fn disabled_policy_keeps_everything() {
        let repo = seeded().await;
        let purge = PurgeSentMessages::new(repo.clone(), false);

        assert_eq!(purge.execute().await.unwrap(), 0);
        assert_eq!(repo.count_by_status().await.unwrap().sent, 2);
    }

    #[tokio::test]
    async fn enabled_policy_only_touches_sent() {
        let repo = seeded().await;
        let purge = PurgeSentMessages::new(repo.clone(), true);

        assert_eq!(purge.execute().await.unwrap(), 2);
        let counts = repo.count_by_status().await.unwrap();
        assert_eq!(counts.sent, 0);
        assert_eq!(counts.failed, 1);
        assert_eq!(counts.pending, 1);

        // Idempotent.
        assert_eq!(purge.execute().await.unwrap(), 0);
        assert_eq!(repo.count_by_status().await.unwrap(), counts);
    }
}
