use std::sync::Arc;

use tracing::{info, warn};

use crate::domain::{errors::StoreError, repositories::MessageRepository};

/// What a new run does with messages a previous run marked `failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailedMessagePolicy {
    /// Failed messages stay failed until someone intervenes.
    #[default]
    Keep,
    /// Failed messages go back to `pending` once, before the first pass.
    RequeueOnStartup,
}

impl FailedMessagePolicy {
    pub fn from_flag(retry_failed: bool) -> Self {
        if retry_failed {
            FailedMessagePolicy::RequeueOnStartup
        } else {
            FailedMessagePolicy::Keep
        }
    }
}

pub struct RequeueFailedMessages {
    repo: Arc<dyn MessageRepository>,
    policy: FailedMessagePolicy,
}

impl RequeueFailedMessages {
    pub fn new(repo: Arc<dyn MessageRepository>, policy: FailedMessagePolicy) -> Self {
        Self { repo, policy }
    }

    pub async fn execute(&self) -> Result<u64, StoreError> {
        match self.policy {
            FailedMessagePolicy::Keep => Ok(0),
            FailedMessagePolicy::RequeueOnStartup => {
                let requeued = self.repo.requeue_failed().await?;
                if requeued > 0 {
                    warn!(requeued, "failed messages moved back to pending");
                } else {
                    info!("no failed messages to requeue");
                }
                Ok(requeued)
            }
        }
    }
}
