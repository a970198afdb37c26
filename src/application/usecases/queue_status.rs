use std::sync::Arc;

use crate::{
    application::services::readiness::ReadinessGate,
    domain::{errors::StoreError, models::StatusCounts, repositories::MessageRepository},
};

pub struct QueueStatus {
    pub ready: bool,
    pub counts: StatusCounts,
}

pub struct GetQueueStatusUseCase {
    repo: Arc<dyn MessageRepository>,
    gate: ReadinessGate,
}

impl GetQueueStatusUseCase {
    pub fn new(repo: Arc<dyn MessageRepository>, gate: ReadinessGate) -> Self {
        Self { repo, gate }
    }

    pub async fn execute(&self) -> Result<QueueStatus, StoreError> {
        Ok(QueueStatus {
            ready: self.gate.is_ready(),
            counts: self.repo.count_by_status().await?,
        })
    }
}
