use thiserror::Error;
use uuid::Uuid;

use crate::domain::models::MessageGroup;

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("recipient {0:?} contains no digits")]
    EmptyRecipient(String),
    #[error("message content must not be empty")]
    EmptyContent,
    #[error("only terminal statuses can be purged, got {0}")]
    NonTerminalPurge(&'static str),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store connection failed: {0}")]
    Connection(String),
    #[error("message already exists: {group} #{sequence_index}")]
    AlreadyExists {
        group: MessageGroup,
        sequence_index: i32,
    },
    #[error("message {0} is missing or no longer pending")]
    Conflict(Uuid),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("transport is not ready")]
    NotReady,
    #[error("transport disconnected: {0}")]
    Disconnected(String),
    #[error("send failed: {0}")]
    Send(String),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl TransportError {
    /// Connection-level failures end the current pass; the rest are per message.
    pub fn is_disconnect(&self) -> bool {
        matches!(self, TransportError::NotReady | TransportError::Disconnected(_))
    }
}
