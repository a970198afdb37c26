use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::group::MessageGroup;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum MessageStatus {
    Pending,
    Sent,
    Failed,
}

impl MessageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageStatus::Pending => "pending",
            MessageStatus::Sent => "sent",
            MessageStatus::Failed => "failed",
        }
    }

    pub fn from_str(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(MessageStatus::Pending),
            "sent" => Some(MessageStatus::Sent),
            "failed" => Some(MessageStatus::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, MessageStatus::Pending)
    }
}

impl std::fmt::Display for MessageStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Message {
    pub id: Uuid,
    pub group: MessageGroup,
    pub sequence_index: i32,
    /// Raw contact number as entered; normalized at send time.
    pub recipient: String,
    pub content: String,
    pub status: MessageStatus,
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    /// Present exactly when `status` is `Sent`.
    pub sent_at: Option<DateTime<Utc>>,
}

impl Message {
    pub fn is_due(&self) -> bool {
        self.status == MessageStatus::Pending
    }

    /// Ordering key used by `list_due`.
    pub fn queue_key(&self) -> (MessageGroup, i32) {
        (self.group, self.sequence_index)
    }
}

#[derive(Debug, Clone)]
pub struct NewMessage {
    pub group: MessageGroup,
    pub sequence_index: i32,
    pub recipient: String,
    pub content: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatusCounts {
    pub pending: u64,
    pub sent: u64,
    pub failed: u64,
}
