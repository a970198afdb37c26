use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::{
    application::services::readiness::ReadinessGate,
    domain::{errors::TransportError, value_objects::ChatId},
};

/// Lifecycle notifications emitted by a transport session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// Pairing is required; the payload must reach an operator.
    QrCode(String),
    Authenticated,
    Ready,
    Disconnected(String),
}

pub type TransportEvents = mpsc::UnboundedSender<TransportEvent>;

#[async_trait]
pub trait TransportClient: Send + Sync {
    fn name(&self) -> &'static str;

    /// Starts a fresh session. Lifecycle changes are reported on `events`
    /// until the session disconnects; calling this again replaces the session.
    async fn initialize(&self, events: TransportEvents) -> Result<(), TransportError>;

    async fn send(&self, chat_id: &ChatId, text: &str) -> Result<(), TransportError>;
}

/// Transport handle plus the readiness latch that tracks it.
#[derive(Clone)]
pub struct TransportSession {
    client: Arc<dyn TransportClient>,
    gate: ReadinessGate,
}

impl TransportSession {
    pub fn new(client: Arc<dyn TransportClient>, gate: ReadinessGate) -> Self {
        Self { client, gate }
    }

    pub fn client(&self) -> &Arc<dyn TransportClient> {
        &self.client
    }

    pub fn gate(&self) -> &ReadinessGate {
        &self.gate
    }

    pub fn is_ready(&self) -> bool {
        self.gate.is_ready()
    }

    pub async fn send(&self, chat_id: &ChatId, text: &str) -> Result<(), TransportError> {
        if !self.gate.is_ready() {
            return Err(TransportError::NotReady);
        }
        self.client.send(chat_id, text).await
    }
}
