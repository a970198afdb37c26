use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::{
    application::{
        services::{pacer::Pacer, stop_signal, transport::TransportSession},
        usecases::purge_sent::PurgeSentMessages,
    },
    domain::{
        errors::StoreError, models::Message, repositories::MessageRepository,
        value_objects::ChatId,
    },
};

#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// Minimum gap between consecutive send attempts.
    pub pacing_delay: Duration,
    /// Appended to the digits of every recipient.
    pub chat_suffix: String,
}

/// Outcome of a single dispatch pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassReport {
    pub due: usize,
    pub sent: usize,
    pub failed: usize,
    pub store_errors: usize,
    /// Remaining due messages were left `pending` for the next pass.
    pub interrupted: bool,
    pub purged: u64,
}

impl PassReport {
    pub fn attempted(&self) -> usize {
        self.sent + self.failed + self.store_errors
    }
}

enum Delivery {
    Sent,
    Failed { disconnected: bool },
    StoreWriteFailed,
}

pub struct MessageDispatcher {
    store: Arc<dyn MessageRepository>,
    transport: TransportSession,
    pacer: Arc<dyn Pacer>,
    retention: PurgeSentMessages,
    config: DispatchConfig,
    shutdown: Option<watch::Receiver<bool>>,
    /// Set when the previous pass stopped after a send attempt, so the next
    /// pass paces its first send too.
    resume_paced: AtomicBool,
}

impl MessageDispatcher {
    pub fn new(
        store: Arc<dyn MessageRepository>,
        transport: TransportSession,
        pacer: Arc<dyn Pacer>,
        retention: PurgeSentMessages,
        config: DispatchConfig,
    ) -> Self {
        Self {
            store,
            transport,
            pacer,
            retention,
            config,
            shutdown: None,
            resume_paced: AtomicBool::new(false),
        }
    }

    /// Stops passes between messages once the receiver observes `true`.
    pub fn with_shutdown(mut self, shutdown: watch::Receiver<bool>) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    fn shutdown_requested(&self) -> bool {
        self.shutdown.as_ref().is_some_and(|rx| *rx.borrow())
    }

    /// Returns `false` if shutdown arrived before the transport became ready.
    async fn wait_for_transport(&self) -> bool {
        let gate = self.transport.gate();
        match &self.shutdown {
            None => {
                gate.wait_ready().await;
                true
            }
            Some(rx) => {
                let mut rx = rx.clone();
                tokio::select! {
                    biased;
                    _ = stop_signal::requested(&mut rx) => false,
                    _ = gate.wait_ready() => true,
                }
            }
        }
    }

    /// Waits for the transport, then sends every due message once, in queue
    /// order. Only failing to read the due set is an error; everything that
    /// goes wrong with an individual message is recorded and skipped.
    pub async fn run_pass(&self) -> Result<PassReport, StoreError> {
        if !self.wait_for_transport().await {
            return Ok(PassReport {
                interrupted: true,
                ..Default::default()
            });
        }

        let due = self.store.list_due().await?;
        let mut report = PassReport {
            due: due.len(),
            ..Default::default()
        };

        if due.is_empty() {
            info!("no pending messages found");
            return Ok(report);
        }

        info!(count = due.len(), "found pending messages, processing");

        let resume_paced = self.resume_paced.swap(false, Ordering::SeqCst);

        for (position, message) in due.iter().enumerate() {
            if self.shutdown_requested() {
                warn!(remaining = due.len() - position, "shutdown requested, stopping pass");
                report.interrupted = true;
                break;
            }

            if position > 0 || resume_paced {
                self.pacer.pause(self.config.pacing_delay).await;
            }

            if !self.transport.is_ready() {
                warn!(
                    remaining = due.len() - position,
                    "transport went away mid-batch, leaving remaining messages pending"
                );
                report.interrupted = true;
                break;
            }

            match self.deliver(message).await {
                Delivery::Sent => report.sent += 1,
                Delivery::StoreWriteFailed => report.store_errors += 1,
                Delivery::Failed { disconnected } => {
                    report.failed += 1;
                    if disconnected {
                        // The watcher may not have seen the drop yet; hold
                        // further sends until the transport reports ready.
                        self.transport.gate().close();
                        warn!(
                            remaining = due.len() - position - 1,
                            "transport disconnected, leaving remaining messages pending"
                        );
                        report.interrupted = true;
                        break;
                    }
                }
            }
        }

        info!(
            sent = report.sent,
            failed = report.failed,
            store_errors = report.store_errors,
            interrupted = report.interrupted,
            "dispatch pass finished"
        );

        if report.interrupted && report.attempted() > 0 {
            self.resume_paced.store(true, Ordering::SeqCst);
        }

        if !report.interrupted {
            match self.retention.execute().await {
                Ok(purged) => report.purged = purged,
                Err(err) => error!(error = %err, "failed to purge sent messages"),
            }
        }

        Ok(report)
    }

    async fn deliver(&self, message: &Message) -> Delivery {
        let chat_id = match ChatId::normalize(&message.recipient, &self.config.chat_suffix) {
            Ok(chat_id) => chat_id,
            Err(err) => {
                error!(
                    group = %message.group,
                    sequence_index = message.sequence_index,
                    recipient = %message.recipient,
                    error = %err,
                    "invalid recipient"
                );
                return self.record_failure(message, &err.to_string(), false).await;
            }
        };

        info!(
            group = %message.group,
            sequence_index = message.sequence_index,
            recipient = %message.recipient,
            "sending message"
        );

        match self.transport.send(&chat_id, &message.content).await {
            Ok(()) => match self.store.mark_sent(message).await {
                Ok(_) => {
                    info!(
                        group = %message.group,
                        sequence_index = message.sequence_index,
                        "message sent and marked as delivered"
                    );
                    Delivery::Sent
                }
                Err(err) => {
                    // Delivered but still pending in the store; a later pass
                    // will pick it up again.
                    error!(
                        message_id = %message.id,
                        group = %message.group,
                        sequence_index = message.sequence_index,
                        recipient = %message.recipient,
                        error = %err,
                        "message delivered but could not be marked sent"
                    );
                    Delivery::StoreWriteFailed
                }
            },
            Err(err) => {
                error!(
                    group = %message.group,
                    sequence_index = message.sequence_index,
                    recipient = %message.recipient,
                    error = %err,
                    "error sending message"
                );
                self.record_failure(message, &err.to_string(), err.is_disconnect())
                    .await
            }
        }
    }

    async fn record_failure(&self, message: &Message, reason: &str, disconnected: bool) -> Delivery {
        match self.store.mark_failed(message, reason).await {
            Ok(_) => Delivery::Failed { disconnected },
            Err(err) => {
                error!(
                    message_id = %message.id,
                    group = %message.group,
                    sequence_index = message.sequence_index,
                    recipient = %message.recipient,
                    error = %err,
                    "could not mark message failed"
                );
                Delivery::StoreWriteFailed
            }
        }
    }
}
