use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::application::services::{
    qr_code::QrCodeSink,
    stop_signal,
    transport::{TransportEvent, TransportEvents, TransportSession},
};

/// Owns the transport lifecycle: initializes the client, mirrors its events
/// into the readiness gate and re-initializes after a fixed backoff whenever
/// the session drops.
pub struct TransportSupervisor {
    session: TransportSession,
    qr_sink: Arc<dyn QrCodeSink>,
    reconnect_backoff: Duration,
}

impl TransportSupervisor {
    pub fn new(
        session: TransportSession,
        qr_sink: Arc<dyn QrCodeSink>,
        reconnect_backoff: Duration,
    ) -> Self {
        Self {
            session,
            qr_sink,
            reconnect_backoff,
        }
    }

    pub fn spawn(self, shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }

    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let (events, mut inbox) = mpsc::unbounded_channel();

        if !self.connect(&events, &mut shutdown).await {
            return;
        }

        loop {
            tokio::select! {
                biased;
                _ = stop_signal::requested(&mut shutdown) => break,
                Some(event) = inbox.recv() => {
                    if !self.handle(event, &events, &mut shutdown).await {
                        break;
                    }
                }
                // A sender saw the connection drop before the client reported it.
                _ = self.session.gate().closed(), if self.session.is_ready() => {
                    let reason = "send reported disconnect".to_string();
                    if !self.reconnect(reason, &events, &mut shutdown).await {
                        break;
                    }
                }
            }
        }

        self.session.gate().close();
        info!("transport supervisor stopped");
    }

    /// Returns `false` when shutdown interrupted the handling.
    async fn handle(
        &self,
        event: TransportEvent,
        events: &TransportEvents,
        shutdown: &mut watch::Receiver<bool>,
    ) -> bool {
        match event {
            TransportEvent::QrCode(data) => {
                if let Err(err) = self.qr_sink.publish(&data).await {
                    error!(error = %err, "failed to surface QR code");
                }
                true
            }
            TransportEvent::Authenticated => {
                info!(transport = self.session.client().name(), "authentication successful");
                true
            }
            TransportEvent::Ready => {
                self.session.gate().open();
                info!(transport = self.session.client().name(), "client is ready");
                true
            }
            TransportEvent::Disconnected(reason) => self.reconnect(reason, events, shutdown).await,
        }
    }

    async fn reconnect(
        &self,
        reason: String,
        events: &TransportEvents,
        shutdown: &mut watch::Receiver<bool>,
    ) -> bool {
        self.session.gate().close();
        warn!(
            transport = self.session.client().name(),
            reason = %reason,
            backoff_ms = self.reconnect_backoff.as_millis() as u64,
            "client disconnected, reconnecting after backoff"
        );
        if !sleep_unless_shutdown(self.reconnect_backoff, shutdown).await {
            return false;
        }
        self.connect(events, shutdown).await
    }

    /// Initializes the client, retrying with the fixed backoff until it
    /// succeeds. Returns `false` if shutdown was requested meanwhile.
    async fn connect(&self, events: &TransportEvents, shutdown: &mut watch::Receiver<bool>) -> bool {
        loop {
            info!(transport = self.session.client().name(), "initializing transport client");
            match self.session.client().initialize(events.clone()).await {
                Ok(()) => return true,
                Err(err) => {
                    error!(
                        transport = self.session.client().name(),
                        error = %err,
                        "transport initialization failed"
                    );
                    if !sleep_unless_shutdown(self.reconnect_backoff, shutdown).await {
                        return false;
                    }
                }
            }
        }
    }
}

async fn sleep_unless_shutdown(delay: Duration, stop: &mut watch::Receiver<bool>) -> bool {
    tokio::select! {
        biased;
        _ = stop_signal::requested(stop) => false,
        _ = tokio::time::sleep(delay) => true,
    }
}
