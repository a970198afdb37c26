use std::time::Duration;

use tokio::sync::watch;
use tracing::{error, info};

use crate::{
    application::{
        handlers::message_dispatcher::{MessageDispatcher, PassReport},
        services::stop_signal,
    },
    domain::errors::StoreError,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// Drain the queue once and return.
    Once,
    /// Keep re-polling the queue at this interval until shutdown.
    Poll(Duration),
}

impl RunMode {
    pub fn from_interval(interval: Option<Duration>) -> Self {
        interval.map_or(RunMode::Once, RunMode::Poll)
    }
}

/// Totals across every pass of one run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub passes: usize,
    pub sent: usize,
    pub failed: usize,
    pub store_errors: usize,
    pub purged: u64,
}

impl RunSummary {
    fn record(&mut self, report: &PassReport) {
        self.passes += 1;
        self.sent += report.sent;
        self.failed += report.failed;
        self.store_errors += report.store_errors;
        self.purged += report.purged;
    }
}

pub struct Orchestrator {
    dispatcher: MessageDispatcher,
    mode: RunMode,
    shutdown: watch::Receiver<bool>,
}

impl Orchestrator {
    pub fn new(
        dispatcher: MessageDispatcher,
        mode: RunMode,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        let dispatcher = dispatcher.with_shutdown(shutdown.clone());
        Self {
            dispatcher,
            mode,
            shutdown,
        }
    }

    fn stopping(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// In `Once` mode a pass cut short by a disconnect is followed by another
    /// once the transport is back, so the run only ends when the due set has
    /// been worked through. Failing to read the queue ends a `Once` run; in
    /// `Poll` mode it is logged and retried on the next tick.
    pub async fn run(&self) -> Result<RunSummary, StoreError> {
        let mut summary = RunSummary::default();

        loop {
            match self.dispatcher.run_pass().await {
                Ok(report) => {
                    summary.record(&report);
                    if self.stopping() {
                        break;
                    }
                    if self.mode == RunMode::Once && !report.interrupted {
                        info!("all pending messages processed");
                        break;
                    }
                }
                Err(err) => {
                    if self.mode == RunMode::Once {
                        return Err(err);
                    }
                    error!(error = %err, "failed to load pending messages");
                }
            }

            if let RunMode::Poll(interval) = self.mode {
                let mut shutdown = self.shutdown.clone();
                tokio::select! {
                    biased;
                    _ = stop_signal::requested(&mut shutdown) => break,
                    _ = tokio::time::sleep(interval) => {}
                }
            }
        }

        info!(
            passes = summary.passes,
            sent = summary.sent,
            failed = summary.failed,
            store_errors = summary.store_errors,
            purged = summary.purged,
            "dispatch run finished"
        );
        Ok(summary)
    }
}
