use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, info};

/// Latch mirroring the transport's connection state. Starts closed.
#[derive(Clone)]
pub struct ReadinessGate {
    state: Arc<watch::Sender<bool>>,
    poll_interval: Duration,
}

impl ReadinessGate {
    pub fn new(poll_interval: Duration) -> Self {
        let (state, _) = watch::channel(false);
        Self {
            state: Arc::new(state),
            poll_interval,
        }
    }

    pub fn open(&self) {
        self.state.send_replace(true);
    }

    pub fn close(&self) {
        self.state.send_replace(false);
    }

    pub fn is_ready(&self) -> bool {
        *self.state.borrow()
    }

    /// Resolves once the gate is open. There is no deadline: pairing is a
    /// manual step and may take arbitrarily long. The wait re-checks at most
    /// once per poll interval when no change notification arrives.
    pub async fn wait_ready(&self) {
        let mut state = self.state.subscribe();
        if *state.borrow_and_update() {
            return;
        }

        info!("waiting for transport to become ready");
        loop {
            match tokio::time::timeout(self.poll_interval, state.changed()).await {
                Ok(Ok(())) | Err(_) => {
                    if *state.borrow_and_update() {
                        debug!("transport ready, gate open");
                        return;
                    }
                }
                // The sender lives inside `self`, so it cannot be dropped here.
                Ok(Err(_)) => return,
            }
        }
    }

    /// Resolves once the gate is closed.
    pub async fn closed(&self) {
        let mut state = self.state.subscribe();
        let _ = state.wait_for(|open| !*open).await;
    }
}
