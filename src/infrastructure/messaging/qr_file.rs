use std::path::PathBuf;

use anyhow::Context;
use async_trait::async_trait;
use tracing::{info, warn};

use crate::application::services::qr_code::QrCodeSink;

/// Logs pairing requests and keeps the latest QR payload in a file so it can
/// be fetched from a headless host.
pub struct FileQrCodeSink {
    path: PathBuf,
}

impl FileQrCodeSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl QrCodeSink for FileQrCodeSink {
    async fn publish(&self, data: &str) -> anyhow::Result<()> {
        warn!("no saved session found, scan the pairing QR code to continue");
        info!(qr = %data, "pairing QR payload");

        tokio::fs::write(&self.path, data)
            .await
            .with_context(|| format!("failed to write QR code to {}", self.path.display()))?;
        info!(path = %self.path.display(), "QR code saved");
        Ok(())
    }
}
