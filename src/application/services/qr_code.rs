use async_trait::async_trait;

/// Destination for pairing QR payloads that an operator has to scan.
#[async_trait]
pub trait QrCodeSink: Send + Sync {
    async fn publish(&self, data: &str) -> anyhow::Result<()>;
}
