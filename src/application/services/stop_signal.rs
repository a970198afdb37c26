use tokio::sync::watch;

/// Resolves once shutdown is signalled or its sender is gone.
pub async fn requested(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stop| *stop).await;
}
