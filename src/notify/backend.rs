use async_trait::async_trait;

/// Pluggable delivery channel for listing notifications.
#[async_trait]
pub trait NotifyBackend: Send + Sync {
    /// Deliver a plain-text message.
    async fn send(&self, text: &str) -> anyhow::Result<()>;

    fn name(&self) -> &'static str;
}
