use async_trait::async_trait;

use super::backend::NotifyBackend;

/// Backend used when no channel could be set up.
pub struct NoopBackend;

#[async_trait]
impl NotifyBackend for NoopBackend {
    async fn send(&self, _text: &str) -> anyhow::Result<()> {
        Ok(())
    }

    fn name(&self) -> &'static str {
        "noop"
    }
}
