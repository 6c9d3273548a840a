use anyhow::Result;
use async_trait::async_trait;

use crate::error::RenderError;

/// A live rendering session able to load search pages.
/// Dropping it shuts the underlying browser down.
#[async_trait]
pub trait PageRenderer: Send + Sync {
    /// Load `url` and return the page markup once the listing container
    /// is present. Waits at most one bounded timeout.
    async fn render(&self, url: &str) -> Result<String, RenderError>;
}

/// Starts a fresh rendering session for each polling iteration.
/// A launch failure fails the whole iteration.
#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    async fn launch(&self) -> Result<Box<dyn PageRenderer>>;

    fn name(&self) -> &'static str;
}
