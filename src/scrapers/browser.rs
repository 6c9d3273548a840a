use std::ffi::OsStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use headless_chrome::{Browser, LaunchOptions, Tab};
use tracing::{debug, info, warn};

use crate::error::RenderError;
use crate::scrapers::carousell::LISTING_CONTAINER;
use crate::scrapers::traits::{BrowserLauncher, PageRenderer};

/// Launches a headless Chrome per polling iteration
pub struct ChromeLauncher {
    render_timeout: Duration,
}

impl ChromeLauncher {
    pub fn new(render_timeout: Duration) -> Self {
        Self { render_timeout }
    }
}

#[async_trait]
impl BrowserLauncher for ChromeLauncher {
    async fn launch(&self) -> Result<Box<dyn PageRenderer>> {
        let browser = tokio::task::spawn_blocking(launch_browser)
            .await
            .context("Chrome launch task aborted")??;

        Ok(Box::new(ChromeRenderer {
            browser: Arc::new(browser),
            render_timeout: self.render_timeout,
        }))
    }

    fn name(&self) -> &'static str {
        "headless-chrome"
    }
}

fn launch_browser() -> Result<Browser> {
    info!("Launching headless Chrome...");

    let options = LaunchOptions::default_builder()
        .headless(true)
        .sandbox(false)
        .idle_browser_timeout(Duration::from_secs(300))
        .args(vec![OsStr::new("--disable-dev-shm-usage")])
        .build()
        .context("Failed to build launch options")?;

    Browser::new(options).context("Failed to launch Chrome browser")
}

/// Browser-backed renderer for search result pages
pub struct ChromeRenderer {
    browser: Arc<Browser>,
    render_timeout: Duration,
}

#[async_trait]
impl PageRenderer for ChromeRenderer {
    async fn render(&self, url: &str) -> Result<String, RenderError> {
        let browser = Arc::clone(&self.browser);
        let url = url.to_string();
        let timeout = self.render_timeout;

        tokio::task::spawn_blocking(move || render_page(&browser, &url, timeout))
            .await
            .map_err(|e| RenderError::Aborted(e.to_string()))?
    }
}

fn render_page(browser: &Browser, url: &str, timeout: Duration) -> Result<String, RenderError> {
    info!(url, "Opening search page...");
    let tab = browser.new_tab().map_err(|e| navigation_error(url, e))?;
    closing_tab(url, capture_page(&tab, url, timeout), || tab.close(true))
}

/// Close the tab whatever the capture produced, then pass the result on
fn closing_tab<T>(
    url: &str,
    result: Result<T, RenderError>,
    close: impl FnOnce() -> Result<bool>,
) -> Result<T, RenderError> {
    if let Err(e) = close() {
        debug!(url, error = %e, "Failed to close tab");
    }
    result
}

fn navigation_error(url: &str, e: anyhow::Error) -> RenderError {
    RenderError::Navigation {
        url: url.to_string(),
        reason: format!("{e:#}"),
    }
}

/// Everything between opening and closing the tab
fn capture_page(tab: &Tab, url: &str, timeout: Duration) -> Result<String, RenderError> {
    let navigation = |e: anyhow::Error| navigation_error(url, e);

    tab.navigate_to(url).map_err(navigation)?;
    tab.wait_until_navigated().map_err(navigation)?;

    info!(url, timeout_secs = timeout.as_secs(), "Waiting for listing container...");
    if let Err(e) = tab
        .wait_for_element_with_custom_timeout(LISTING_CONTAINER, timeout)
        .map(|_| ())
    {
        warn!(url, error = %e, "Listing container never appeared");
        if let Ok(source) = tab.get_content() {
            debug!(url, html = %source, "Page source at timeout");
        }
        return Err(RenderError::ContainerTimeout {
            url: url.to_string(),
            seconds: timeout.as_secs(),
        });
    }

    let html = tab
        .evaluate("document.documentElement.outerHTML", false)
        .map_err(navigation)?
        .value
        .and_then(|value| value.as_str().map(str::to_string))
        .unwrap_or_default();

    if html.is_empty() {
        warn!(url, "HTML is empty");
        return Err(RenderError::EmptyPage {
            url: url.to_string(),
        });
    }

    debug!(url, bytes = html.len(), "Captured rendered page");
    Ok(html)
}
