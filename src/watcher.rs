//! One polling iteration: resolve, render, extract, filter, persist, notify.

use std::panic::AssertUnwindSafe;

use anyhow::{anyhow, Context, Result};
use futures::FutureExt;
use tracing::{debug, error, info, warn};

use crate::filter::{evaluate, SeenIds, Verdict};
use crate::models::Listing;
use crate::notify::Dispatcher;
use crate::scrapers::carousell::CardExtractor;
use crate::scrapers::query::resolve;
use crate::scrapers::traits::{BrowserLauncher, PageRenderer};
use crate::scrapers::types::SearchSpec;
use crate::store::{AppendOutcome, ListingStore};

/// Summary of a completed iteration
#[derive(Debug, Default, Clone, PartialEq)]
pub struct IterationReport {
    pub searches_ok: usize,
    pub searches_failed: usize,
    pub new_listings: usize,
    pub unsaved_listings: usize,
}

/// Everything one iteration needs, built once at process start
pub struct Watcher {
    searches: Vec<SearchSpec>,
    base_url: String,
    max_listings: usize,
    extractor: CardExtractor,
    store: ListingStore,
    dispatcher: Dispatcher,
}

impl Watcher {
    pub fn new(
        searches: Vec<SearchSpec>,
        base_url: impl Into<String>,
        max_listings: usize,
        store: ListingStore,
        dispatcher: Dispatcher,
    ) -> Result<Self> {
        Ok(Self {
            searches,
            base_url: base_url.into(),
            max_listings,
            extractor: CardExtractor::new().context("Failed to build card extractor")?,
            store,
            dispatcher,
        })
    }

    /// Run every saved search once.
    ///
    /// Errors from launching the browser or loading the store fail the
    /// iteration. A failure inside one search is logged and the next
    /// search still runs.
    pub async fn run_iteration(&self, launcher: &dyn BrowserLauncher) -> Result<IterationReport> {
        info!(searches = self.searches.len(), "Starting to check listings...");

        let renderer = launcher
            .launch()
            .await
            .with_context(|| format!("Failed to start {}", launcher.name()))?;
        let mut seen = self.store.load_seen_ids()?;

        let mut report = IterationReport::default();
        for (idx, spec) in self.searches.iter().enumerate() {
            let outcome = AssertUnwindSafe(self.check_search(renderer.as_ref(), spec, &mut seen))
                .catch_unwind()
                .await
                .unwrap_or_else(|panic| Err(anyhow!("search processing panicked: {}", panic_message(&*panic))));

            match outcome {
                Ok(saved) => {
                    report.searches_ok += 1;
                    report.new_listings += saved.new;
                    report.unsaved_listings += saved.unsaved;
                }
                Err(e) => {
                    report.searches_failed += 1;
                    error!(
                        search = idx + 1,
                        label = %spec.label(),
                        error = %format!("{e:#}"),
                        "Error processing search, continuing with next"
                    );
                }
            }
        }

        if report.new_listings == 0 {
            info!("No new listings found");
        }
        info!(
            ok = report.searches_ok,
            failed = report.searches_failed,
            new = report.new_listings,
            "Finished checking listings"
        );
        Ok(report)
    }

    async fn check_search(
        &self,
        renderer: &dyn PageRenderer,
        spec: &SearchSpec,
        seen: &mut SeenIds,
    ) -> Result<SearchOutcome> {
        let url = resolve(spec, &self.base_url)?;
        info!(url = %url, "Navigating to search page");

        let html = renderer.render(&url).await?;
        let page = self.extractor.extract_page(&html, self.max_listings);
        if page.cards_found == 0 {
            warn!(url = %url, bytes = html.len(), "No listing cards found; possible page structure change");
            return Ok(SearchOutcome::default());
        }

        let matches: Vec<Listing> = page
            .listings
            .into_iter()
            .filter(|listing| {
                let verdict = evaluate(listing, spec, seen);
                match &verdict {
                    Verdict::Accepted => info!(listing_id = %listing.id, title = %listing.title, "Listing matches criteria"),
                    Verdict::Duplicate => debug!(listing_id = %listing.id, "Listing already recorded, skipping"),
                    other => debug!(listing_id = %listing.id, verdict = ?other, "Listing does not match criteria"),
                }
                verdict == Verdict::Accepted
            })
            .collect();

        let unsaved = match self.store.append(&matches) {
            AppendOutcome::Lost(rows) => rows,
            _ => 0,
        };
        for listing in &matches {
            self.dispatcher.notify(listing).await;
        }

        Ok(SearchOutcome {
            new: matches.len(),
            unsaved,
        })
    }
}

#[derive(Debug, Default)]
struct SearchOutcome {
    new: usize,
    unsaved: usize,
}

pub(crate) fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    panic
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}
