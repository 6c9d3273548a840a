//! Long-running driver around [`Watcher::run_iteration`].
//!
//! States: `Starting -> Running -> Sleeping -> Running -> ... -> Stopping -> Stopped`,
//! with `IterationFailed` looping back to a short `Sleeping` backoff.
//! Stop requests are honoured only between iterations and at each
//! liveness check while sleeping.

use std::panic::AssertUnwindSafe;
use std::time::Duration;

use anyhow::anyhow;
use futures::FutureExt;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::scrapers::traits::BrowserLauncher;
use crate::watcher::{panic_message, Watcher};

/// Whether this process should keep running, checked while sleeping
pub trait LivenessProbe: Send + Sync {
    fn is_live(&self) -> bool;
}

/// Probe for runs without an instance marker
pub struct AlwaysLive;

impl LivenessProbe for AlwaysLive {
    fn is_live(&self) -> bool {
        true
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LoopTiming {
    /// Pause between successful iterations
    pub poll_interval: Duration,
    /// Pause after an iteration failed
    pub retry_backoff: Duration,
    /// Granularity of stop checks while sleeping
    pub liveness_check: Duration,
}

impl Default for LoopTiming {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(3600),
            retry_backoff: Duration::from_secs(60),
            liveness_check: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LoopState {
    Starting,
    Running,
    Sleeping(Duration),
    IterationFailed,
    Stopping,
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum WaitOutcome {
    Elapsed,
    Cancelled,
    MarkerGone,
}

/// Counters kept across the life of the loop
#[derive(Debug, Default, Clone, PartialEq)]
pub struct LoopStats {
    pub iterations: usize,
    pub failed_iterations: usize,
    pub new_listings: usize,
}

pub struct PollLoop<'a> {
    watcher: &'a Watcher,
    launcher: &'a dyn BrowserLauncher,
    probe: &'a dyn LivenessProbe,
    timing: LoopTiming,
}

impl<'a> PollLoop<'a> {
    pub fn new(
        watcher: &'a Watcher,
        launcher: &'a dyn BrowserLauncher,
        probe: &'a dyn LivenessProbe,
        timing: LoopTiming,
    ) -> Self {
        Self {
            watcher,
            launcher,
            probe,
            timing,
        }
    }

    /// Drive the state machine until a stop is requested.
    pub async fn run(&self, token: &CancellationToken) -> LoopStats {
        let mut stats = LoopStats::default();
        let mut state = LoopState::Starting;
        while state != LoopState::Stopped {
            state = self.step(state, token, &mut stats).await;
        }
        stats
    }

    /// Advance one transition.
    pub async fn step(
        &self,
        state: LoopState,
        token: &CancellationToken,
        stats: &mut LoopStats,
    ) -> LoopState {
        match state {
            LoopState::Starting => {
                info!("Starting main loop");
                LoopState::Running
            }
            LoopState::Running => {
                if token.is_cancelled() || !self.probe.is_live() {
                    return LoopState::Stopping;
                }
                stats.iterations += 1;
                info!(iteration = stats.iterations, "Checking listings...");

                let result = AssertUnwindSafe(self.watcher.run_iteration(self.launcher))
                    .catch_unwind()
                    .await
                    .unwrap_or_else(|panic| Err(anyhow!("iteration panicked: {}", panic_message(&*panic))));

                match result {
                    Ok(report) => {
                        stats.new_listings += report.new_listings;
                        info!(
                            iteration = stats.iterations,
                            new = report.new_listings,
                            failed_searches = report.searches_failed,
                            "Successfully checked listings"
                        );
                        if report.unsaved_listings > 0 {
                            error!(
                                count = report.unsaved_listings,
                                "Listings could not be saved this iteration"
                            );
                        }
                        LoopState::Sleeping(self.timing.poll_interval)
                    }
                    Err(e) => {
                        stats.failed_iterations += 1;
                        error!(iteration = stats.iterations, error = %format!("{e:#}"), "Failed to check listings");
                        LoopState::IterationFailed
                    }
                }
            }
            LoopState::IterationFailed => {
                warn!(
                    backoff_secs = self.timing.retry_backoff.as_secs(),
                    "Continuing to next iteration after backoff"
                );
                LoopState::Sleeping(self.timing.retry_backoff)
            }
            LoopState::Sleeping(duration) => {
                info!(secs = duration.as_secs(), "Waiting before next check...");
                match wait_cancellable(duration, self.timing.liveness_check, token, self.probe).await {
                    WaitOutcome::Elapsed => LoopState::Running,
                    WaitOutcome::Cancelled => {
                        info!("Received signal to stop");
                        LoopState::Stopping
                    }
                    WaitOutcome::MarkerGone => {
                        info!("Instance marker removed, exiting");
                        LoopState::Stopping
                    }
                }
            }
            LoopState::Stopping => {
                info!(
                    iterations = stats.iterations,
                    new = stats.new_listings,
                    "Stopped gracefully"
                );
                LoopState::Stopped
            }
            LoopState::Stopped => LoopState::Stopped,
        }
    }
}

/// Sleep for `total`, waking every `grain` to check the probe.
/// Cancellation through `token` interrupts the sleep immediately.
pub async fn wait_cancellable(
    total: Duration,
    grain: Duration,
    token: &CancellationToken,
    probe: &dyn LivenessProbe,
) -> WaitOutcome {
    let deadline = Instant::now() + total;
    let grain = grain.max(Duration::from_millis(1));

    loop {
        let now = Instant::now();
        if now >= deadline {
            return WaitOutcome::Elapsed;
        }
        let step = grain.min(deadline - now);

        tokio::select! {
            _ = token.cancelled() => return WaitOutcome::Cancelled,
            _ = tokio::time::sleep(step) => {}
        }

        if !probe.is_live() {
            return WaitOutcome::MarkerGone;
        }
    }
}
