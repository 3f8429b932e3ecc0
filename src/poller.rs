//! Continuous polling over every registered source
//!
//! Runs scrape passes in registration order, forever, with a fixed interval
//! between loop starts. One source failing never stops the loop; the error
//! is logged and the remaining sources still get their pass. The interval is
//! measured from loop start, so slow passes shorten the idle wait instead of
//! drifting the cadence.

use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Instant, sleep};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::client::MessageSource;
use crate::config::Config;
use crate::error::Result;
use crate::scraper::SourceScraper;
use crate::state::StateStore;

/// Repeatedly scrapes all registered sources until cancelled
pub struct ContinuousPoller<C> {
    scraper: Arc<SourceScraper<C>>,
    state: Arc<StateStore>,
    poll_interval: Duration,
    cancel: CancellationToken,
}

impl<C: MessageSource> ContinuousPoller<C> {
    /// Create a poller over the given scraper
    pub fn new(
        scraper: Arc<SourceScraper<C>>,
        state: Arc<StateStore>,
        config: &Config,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            scraper,
            state,
            poll_interval: Duration::from_secs(config.poll_interval_secs),
            cancel,
        }
    }

    /// Poll until the cancellation token fires
    ///
    /// Returns cleanly on cancellation; per-source errors are logged and
    /// skipped so one broken source cannot starve the others.
    pub async fn run(&self) -> Result<()> {
        info!(
            interval_secs = self.poll_interval.as_secs(),
            "starting continuous polling"
        );

        loop {
            let loop_started = Instant::now();

            for source in self.state.sources().await {
                if self.cancel.is_cancelled() {
                    break;
                }
                match self.scraper.run_pass(&source.id).await {
                    Ok(summary) if summary.processed > 0 => {
                        info!(
                            source = %source.id,
                            new_messages = summary.processed,
                            downloads = summary.downloads_succeeded,
                            "source updated"
                        );
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!(source = %source.id, error = %e, "pass failed, continuing with next source");
                    }
                }
            }

            if self.cancel.is_cancelled() {
                info!("polling stopped");
                return Ok(());
            }

            // Keep the cadence anchored to loop starts
            let idle = self.poll_interval.saturating_sub(loop_started.elapsed());
            tokio::select! {
                () = self.cancel.cancelled() => {
                    info!("polling stopped");
                    return Ok(());
                }
                () = sleep(idle) => {}
            }
        }
    }
}
