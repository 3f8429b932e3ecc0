//! Pipeline facade
//!
//! [`ChannelMirror`] wires the store, state, fetcher, coordinator, scraper
//! and poller together behind one handle. Embedders construct it with their
//! [`MessageSource`] implementation and drive everything through it.

use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::client::MessageSource;
use crate::config::Config;
use crate::coordinator::DownloadCoordinator;
use crate::db::{Record, Store};
use crate::error::Result;
use crate::fetcher::AttachmentFetcher;
use crate::poller::ContinuousPoller;
use crate::scraper::SourceScraper;
use crate::state::{SourceEntry, StateStore};
use crate::types::{
    AttachmentStats, MissingAttachment, NullProgress, PassSummary, ProgressReporter,
};

/// Owns the whole mirroring pipeline for one data directory
pub struct ChannelMirror<C> {
    client: Arc<C>,
    config: Arc<Config>,
    store: Arc<Store>,
    state: Arc<StateStore>,
    coordinator: Arc<DownloadCoordinator<C>>,
    scraper: Arc<SourceScraper<C>>,
    poller: Arc<ContinuousPoller<C>>,
    cancel: CancellationToken,
}

impl<C: MessageSource> ChannelMirror<C> {
    /// Build a mirror with no progress reporting
    pub async fn new(config: Config, client: C) -> Result<Self> {
        Self::with_progress(config, client, Arc::new(NullProgress)).await
    }

    /// Build a mirror that reports progress through the given reporter
    pub async fn with_progress(
        config: Config,
        client: C,
        progress: Arc<dyn ProgressReporter>,
    ) -> Result<Self> {
        let config = Arc::new(config);
        let client = Arc::new(client);
        let state = Arc::new(StateStore::load(&config.state_file).await?);
        let store = Arc::new(Store::new(&config.data_dir));
        let cancel = CancellationToken::new();

        let fetcher = Arc::new(AttachmentFetcher::new(
            Arc::clone(&client),
            Arc::clone(&state),
            config.data_dir.clone(),
            config.max_download_attempts,
        ));
        let coordinator = Arc::new(DownloadCoordinator::new(
            fetcher,
            Arc::clone(&store),
            config.max_concurrent_downloads,
            config.download_chunk_size,
            Arc::clone(&progress),
        ));
        let scraper = Arc::new(SourceScraper::new(
            Arc::clone(&client),
            Arc::clone(&store),
            Arc::clone(&state),
            Arc::clone(&coordinator),
            Arc::clone(&config),
            progress,
            cancel.clone(),
        ));
        let poller = Arc::new(ContinuousPoller::new(
            Arc::clone(&scraper),
            Arc::clone(&state),
            &config,
            cancel.clone(),
        ));

        Ok(Self {
            client,
            config,
            store,
            state,
            coordinator,
            scraper,
            poller,
            cancel,
        })
    }

    /// Register a source for polling; idempotent, never resets the cursor
    pub async fn add_source(&self, source_id: &str, name: Option<&str>) -> Result<()> {
        self.state.add_source(source_id, name).await
    }

    /// Remove a source from the polling registry
    ///
    /// Already-mirrored data and media stay on disk; returns whether the
    /// source was registered.
    pub async fn remove_source(&self, source_id: &str) -> Result<bool> {
        self.state.remove_source(source_id).await
    }

    /// All registered sources in registration order
    pub async fn sources(&self) -> Vec<SourceEntry> {
        self.state.sources().await
    }

    /// Run one incremental pass over a single source
    pub async fn run_pass(&self, source_id: &str) -> Result<PassSummary> {
        self.scraper.run_pass(source_id).await
    }

    /// Poll every registered source until the cancellation handle fires
    pub async fn run_forever(&self) -> Result<()> {
        self.poller.run().await
    }

    /// Token that stops `run_forever` and any in-flight pass
    pub fn cancel_handle(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Toggle attachment downloading for all sources
    pub async fn set_attachment_fetching(&self, enabled: bool) -> Result<()> {
        self.state.set_attachment_fetching(enabled).await
    }

    /// Number of mirrored records for a source
    pub async fn message_count(&self, source_id: &str) -> Result<i64> {
        self.store.count_records(source_id).await
    }

    /// One mirrored record by message id
    pub async fn record(&self, source_id: &str, message_id: i64) -> Result<Option<Record>> {
        self.store.record(source_id, message_id).await
    }

    /// Records whose attachment was never downloaded
    pub async fn missing_attachments(&self, source_id: &str) -> Result<Vec<MissingAttachment>> {
        self.store.missing_attachments(source_id).await
    }

    /// Attachment coverage counters for a source
    pub async fn attachment_stats(&self, source_id: &str) -> Result<AttachmentStats> {
        self.store.attachment_stats(source_id).await
    }

    /// Re-attempt downloads for every record with missing media
    ///
    /// Refetches the affected messages from the source in chunks and runs
    /// them through the normal download path. Returns how many attachments
    /// were recovered.
    pub async fn repair_missing_attachments(&self, source_id: &str) -> Result<u64> {
        let missing = self.store.missing_attachments(source_id).await?;
        if missing.is_empty() {
            return Ok(0);
        }

        let handle = self.scraper.resolve(source_id).await?;
        let ids: Vec<i64> = missing.iter().map(|m| m.message_id).collect();
        info!(source = source_id, missing = ids.len(), "repairing missing attachments");

        let mut repaired = 0;
        for chunk in ids.chunks(self.config.download_chunk_size.max(1)) {
            let messages = self.client.fetch_by_ids(&handle, chunk).await?;
            repaired += self
                .coordinator
                .download_batch(source_id, &handle, &messages)
                .await?;
        }

        info!(source = source_id, repaired, "repair finished");
        Ok(repaired)
    }

    /// Flush and close every open database pool
    ///
    /// Later operations reopen pools on demand; this exists for clean
    /// process shutdown.
    pub async fn shutdown(&self) {
        self.store.close_all().await;
    }
}
