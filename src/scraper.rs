//! Incremental per-source scraping
//!
//! One pass drives a source from its cursor to the newest available message:
//! resolve, count, stream ascending, batch into the store, download
//! attachments, finalize the cursor. The ordering invariant lives here —
//! the cursor is only ever advanced to an id that is already committed to
//! storage, both at periodic crash-recovery checkpoints and at finalization.

use futures::StreamExt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::client::MessageSource;
use crate::config::Config;
use crate::coordinator::DownloadCoordinator;
use crate::db::{NewRecord, Store};
use crate::error::{Error, Result};
use crate::parser::MessageParser;
use crate::state::StateStore;
use crate::types::{PassSummary, ProgressReporter, RawMessage, SourceHandle};

/// Runs incremental passes over individual sources
pub struct SourceScraper<C> {
    client: Arc<C>,
    store: Arc<Store>,
    state: Arc<StateStore>,
    coordinator: Arc<DownloadCoordinator<C>>,
    config: Arc<Config>,
    progress: Arc<dyn ProgressReporter>,
    cancel: CancellationToken,
}

impl<C: MessageSource> SourceScraper<C> {
    /// Wire a scraper over its collaborators
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        client: Arc<C>,
        store: Arc<Store>,
        state: Arc<StateStore>,
        coordinator: Arc<DownloadCoordinator<C>>,
        config: Arc<Config>,
        progress: Arc<dyn ProgressReporter>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            client,
            store,
            state,
            coordinator,
            config,
            progress,
            cancel,
        }
    }

    /// Run one pass from the source's current cursor
    ///
    /// Per-message parse errors are logged and skipped; storage and
    /// iteration errors abort the pass, leaving the cursor at the last
    /// durable checkpoint so the next pass resumes without loss or
    /// duplication. Cancellation stops message intake but still flushes the
    /// collected batch and completes the collected downloads.
    pub async fn run_pass(&self, source_id: &str) -> Result<PassSummary> {
        let offset = self.state.cursor(source_id).await;
        let handle = self.resolve(source_id).await?;

        let total = self.client.count_messages(&handle).await?;
        if total == 0 {
            info!(source = source_id, "no messages available");
            return Ok(PassSummary::default());
        }

        info!(source = source_id, total, offset, "starting pass");
        self.store.open_or_create(source_id).await?;

        let batch_size = self.config.batch_size.max(1);
        let checkpoint_interval = self.config.checkpoint_interval.max(1) as u64;
        let fetch_enabled = self.state.attachment_fetching_enabled().await;

        let mut batch: Vec<NewRecord> = Vec::with_capacity(batch_size);
        let mut pending: Vec<RawMessage> = Vec::new();
        let mut summary = PassSummary::default();
        let mut last_seen = offset;
        let mut last_flushed = offset;

        let mut stream = self.client.iter_messages(&handle, offset);
        while let Some(item) = stream.next().await {
            if self.cancel.is_cancelled() {
                info!(source = source_id, "cancellation requested, stopping message intake");
                break;
            }

            let raw =
                item.map_err(|e| Error::Source(format!("message iteration failed: {e}")))?;
            let record = match MessageParser::parse(&raw) {
                Ok(record) => record,
                Err(e) => {
                    warn!(
                        source = source_id,
                        message_id = raw.id,
                        error = %e,
                        "skipping unparseable message"
                    );
                    continue;
                }
            };

            if fetch_enabled && raw.downloadable_attachment().is_some() {
                pending.push(raw.clone());
            }
            batch.push(record);
            last_seen = raw.id;
            summary.processed += 1;

            if batch.len() >= batch_size {
                self.store.batch_insert(source_id, &batch).await?;
                debug!(
                    source = source_id,
                    flushed = batch.len(),
                    last_seen,
                    "flushed record batch"
                );
                batch.clear();
                summary.flushed_batches += 1;
                last_flushed = last_seen;
            }

            // Crash-recovery checkpoint. Checkpoints record the last flushed
            // id, never the last seen one: the cursor must not outrun storage.
            if summary.processed % checkpoint_interval == 0 && last_flushed > offset {
                self.state.set_cursor(source_id, last_flushed).await?;
            }

            self.progress.records(summary.processed, total);
        }

        if !batch.is_empty() {
            self.store.batch_insert(source_id, &batch).await?;
            debug!(
                source = source_id,
                flushed = batch.len(),
                last_seen,
                "flushed final record batch"
            );
            summary.flushed_batches += 1;
            last_flushed = last_seen;
        }

        summary.downloads_attempted = pending.len() as u64;
        if fetch_enabled && !pending.is_empty() {
            summary.downloads_succeeded = self
                .coordinator
                .download_batch(source_id, &handle, &pending)
                .await?;
        }

        if last_flushed > offset {
            self.state.set_cursor(source_id, last_flushed).await?;
        }

        info!(
            source = source_id,
            processed = summary.processed,
            downloads = summary.downloads_succeeded,
            cursor = last_flushed,
            "pass complete"
        );
        Ok(summary)
    }

    pub(crate) async fn resolve(&self, source_id: &str) -> Result<SourceHandle> {
        let resolved = match Self::numeric_peer(source_id) {
            Some(peer_id) => self.client.resolve_peer(peer_id).await,
            None => self.client.resolve_name(source_id).await,
        };
        resolved.map_err(|e| Error::Resolution {
            identifier: source_id.to_string(),
            message: e.to_string(),
        })
    }

    /// Identifiers beginning with a sign character are numeric peer ids and
    /// must not go through generic name lookup
    fn numeric_peer(source_id: &str) -> Option<i64> {
        if source_id.starts_with(['-', '+']) {
            source_id.parse().ok()
        } else {
            None
        }
    }
}
