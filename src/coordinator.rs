//! Concurrency-bounded download coordination
//!
//! Fans the fetcher out over a batch of candidate messages: fixed-size
//! chunks bound the outstanding task count, a counting semaphore bounds how
//! many downloads are actually in flight, and every success is persisted
//! before the next chunk starts. The semaphore is the only place in the
//! pipeline where concurrent writers exist, and each worker only ever
//! touches its own message's attachment path.

use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

use crate::client::MessageSource;
use crate::db::Store;
use crate::error::Result;
use crate::fetcher::AttachmentFetcher;
use crate::types::{ProgressReporter, RawMessage, SourceHandle};

/// Drives many fetch calls under a fixed concurrency ceiling
pub struct DownloadCoordinator<C> {
    fetcher: Arc<AttachmentFetcher<C>>,
    store: Arc<Store>,
    max_concurrent: usize,
    chunk_size: usize,
    progress: Arc<dyn ProgressReporter>,
}

impl<C: MessageSource> DownloadCoordinator<C> {
    /// Create a coordinator over the given fetcher and store
    pub fn new(
        fetcher: Arc<AttachmentFetcher<C>>,
        store: Arc<Store>,
        max_concurrent: usize,
        chunk_size: usize,
        progress: Arc<dyn ProgressReporter>,
    ) -> Self {
        Self {
            fetcher,
            store,
            max_concurrent: max_concurrent.max(1),
            chunk_size: chunk_size.max(1),
            progress,
        }
    }

    /// Download attachments for every candidate message
    ///
    /// Candidates without a downloadable attachment are filtered out first.
    /// A single item's failure never aborts the batch; only a storage error
    /// while persisting a path does. Returns the success count.
    pub async fn download_batch(
        &self,
        source_id: &str,
        handle: &SourceHandle,
        messages: &[RawMessage],
    ) -> Result<u64> {
        let candidates: Vec<&RawMessage> = messages
            .iter()
            .filter(|m| m.downloadable_attachment().is_some())
            .collect();

        if candidates.is_empty() {
            return Ok(0);
        }

        let total = candidates.len() as u64;
        let mut completed: u64 = 0;
        let mut succeeded: u64 = 0;
        let semaphore = Arc::new(Semaphore::new(self.max_concurrent));

        debug!(
            source = source_id,
            total,
            ceiling = self.max_concurrent,
            "starting attachment batch"
        );

        for chunk in candidates.chunks(self.chunk_size) {
            let mut tasks = Vec::with_capacity(chunk.len());
            for message in chunk {
                let fetcher = Arc::clone(&self.fetcher);
                let semaphore = Arc::clone(&semaphore);
                let source = source_id.to_string();
                let handle = handle.clone();
                let message = (*message).clone();
                let message_id = message.id;
                tasks.push((
                    message_id,
                    tokio::spawn(async move {
                        // Semaphore closed is unreachable here; treat as a failed fetch
                        let _permit = semaphore.acquire_owned().await.ok()?;
                        fetcher.fetch(&source, &handle, &message).await
                    }),
                ));
            }

            for (message_id, task) in tasks {
                match task.await {
                    Ok(Some(path)) => {
                        self.store
                            .update_attachment_path(
                                source_id,
                                message_id,
                                &path.to_string_lossy(),
                            )
                            .await?;
                        succeeded += 1;
                    }
                    Ok(None) => {}
                    Err(e) => {
                        warn!(message_id, error = %e, "download task panicked or was aborted");
                    }
                }
                completed += 1;
                self.progress.downloads(completed, total, succeeded);
            }
        }

        debug!(source = source_id, total, succeeded, "attachment batch finished");
        Ok(succeeded)
    }
}
