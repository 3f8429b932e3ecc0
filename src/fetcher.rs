//! Attachment download with retry and flood-control compliance
//!
//! One fetch call handles one message's attachment end to end: skip rules,
//! dedup against files already on disk, unique name construction, and a
//! bounded retry loop. Expected failures never escalate — a permanently
//! failed attachment is simply missing media, visible later through
//! [`Store::missing_attachments`](crate::Store::missing_attachments).

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::client::{DownloadOutcome, MessageSource};
use crate::state::StateStore;
use crate::types::{AttachmentKind, RawAttachment, RawMessage, SourceHandle};

/// Downloads a single message's attachment to the source's media directory
pub struct AttachmentFetcher<C> {
    client: Arc<C>,
    state: Arc<StateStore>,
    root: PathBuf,
    max_attempts: u32,
}

impl<C: MessageSource> AttachmentFetcher<C> {
    /// Create a fetcher rooted at the mirror data directory
    pub fn new(client: Arc<C>, state: Arc<StateStore>, root: PathBuf, max_attempts: u32) -> Self {
        Self {
            client,
            state,
            root,
            max_attempts: max_attempts.max(1),
        }
    }

    /// Media directory for a source
    pub fn media_dir(&self, source_id: &str) -> PathBuf {
        self.root.join(source_id).join("media")
    }

    /// Download one attachment, returning its local path
    ///
    /// Returns `None` when fetching is disabled, the message carries no
    /// downloadable attachment, or every attempt failed. Never errors for
    /// expected failure modes.
    pub async fn fetch(
        &self,
        source_id: &str,
        handle: &SourceHandle,
        message: &RawMessage,
    ) -> Option<PathBuf> {
        if !self.state.attachment_fetching_enabled().await {
            return None;
        }
        let attachment = message.downloadable_attachment()?;

        let media_dir = self.media_dir(source_id);
        if let Err(e) = tokio::fs::create_dir_all(&media_dir).await {
            warn!(source = source_id, error = %e, "failed to create media directory");
            return None;
        }

        // Dedup by message-id prefix: whatever is already there wins, even a
        // leftover from an interrupted attempt (completeness is not verified
        // on this path).
        if let Some(existing) = Self::existing_download(&media_dir, message.id).await {
            debug!(message_id = message.id, path = %existing.display(), "attachment already on disk");
            return Some(existing);
        }

        let dest = media_dir.join(Self::unique_file_name(message.id, attachment));

        for attempt in 0..self.max_attempts {
            match self.client.download_attachment(handle, message, &dest).await {
                DownloadOutcome::Done(path) => {
                    if tokio::fs::try_exists(&path).await.unwrap_or(false) {
                        return Some(path);
                    }
                    warn!(
                        message_id = message.id,
                        path = %path.display(),
                        "download reported success but file is absent"
                    );
                    self.backoff(attempt).await;
                }
                DownloadOutcome::RateLimited(wait_secs) => {
                    if attempt + 1 < self.max_attempts {
                        warn!(
                            message_id = message.id,
                            wait_secs,
                            attempt = attempt + 1,
                            "rate limited, honoring server-reported wait"
                        );
                        sleep(Duration::from_secs(wait_secs)).await;
                    }
                }
                DownloadOutcome::Failed(reason) => {
                    warn!(
                        message_id = message.id,
                        attempt = attempt + 1,
                        max_attempts = self.max_attempts,
                        reason,
                        "attachment download failed"
                    );
                    self.backoff(attempt).await;
                }
            }
        }

        debug!(message_id = message.id, "attachment permanently failed for this pass");
        None
    }

    /// Exponential backoff between transient-failure attempts: 2^attempt
    /// seconds, skipped after the final attempt. The shift is capped so an
    /// attempt budget above 64 cannot overflow the exponent.
    async fn backoff(&self, attempt: u32) {
        if attempt + 1 < self.max_attempts {
            sleep(Duration::from_secs(1u64 << attempt.min(63))).await;
        }
    }

    /// Any file named `<message_id>-*` counts as already downloaded
    async fn existing_download(media_dir: &Path, message_id: i64) -> Option<PathBuf> {
        let prefix = format!("{message_id}-");
        let mut entries = tokio::fs::read_dir(media_dir).await.ok()?;
        while let Ok(Some(entry)) = entries.next_entry().await {
            if entry.file_name().to_string_lossy().starts_with(&prefix) {
                return Some(entry.path());
            }
        }
        None
    }

    /// `"<message_id>-<base><ext>"`, with base/extension from the source
    /// filename when present and kind-specific defaults otherwise
    fn unique_file_name(message_id: i64, attachment: &RawAttachment) -> String {
        let (original_name, fallback_ext) = match attachment.kind {
            AttachmentKind::Photo => (
                attachment
                    .file_name
                    .clone()
                    .unwrap_or_else(|| "photo.jpg".to_string()),
                "jpg".to_string(),
            ),
            _ => {
                let ext = attachment
                    .file_ext
                    .clone()
                    .unwrap_or_else(|| "bin".to_string());
                (
                    attachment
                        .file_name
                        .clone()
                        .unwrap_or_else(|| format!("document.{ext}")),
                    ext,
                )
            }
        };

        let name = Path::new(&original_name);
        let base = name
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| original_name.clone());
        let extension = name
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy()))
            .unwrap_or_else(|| format!(".{fallback_ext}"));

        format!("{message_id}-{base}{extension}")
    }
}
