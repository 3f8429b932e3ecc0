//! The remote message source seam
//!
//! The pipeline never talks to a platform client library directly. Consumers
//! implement [`MessageSource`], mapping the real client's types onto
//! [`RawMessage`], and the pipeline stays independent of the client's type
//! surface.
//!
//! Rate limiting is modeled as data, not as an error: a flood-control signal
//! from the platform comes back as [`DownloadOutcome::RateLimited`] carrying
//! the server-specified wait, and the fetcher's retry loop is a plain state
//! machine over these variants.

use async_trait::async_trait;
use futures::stream::BoxStream;
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::types::{RawMessage, SourceHandle};

/// Result of one attachment download attempt
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DownloadOutcome {
    /// Download finished; the payload was written to this path
    Done(PathBuf),
    /// The platform demanded a wait of this many seconds before retrying
    RateLimited(u64),
    /// Transient failure; eligible for backoff and retry
    Failed(String),
}

/// Contract the pipeline requires from the remote platform
///
/// All message iteration is ascending by id, finite, and restartable from any
/// offset — these properties are what make cursor-based resumption sound.
#[async_trait]
pub trait MessageSource: Send + Sync + 'static {
    /// Resolve a name-like identifier (public handle, invite slug) to a handle
    async fn resolve_name(&self, name: &str) -> Result<SourceHandle>;

    /// Resolve a numeric peer id to a handle
    ///
    /// Used for identifiers that begin with a sign character, which generic
    /// name lookup would misinterpret.
    async fn resolve_peer(&self, peer_id: i64) -> Result<SourceHandle>;

    /// Total message count for the source, for progress display only
    async fn count_messages(&self, handle: &SourceHandle) -> Result<u64>;

    /// Iterate messages with id strictly greater than `offset_id`, oldest
    /// first
    fn iter_messages<'a>(
        &'a self,
        handle: &'a SourceHandle,
        offset_id: i64,
    ) -> BoxStream<'a, Result<RawMessage>>;

    /// Fetch specific messages by id (repair workflows); unknown ids are
    /// silently absent from the result
    async fn fetch_by_ids(&self, handle: &SourceHandle, ids: &[i64]) -> Result<Vec<RawMessage>>;

    /// Download one message's attachment to `dest`
    ///
    /// Expected failure modes are values, never `Err`: flood control maps to
    /// [`DownloadOutcome::RateLimited`], anything transient to
    /// [`DownloadOutcome::Failed`].
    async fn download_attachment(
        &self,
        handle: &SourceHandle,
        message: &RawMessage,
        dest: &Path,
    ) -> DownloadOutcome;
}
