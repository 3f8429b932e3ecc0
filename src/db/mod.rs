//! Database layer for channel-mirror
//!
//! One SQLite database per mirrored source, each holding an append-only
//! `messages` table keyed by remote message id. The [`Store`] owns an
//! explicit registry of connection pools keyed by source id with a
//! `close_all` lifecycle call; there is no ambient global connection state.
//!
//! ## Submodules
//!
//! Methods on [`Store`] are organized by domain:
//! - [`migrations`] — pool registry, schema creation, additive migrations
//! - [`records`] — batched idempotent inserts and attachment queries

use sqlx::FromRow;
use sqlx::sqlite::SqlitePool;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

use crate::types::AttachmentKind;

mod migrations;
mod records;

/// Normalized record ready for insertion
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewRecord {
    /// Remote-assigned message id, unique within the source
    pub message_id: i64,
    /// Timestamp formatted `%Y-%m-%d %H:%M:%S` (UTC)
    pub date: String,
    /// Sender id; 0 when unknown
    pub sender_id: i64,
    /// Sender display name (users only)
    pub sender_name: Option<String>,
    /// Sender public handle (users only)
    pub sender_handle: Option<String>,
    /// Message body text
    pub body: String,
    /// Attachment classification, when the message carries one
    pub attachment_kind: Option<AttachmentKind>,
    /// Local attachment path; unset at ingestion time, filled in by the
    /// download coordinator after a successful fetch
    pub attachment_path: Option<String>,
    /// Id of the message this one replies to
    pub reply_to_id: Option<i64>,
    /// Author signature on channel posts
    pub author_signature: Option<String>,
    /// View counter
    pub view_count: Option<i64>,
    /// Forward counter
    pub forward_count: Option<i64>,
    /// Compact reaction encoding, `"<symbol> <count>"` pairs space-joined
    pub reactions: Option<String>,
}

/// Committed record read back from the store
#[derive(Clone, Debug, PartialEq, Eq, FromRow)]
pub struct Record {
    /// Remote-assigned message id, unique within the source
    pub message_id: i64,
    /// Timestamp formatted `%Y-%m-%d %H:%M:%S` (UTC)
    pub date: String,
    /// Sender id; 0 when unknown
    pub sender_id: i64,
    /// Sender display name (users only)
    pub sender_name: Option<String>,
    /// Sender public handle (users only)
    pub sender_handle: Option<String>,
    /// Message body text
    pub body: String,
    /// Attachment classification, when the message carries one
    pub attachment_kind: Option<AttachmentKind>,
    /// Local path of the downloaded attachment, when present
    pub attachment_path: Option<String>,
    /// Id of the message this one replies to
    pub reply_to_id: Option<i64>,
    /// Author signature on channel posts
    pub author_signature: Option<String>,
    /// View counter
    pub view_count: Option<i64>,
    /// Forward counter
    pub forward_count: Option<i64>,
    /// Compact reaction encoding
    pub reactions: Option<String>,
}

/// Persistence store: a registry of per-source SQLite pools
pub struct Store {
    root: PathBuf,
    pools: Mutex<HashMap<String, SqlitePool>>,
}

impl Store {
    /// Create a store rooted at `root`; no databases are opened until
    /// [`Store::open_or_create`] is called for a source
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
            pools: Mutex::new(HashMap::new()),
        }
    }

    /// Filesystem directory holding a source's database and media
    pub fn source_dir(&self, source_id: &str) -> PathBuf {
        self.root.join(source_id)
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;
