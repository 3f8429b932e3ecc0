//! Core types for channel-mirror

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Classification of a message's binary payload
///
/// This is a closed set: anything the adapter cannot classify should be
/// mapped to [`AttachmentKind::Document`]. `Webpage` is a link preview and is
/// never downloaded.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttachmentKind {
    /// Inline photo
    Photo,
    /// Generic document/file payload
    Document,
    /// Link preview attached to the message text
    Webpage,
}

impl AttachmentKind {
    /// Stable textual form used in the database
    pub fn as_str(&self) -> &'static str {
        match self {
            AttachmentKind::Photo => "photo",
            AttachmentKind::Document => "document",
            AttachmentKind::Webpage => "webpage",
        }
    }

    /// Link previews are metadata, not downloadable media
    pub fn is_link_preview(&self) -> bool {
        matches!(self, AttachmentKind::Webpage)
    }
}

impl std::fmt::Display for AttachmentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for AttachmentKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "photo" => Ok(AttachmentKind::Photo),
            "document" => Ok(AttachmentKind::Document),
            "webpage" => Ok(AttachmentKind::Webpage),
            other => Err(format!("unknown attachment kind: {other}")),
        }
    }
}

// Implement sqlx Type, Encode, and Decode so the kind round-trips as TEXT
impl sqlx::Type<sqlx::Sqlite> for AttachmentKind {
    fn type_info() -> sqlx::sqlite::SqliteTypeInfo {
        <&str as sqlx::Type<sqlx::Sqlite>>::type_info()
    }

    fn compatible(ty: &sqlx::sqlite::SqliteTypeInfo) -> bool {
        <&str as sqlx::Type<sqlx::Sqlite>>::compatible(ty)
    }
}

impl<'q> sqlx::Encode<'q, sqlx::Sqlite> for AttachmentKind {
    fn encode_by_ref(
        &self,
        buf: &mut Vec<sqlx::sqlite::SqliteArgumentValue<'q>>,
    ) -> std::result::Result<sqlx::encode::IsNull, Box<dyn std::error::Error + Send + Sync>> {
        sqlx::Encode::<sqlx::Sqlite>::encode_by_ref(&self.as_str(), buf)
    }
}

impl<'r> sqlx::Decode<'r, sqlx::Sqlite> for AttachmentKind {
    fn decode(
        value: sqlx::sqlite::SqliteValueRef<'r>,
    ) -> std::result::Result<Self, sqlx::error::BoxDynError> {
        let text = <&str as sqlx::Decode<sqlx::Sqlite>>::decode(value)?;
        text.parse().map_err(Into::into)
    }
}

/// Concrete handle to a resolved source, produced by
/// [`MessageSource::resolve_name`](crate::client::MessageSource::resolve_name)
/// or [`MessageSource::resolve_peer`](crate::client::MessageSource::resolve_peer)
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SourceHandle {
    /// Platform-assigned numeric peer id
    pub peer_id: i64,
    /// Display name of the source, when the platform provides one
    pub name: Option<String>,
}

/// Sender information on a raw message
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RawSender {
    /// Platform-assigned sender id
    pub id: i64,
    /// Display name (users only)
    pub display_name: Option<String>,
    /// Public handle (users only)
    pub handle: Option<String>,
    /// Whether the sender is a user-like entity; channels and other
    /// non-user senders keep only their id
    pub is_user: bool,
}

/// One reaction tally on a raw message
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RawReaction {
    /// Reaction symbol as the platform reports it
    pub symbol: String,
    /// Number of times it was applied
    pub count: i64,
}

/// Attachment metadata on a raw message
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RawAttachment {
    /// Payload classification
    pub kind: AttachmentKind,
    /// Source-provided filename, when present
    pub file_name: Option<String>,
    /// Source-provided extension without the leading dot, when present
    pub file_ext: Option<String>,
}

/// Narrow view of one remote message
///
/// Adapter layers map the real client library's message type onto this
/// struct, isolating the pipeline from the client's type surface.
#[derive(Clone, Debug)]
pub struct RawMessage {
    /// Remote-assigned message id, unique and ascending within a source
    pub id: i64,
    /// Message timestamp
    pub date: DateTime<Utc>,
    /// Sender, when known
    pub sender: Option<RawSender>,
    /// Message body text (empty for media-only messages)
    pub text: String,
    /// Attached binary payload, when present
    pub attachment: Option<RawAttachment>,
    /// Id of the message this one replies to
    pub reply_to_id: Option<i64>,
    /// Author signature on channel posts
    pub author_signature: Option<String>,
    /// View counter, when the platform exposes it
    pub view_count: Option<i64>,
    /// Forward counter, when the platform exposes it
    pub forward_count: Option<i64>,
    /// Reaction tallies in platform order
    pub reactions: Vec<RawReaction>,
}

impl RawMessage {
    /// The attachment, if it is something the fetcher would download
    /// (present and not a link preview)
    pub fn downloadable_attachment(&self) -> Option<&RawAttachment> {
        self.attachment
            .as_ref()
            .filter(|a| !a.kind.is_link_preview())
    }
}

/// Outcome of one incremental pass over a source
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PassSummary {
    /// Total records processed in this pass
    pub processed: u64,
    /// Number of batch flushes to the store (including the final partial one)
    pub flushed_batches: u32,
    /// Attachment-bearing messages handed to the download coordinator
    pub downloads_attempted: u64,
    /// Attachments downloaded and persisted successfully
    pub downloads_succeeded: u64,
}

/// Attachment bookkeeping for one source
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AttachmentStats {
    /// Records carrying a downloadable attachment kind
    pub with_attachment: i64,
    /// Of those, records with a local file path recorded
    pub downloaded: i64,
    /// Remainder still missing their media
    pub missing: i64,
}

/// A record whose attachment has not been downloaded yet
#[derive(Clone, Debug, PartialEq, Eq, sqlx::FromRow)]
pub struct MissingAttachment {
    /// Remote message id
    pub message_id: i64,
    /// Attachment classification recorded at ingestion time
    pub attachment_kind: AttachmentKind,
}

/// Sink for human-facing progress display
///
/// Implementations must be cheap and non-blocking; they are called from the
/// hot ingestion loop. No contract on rendering.
pub trait ProgressReporter: Send + Sync {
    /// Record ingestion progress for the current pass
    fn records(&self, completed: u64, total: u64);

    /// Download progress: `completed` is monotonically non-decreasing,
    /// `succeeded <= completed <= total`
    fn downloads(&self, completed: u64, total: u64, succeeded: u64);
}

/// Progress reporter that discards all updates
#[derive(Clone, Copy, Debug, Default)]
pub struct NullProgress;

impl ProgressReporter for NullProgress {
    fn records(&self, _completed: u64, _total: u64) {}
    fn downloads(&self, _completed: u64, _total: u64, _succeeded: u64) {}
}

/// Progress reporter that emits tracing events at debug level
#[derive(Clone, Copy, Debug, Default)]
pub struct LogProgress;

impl ProgressReporter for LogProgress {
    fn records(&self, completed: u64, total: u64) {
        tracing::debug!(completed, total, "record progress");
    }

    fn downloads(&self, completed: u64, total: u64, succeeded: u64) {
        tracing::debug!(completed, total, succeeded, "download progress");
    }
}
