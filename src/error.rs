//! Error types for channel-mirror
//!
//! The taxonomy follows the pipeline's failure policy:
//! - Storage and state errors abort the current pass; the next pass resumes
//!   from the last durable cursor.
//! - Resolution errors abort the pass for that source only.
//! - Parse errors are per-message: the scraper logs and skips them.
//! - Transient download failures and rate limits never appear here at all;
//!   they are ordinary values of [`crate::client::DownloadOutcome`] consumed
//!   by the fetcher's retry loop.

use thiserror::Error;

/// Result type alias for channel-mirror operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for channel-mirror
#[derive(Debug, Error)]
pub enum Error {
    /// Persistence layer failed
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Source identifier could not be resolved to a concrete handle
    #[error("failed to resolve source {identifier}: {message}")]
    Resolution {
        /// The opaque source identifier that failed to resolve
        identifier: String,
        /// The underlying resolution failure
        message: String,
    },

    /// A raw message had a malformed or unsupported shape
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),

    /// The remote source failed while counting or iterating messages
    #[error("source error: {0}")]
    Source(String),

    /// Cursor/state store could not be read or written
    #[error("state store error: {0}")]
    State(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Persistence-layer errors
#[derive(Debug, Error)]
pub enum StorageError {
    /// Failed to open or create a per-source database
    #[error("failed to connect to database: {0}")]
    ConnectionFailed(String),

    /// Failed to apply schema migrations
    #[error("failed to run migrations: {0}")]
    MigrationFailed(String),

    /// Query failed
    #[error("query failed: {0}")]
    QueryFailed(String),
}

/// Per-message parse failures
///
/// Absence of optional fields is never a parse error; only a shape the
/// pipeline cannot represent is.
#[derive(Debug, Error)]
pub enum ParseError {
    /// Message carried a nonpositive id, which cannot participate in
    /// cursor-ordered ingestion
    #[error("message id {0} is not positive")]
    InvalidId(i64),
}
