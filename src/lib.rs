//! # channel-mirror
//!
//! Backend library for mirroring remote message channels into local SQLite stores.
//!
//! ## Design Philosophy
//!
//! channel-mirror is designed to be:
//! - **Resumable** - every pass starts from a durable per-source cursor
//! - **Idempotent** - re-ingesting an already-stored message is a no-op
//! - **Rate-limit aware** - server-reported waits are honored exactly
//! - **Library-first** - no CLI or UI, purely a Rust crate for embedding
//!
//! The consumer supplies a [`MessageSource`] implementation that adapts the
//! real platform client onto the narrow [`RawMessage`] surface; everything
//! else (persistence, batching, bounded downloads, polling) lives here.
//!
//! ## Quick Start
//!
//! ```no_run
//! use channel_mirror::{ChannelMirror, Config, MessageSource};
//!
//! # async fn example<C: MessageSource>(client: C) -> Result<(), Box<dyn std::error::Error>> {
//! let mirror = ChannelMirror::new(Config::default(), client).await?;
//! mirror.add_source("-1001234567890", Some("example channel")).await?;
//!
//! // One incremental pass over a single source
//! let summary = mirror.run_pass("-1001234567890").await?;
//! println!("ingested {} records", summary.processed);
//!
//! // Or poll all registered sources until cancelled
//! let cancel = mirror.cancel_handle();
//! tokio::spawn(async move {
//!     tokio::signal::ctrl_c().await.ok();
//!     cancel.cancel();
//! });
//! mirror.run_forever().await?;
//! mirror.shutdown().await;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Remote message source seam
pub mod client;
/// Configuration types
pub mod config;
/// Concurrency-bounded download coordination
pub mod coordinator;
/// Database persistence layer
pub mod db;
/// Error types
pub mod error;
/// Attachment download with retry and flood-control compliance
pub mod fetcher;
/// Pipeline facade
pub mod mirror;
/// Raw message parsing into normalized records
pub mod parser;
/// Continuous polling across registered sources
pub mod poller;
/// Incremental per-source scraping
pub mod scraper;
/// Cursor and source-registry state
pub mod state;
/// Core types and progress reporting
pub mod types;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
pub(crate) mod test_support;

// Re-export commonly used types
pub use client::{DownloadOutcome, MessageSource};
pub use config::Config;
pub use coordinator::DownloadCoordinator;
pub use db::{NewRecord, Record, Store};
pub use error::{Error, ParseError, Result, StorageError};
pub use fetcher::AttachmentFetcher;
pub use mirror::ChannelMirror;
pub use parser::MessageParser;
pub use poller::ContinuousPoller;
pub use scraper::SourceScraper;
pub use state::{SourceEntry, StateStore};
pub use types::{
    AttachmentKind, AttachmentStats, LogProgress, MissingAttachment, NullProgress, PassSummary,
    ProgressReporter, RawAttachment, RawMessage, RawReaction, RawSender, SourceHandle,
};
