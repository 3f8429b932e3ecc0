//! Cursor and source-registry state
//!
//! A flat JSON file holds everything the pipeline needs to resume: the
//! registered sources in registration order, each source's cursor (highest
//! durably ingested message id), optional display names, and the global
//! attachment-fetching toggle. A missing or corrupt file yields a fresh
//! default state rather than an error.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::warn;

use crate::error::{Error, Result};

/// One registered source and its resumption cursor
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct SourceEntry {
    /// Opaque source identifier as the operator registered it
    pub id: String,
    /// Optional display name
    #[serde(default)]
    pub name: Option<String>,
    /// Highest message id durably ingested for this source
    #[serde(default)]
    pub last_seen_id: i64,
}

#[derive(Debug, Serialize, Deserialize)]
struct StateFile {
    #[serde(default)]
    sources: Vec<SourceEntry>,
    #[serde(default = "default_true")]
    fetch_attachments: bool,
}

impl Default for StateFile {
    fn default() -> Self {
        Self {
            sources: Vec::new(),
            fetch_attachments: true,
        }
    }
}

fn default_true() -> bool {
    true
}

/// Durable pipeline state, persisted to a JSON file on every mutation
pub struct StateStore {
    path: PathBuf,
    state: Mutex<StateFile>,
}

impl StateStore {
    /// Load state from `path`, falling back to defaults if the file is
    /// missing or unreadable
    pub async fn load(path: &Path) -> Result<Self> {
        let state = match tokio::fs::read(path).await {
            Ok(bytes) => match serde_json::from_slice(&bytes) {
                Ok(state) => state,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "state file corrupt, starting fresh");
                    StateFile::default()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => StateFile::default(),
            Err(e) => {
                return Err(Error::State(format!(
                    "failed to read state file {}: {}",
                    path.display(),
                    e
                )));
            }
        };

        Ok(Self {
            path: path.to_path_buf(),
            state: Mutex::new(state),
        })
    }

    /// Current cursor for a source; 0 when the source is unknown
    pub async fn cursor(&self, source_id: &str) -> i64 {
        let state = self.state.lock().await;
        state
            .sources
            .iter()
            .find(|s| s.id == source_id)
            .map(|s| s.last_seen_id)
            .unwrap_or(0)
    }

    /// Advance a source's cursor
    ///
    /// The cursor is clamped monotone: a value at or below the stored one is
    /// ignored. Unknown sources are registered implicitly so a direct
    /// `run_pass` on an unregistered source still records its progress.
    pub async fn set_cursor(&self, source_id: &str, last_seen_id: i64) -> Result<()> {
        let mut state = self.state.lock().await;
        match state.sources.iter_mut().find(|s| s.id == source_id) {
            Some(entry) => {
                if last_seen_id <= entry.last_seen_id {
                    return Ok(());
                }
                entry.last_seen_id = last_seen_id;
            }
            None => state.sources.push(SourceEntry {
                id: source_id.to_string(),
                name: None,
                last_seen_id,
            }),
        }
        self.persist(&state).await
    }

    /// Register a source for continuous polling; idempotent
    ///
    /// Re-registering refreshes the display name but never resets the cursor.
    pub async fn add_source(&self, source_id: &str, name: Option<&str>) -> Result<()> {
        let mut state = self.state.lock().await;
        match state.sources.iter_mut().find(|s| s.id == source_id) {
            Some(entry) => {
                if let Some(name) = name {
                    entry.name = Some(name.to_string());
                }
            }
            None => state.sources.push(SourceEntry {
                id: source_id.to_string(),
                name: name.map(str::to_string),
                last_seen_id: 0,
            }),
        }
        self.persist(&state).await
    }

    /// Remove a source from the registry; returns whether it was present
    pub async fn remove_source(&self, source_id: &str) -> Result<bool> {
        let mut state = self.state.lock().await;
        let before = state.sources.len();
        state.sources.retain(|s| s.id != source_id);
        let removed = state.sources.len() < before;
        if removed {
            self.persist(&state).await?;
        }
        Ok(removed)
    }

    /// All registered sources, in registration order
    pub async fn sources(&self) -> Vec<SourceEntry> {
        self.state.lock().await.sources.clone()
    }

    /// Display name for a source, when one was recorded
    pub async fn source_name(&self, source_id: &str) -> Option<String> {
        let state = self.state.lock().await;
        state
            .sources
            .iter()
            .find(|s| s.id == source_id)
            .and_then(|s| s.name.clone())
    }

    /// Whether attachment fetching is globally enabled
    pub async fn attachment_fetching_enabled(&self) -> bool {
        self.state.lock().await.fetch_attachments
    }

    /// Toggle global attachment fetching
    pub async fn set_attachment_fetching(&self, enabled: bool) -> Result<()> {
        let mut state = self.state.lock().await;
        state.fetch_attachments = enabled;
        self.persist(&state).await
    }

    /// Write-then-rename so a crash mid-write can never leave a truncated
    /// state file behind; the previous state survives until the rename.
    async fn persist(&self, state: &StateFile) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(state)?;
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                Error::State(format!(
                    "failed to create state directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        let staging = self.path.with_extension("json.tmp");
        tokio::fs::write(&staging, bytes).await.map_err(|e| {
            Error::State(format!(
                "failed to write state file {}: {}",
                staging.display(),
                e
            ))
        })?;
        tokio::fs::rename(&staging, &self.path).await.map_err(|e| {
            Error::State(format!(
                "failed to replace state file {}: {}",
                self.path.display(),
                e
            ))
        })
    }
}
