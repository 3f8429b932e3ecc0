//! Configuration types for channel-mirror

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main configuration for [`ChannelMirror`](crate::ChannelMirror)
///
/// All fields have sensible defaults; `Config::default()` works out of the
/// box. Serialized forms may omit any field.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    /// Root directory for per-source databases and media (default: "./mirror")
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Path of the JSON state file holding cursors and the source registry
    /// (default: "./mirror/state.json")
    #[serde(default = "default_state_file")]
    pub state_file: PathBuf,

    /// Records accumulated before a batch flush to the store (default: 100)
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Processed-message interval between crash-recovery cursor checkpoints
    /// (default: 50)
    #[serde(default = "default_checkpoint_interval")]
    pub checkpoint_interval: usize,

    /// Maximum attachment downloads in flight at once (default: 5)
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_downloads: usize,

    /// Messages per download chunk; chunks are awaited fully before the next
    /// one starts, bounding outstanding task count (default: 10)
    #[serde(default = "default_download_chunk_size")]
    pub download_chunk_size: usize,

    /// Attempts per attachment before it is left as missing media (default: 3)
    #[serde(default = "default_max_download_attempts")]
    pub max_download_attempts: u32,

    /// Seconds between polling passes; slow passes shrink the following sleep
    /// rather than compounding delay (default: 60)
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            state_file: default_state_file(),
            batch_size: default_batch_size(),
            checkpoint_interval: default_checkpoint_interval(),
            max_concurrent_downloads: default_max_concurrent(),
            download_chunk_size: default_download_chunk_size(),
            max_download_attempts: default_max_download_attempts(),
            poll_interval_secs: default_poll_interval_secs(),
        }
    }
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./mirror")
}

fn default_state_file() -> PathBuf {
    PathBuf::from("./mirror/state.json")
}

fn default_batch_size() -> usize {
    100
}

fn default_checkpoint_interval() -> usize {
    50
}

fn default_max_concurrent() -> usize {
    5
}

fn default_download_chunk_size() -> usize {
    10
}

fn default_max_download_attempts() -> u32 {
    3
}

fn default_poll_interval_secs() -> u64 {
    60
}
