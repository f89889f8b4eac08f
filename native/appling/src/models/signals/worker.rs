use serde::{Deserialize, Serialize};

use crate::models::InstallConfig;

/// Messages exchanged between the main side and the worker.
///
/// Encoded as JSON objects tagged by `type`, e.g. `{"type":"install"}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Message {
    /// worker → main: the worker is listening and waits for its config.
    Ready,
    /// main → worker
    Config { data: InstallConfig },
    /// main → worker: start an install attempt.
    Install,
    /// worker → main
    Download { data: DownloadProgress },
    /// worker → main: the attempt finished successfully.
    Complete,
    /// worker → main: the attempt failed.
    Error { error: String },
}

/// Aggregated progress of an install attempt, as shown to the user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadProgress {
    pub speed: String,
    pub peers: u32,
    /// Overall percentage, 0 to 100.
    pub progress: u8,
    /// Index of the stage that reported last.
    pub stage: usize,
    /// Human-readable bytes transferred across all stages.
    pub bytes: String,
}
