use serde::{Deserialize, Serialize};

/// A status report from the transfer layer.
///
/// Two kinds of updaters report progress and they do not agree on a shape.
/// The swarm updater carries its peer swarm under `drive.core`, the bootstrap
/// updater exposes flat counters. Deserialization classifies structurally:
/// anything with a `drive.core` object is a swarm status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TransferStatus {
    Swarm(SwarmStatus),
    Bootstrap(BootstrapStatus),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwarmStatus {
    pub drive: DriveState,
    /// Bytes per second.
    #[serde(default)]
    pub download_speed: f64,
    #[serde(default)]
    pub download_progress: f64,
    #[serde(default)]
    pub downloaded_bytes: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriveState {
    pub core: CoreState,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CoreState {
    #[serde(default)]
    pub peers: Vec<serde_json::Value>,
}

/// Flat status of the bootstrap updater. Zero means "not known yet" for
/// speed, progress and peers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BootstrapStatus {
    #[serde(default)]
    pub download_speed: f64,
    #[serde(default)]
    pub download_progress: f64,
    #[serde(default)]
    pub peers: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub downloaded_bytes: Option<u64>,
}

impl SwarmStatus {
    pub fn peer_count(&self) -> u32 {
        u32::try_from(self.drive.core.peers.len()).unwrap_or(u32::MAX)
    }
}

impl TransferStatus {
    /// Raw progress fraction as reported, without normalization.
    pub fn download_progress(&self) -> f64 {
        match self {
            TransferStatus::Swarm(s) => s.download_progress,
            TransferStatus::Bootstrap(b) => b.download_progress,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.download_progress() >= 1.0
    }
}
