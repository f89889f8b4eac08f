use crate::models::{BootstrapStatus, SwarmStatus, TransferStatus};

/// One progress observation. `None` fields leave the aggregated state as is.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProgressSample {
    pub speed: Option<String>,
    pub progress: Option<f64>,
    pub peers: Option<u32>,
    pub bytes: Option<u64>,
}

impl ProgressSample {
    /// Zeroed values for a stage that has not started yet.
    pub fn baseline() -> Self {
        Self { speed: Some(String::new()), progress: Some(0.0), peers: Some(0), bytes: Some(0) }
    }
}

/// Normalizes a transport status into a [`ProgressSample`].
pub fn format_status(status: Option<&TransferStatus>) -> ProgressSample {
    match status {
        None => ProgressSample::default(),
        Some(TransferStatus::Swarm(s)) => format_swarm(s),
        Some(TransferStatus::Bootstrap(b)) => format_bootstrap(b),
    }
}

fn format_swarm(status: &SwarmStatus) -> ProgressSample {
    ProgressSample {
        speed: Some(format_speed(status.download_speed)),
        progress: Some(status.download_progress),
        peers: Some(status.peer_count()),
        bytes: Some(status.downloaded_bytes),
    }
}

fn format_bootstrap(status: &BootstrapStatus) -> ProgressSample {
    ProgressSample {
        speed: (status.download_speed != 0.0).then(|| format_speed(status.download_speed)),
        progress: (status.download_progress != 0.0).then_some(status.download_progress),
        peers: (status.peers != 0).then_some(status.peers),
        bytes: status.downloaded_bytes,
    }
}

fn format_speed(bytes_per_sec: f64) -> String {
    let bytes = if bytes_per_sec.is_finite() && bytes_per_sec > 0.0 { bytes_per_sec as u64 } else { 0 };
    format!("{}/s", humansize::format_size(bytes, humansize::DECIMAL))
}

/// Human-readable byte count, as shown next to the progress bar.
pub fn format_bytes(bytes: u64) -> String {
    humansize::format_size(bytes, humansize::DECIMAL)
}
