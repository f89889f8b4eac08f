use std::{fs, path::Path, time::Duration};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::error;

/// Platform runtime bootstrapped when none is installed yet.
pub const DEFAULT_PLATFORM: &str = "pzcjqmpoo6szkoc4bpkw65ib9ctnrq7b6mneeinbhbheihaq6p6o";

/// Installer options. Every field has a default, so an empty JSON object is valid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstallOptions {
    #[serde(default = "default_platform")]
    pub platform: String,
    /// Scheme used to build the application link from its id.
    #[serde(default = "default_link_scheme")]
    pub link_scheme: String,
    /// Weight of each install stage: platform bootstrap, then application download.
    #[serde(default = "default_stage_weights")]
    pub stage_weights: Vec<f64>,
    /// How often bootstrap progress is sampled.
    #[serde(default = "default_sample_interval_ms")]
    pub sample_interval_ms: u64,
    #[serde(default)]
    pub window: WindowGeometry,
}

fn default_platform() -> String {
    DEFAULT_PLATFORM.to_string()
}

fn default_link_scheme() -> String {
    "pear".to_string()
}

fn default_stage_weights() -> Vec<f64> {
    vec![0.3, 0.7]
}

fn default_sample_interval_ms() -> u64 {
    250
}

impl Default for InstallOptions {
    fn default() -> Self {
        Self {
            platform: default_platform(),
            link_scheme: default_link_scheme(),
            stage_weights: default_stage_weights(),
            sample_interval_ms: default_sample_interval_ms(),
            window: WindowGeometry::default(),
        }
    }
}

impl InstallOptions {
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let options: InstallOptions = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))
            .inspect_err(|e| {
                error!("Failed to parse installer options: {:#}", e);
            })?;
        Ok(options)
    }

    pub fn link_for(&self, id: &str) -> String {
        format!("{}://{}", self.link_scheme, id)
    }

    pub fn sample_interval(&self) -> Duration {
        Duration::from_millis(self.sample_interval_ms.max(1))
    }
}

/// Size and decoration of the presentation surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowGeometry {
    pub width: u32,
    pub height: u32,
    pub frame: bool,
}

impl Default for WindowGeometry {
    fn default() -> Self {
        Self { width: 500, height: 548, frame: false }
    }
}

impl WindowGeometry {
    /// Origin that centres the window on a screen of the given size.
    /// Screens smaller than the window put it at the top-left corner.
    pub fn centered(&self, screen_width: u32, screen_height: u32) -> (u32, u32) {
        (
            screen_width.saturating_sub(self.width) / 2,
            screen_height.saturating_sub(self.height) / 2,
        )
    }
}
