//! Weighted multi-stage progress.
//!
//! An install runs in stages of unrelated size (platform bootstrap, then the
//! application itself). Each stage reports a fraction; the overall percentage
//! is the weighted sum, so it keeps growing when a new stage starts.

mod format;

pub use format::{ProgressSample, format_bytes, format_status};
use tracing::{trace, warn};

use crate::{
    error::InstallError,
    ipc::IpcSender,
    models::signals::worker::{DownloadProgress, Message},
};

const WEIGHT_TOLERANCE: f64 = 0.001;

/// Aggregates stage progress and broadcasts a `download` message after
/// every change.
#[derive(Debug)]
pub struct Progress {
    sink: IpcSender,
    weights: Vec<f64>,
    values: Vec<f64>,
    stage_bytes: Vec<u64>,
    current_stage: usize,
    speed: String,
    peers: u32,
    total: u8,
}

impl Progress {
    /// Fails unless the weights are non-negative and sum to 1.0 within 0.001.
    pub fn new(sink: IpcSender, weights: &[f64]) -> Result<Self, InstallError> {
        let sum: f64 = weights.iter().sum();
        let valid_weights = weights.iter().all(|w| w.is_finite() && *w >= 0.0);
        if weights.is_empty() || !valid_weights || (sum - 1.0).abs() > WEIGHT_TOLERANCE {
            return Err(InstallError::InvalidStageWeights(sum));
        }

        Ok(Self {
            sink,
            weights: weights.to_vec(),
            values: vec![0.0; weights.len()],
            stage_bytes: vec![0; weights.len()],
            current_stage: 0,
            speed: String::new(),
            peers: 0,
            total: 0,
        })
    }

    /// Merges the fields present in `sample` into stage `stage`, then
    /// forwards its progress, if any, to [`Progress::stage`].
    pub fn update(&mut self, sample: ProgressSample, stage: usize) {
        if stage >= self.values.len() {
            warn!(stage, stages = self.values.len(), "Ignoring update for unknown stage");
            return;
        }
        if let Some(speed) = sample.speed {
            self.speed = speed;
        }
        if let Some(peers) = sample.peers {
            self.peers = peers;
        }
        if let Some(bytes) = sample.bytes {
            self.stage_bytes[stage] = bytes;
        }
        if let Some(progress) = sample.progress {
            self.stage(stage, progress);
        }
    }

    /// Sets the fraction of stage `stage`, clamped to `[0, 1]`.
    pub fn stage(&mut self, stage: usize, value: f64) {
        if stage >= self.values.len() {
            warn!(stage, stages = self.values.len(), "Ignoring progress for unknown stage");
            return;
        }
        let value = if value.is_nan() { 0.0 } else { value.clamp(0.0, 1.0) };
        self.current_stage = stage;
        self.values[stage] = value;
        self.compute();
        self.broadcast();
    }

    /// Marks every stage done.
    pub fn complete(&mut self) {
        self.values.iter_mut().for_each(|v| *v = 1.0);
        self.compute();
        self.broadcast();
    }

    pub fn total(&self) -> u8 {
        self.total
    }

    pub fn snapshot(&self) -> DownloadProgress {
        DownloadProgress {
            speed: self.speed.clone(),
            peers: self.peers,
            progress: self.total,
            stage: self.current_stage,
            bytes: format_bytes(self.stage_bytes.iter().sum()),
        }
    }

    fn compute(&mut self) {
        let weighted: f64 = self.weights.iter().zip(&self.values).map(|(w, v)| w * v).sum();
        self.total = (weighted * 100.0).round().clamp(0.0, 100.0) as u8;
    }

    fn broadcast(&self) {
        let data = self.snapshot();
        trace!(progress = data.progress, stage = data.stage, "Broadcasting progress");
        self.sink.broadcast(Message::Download { data });
    }
}
