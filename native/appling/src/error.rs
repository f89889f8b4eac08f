use std::path::PathBuf;

use thiserror::Error;

/// Failure classes of an installation.
///
/// Most variants are attached to lower-level errors as `anyhow` context, so the
/// class can be recovered with `downcast_ref::<InstallError>()` while the
/// formatted message keeps the full chain.
#[derive(Debug, Error)]
pub enum InstallError {
    #[error("Configuration not received")]
    ConfigMissing,
    #[error("Configuration missing required '{0}' field")]
    MissingField(&'static str),
    #[error("Failed to bootstrap platform")]
    Bootstrap,
    #[error("Failed to download application")]
    Download,
    #[error("Platform could not be resolved after bootstrap")]
    PlatformUnavailable,
    #[error("Failed to acquire installation lock")]
    LockAcquisition,
    #[error("Installation lock at {} is held by another process", .0.display())]
    LockHeld(PathBuf),
    #[error("Stage weights sum to {0:.3}, expected 1.0")]
    InvalidStageWeights(f64),
}

impl InstallError {
    /// Finds the installation error class behind any number of context layers.
    pub fn classify(err: &anyhow::Error) -> Option<&InstallError> {
        err.downcast_ref::<InstallError>()
    }
}
