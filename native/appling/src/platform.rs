//! Seams to the native runtime and the transfer layer.
//!
//! The installer never resolves, launches or downloads anything itself; it
//! sequences these operations through the traits below.

use std::{
    error::Error,
    fmt,
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::{Context, Result};
use async_trait::async_trait;
use fs_err::tokio::{self as fs, File, OpenOptions};
use fs4::fs_err3_tokio::AsyncFileExt as _;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info, instrument, warn};

use crate::{error::InstallError, models::TransferStatus};

pub const LOCK_FILE_NAME: &str = ".appling.lock";

/// Native primitives of the platform runtime.
#[async_trait]
pub trait Runtime: Send + Sync {
    /// Takes the exclusive installation lock at the default location.
    async fn lock(&self) -> Result<InstallLock>;

    /// Resolves an installed platform, at `dir` or at the default location.
    async fn resolve(&self, dir: Option<&Path>) -> Result<Arc<dyn Platform>>;

    /// Opens an installed application by id.
    fn open(&self, id: &str) -> Result<()>;
}

/// A resolved platform runtime.
#[async_trait]
pub trait Platform: Send + Sync {
    /// Whether the application behind `link` is installed and runnable.
    fn ready(&self, link: &str) -> bool;

    fn launch(&self, id: &str) -> Result<()>;

    /// Downloads the application behind `link`, reporting every status change
    /// on `updates` until it returns.
    async fn preflight(
        &self,
        link: &str,
        updates: UnboundedSender<Option<TransferStatus>>,
    ) -> Result<()>;
}

/// Live view of a transfer's status, polled by the caller.
pub trait StatusProbe: Send + Sync {
    fn status(&self) -> Option<TransferStatus>;
}

pub struct BootstrapOptions {
    /// Whether the bootstrapper takes the installation lock itself.
    pub lock: bool,
    /// Receives an updater each time the bootstrapper starts a transfer.
    pub on_updater: UnboundedSender<Arc<dyn StatusProbe>>,
}

/// Acquires the base platform runtime.
#[async_trait]
pub trait Bootstrapper: Send + Sync {
    async fn bootstrap(&self, platform: &str, dir: &Path, options: BootstrapOptions) -> Result<()>;
}

/// A lock primitive over an installation directory.
pub trait LockHandle: Send + Sync {
    fn dir(&self) -> &Path;

    fn release(&mut self) -> Result<()>;
}

/// The exclusive installation lock.
///
/// Release is explicit through [`InstallLock::unlock`], which consumes the
/// lock so it can only be handed off once. A lock that is dropped while still
/// held is released on drop.
pub struct InstallLock {
    dir: PathBuf,
    handle: Option<Box<dyn LockHandle>>,
}

impl InstallLock {
    pub fn new(handle: Box<dyn LockHandle>) -> Self {
        Self { dir: handle.dir().to_path_buf(), handle: Some(handle) }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    #[instrument(skip(self), fields(dir = %self.dir.display()), err)]
    pub fn unlock(mut self) -> Result<()> {
        match self.handle.take() {
            Some(mut handle) => {
                handle.release().context("Failed to release installation lock")?;
                debug!("Installation lock released");
                Ok(())
            }
            None => Ok(()),
        }
    }
}

impl fmt::Debug for InstallLock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstallLock")
            .field("dir", &self.dir)
            .field("held", &self.handle.is_some())
            .finish()
    }
}

impl Drop for InstallLock {
    fn drop(&mut self) {
        if let Some(mut handle) = self.handle.take() {
            match handle.release() {
                Ok(()) => debug!(dir = %self.dir.display(), "Installation lock released on drop"),
                Err(e) => warn!(
                    error = e.as_ref() as &dyn Error,
                    dir = %self.dir.display(),
                    "Failed to release installation lock on drop"
                ),
            }
        }
    }
}

/// Advisory file lock on `<dir>/.appling.lock`, exclusive across processes.
#[derive(Debug)]
pub struct DirLock {
    dir: PathBuf,
    file: Option<File>,
}

impl DirLock {
    /// Takes the lock, failing with [`InstallError::LockHeld`] when someone
    /// else holds it.
    #[instrument(err)]
    pub async fn acquire(dir: &Path) -> Result<Self> {
        fs::create_dir_all(dir).await.context(InstallError::LockAcquisition)?;
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(true)
            .open(dir.join(LOCK_FILE_NAME))
            .await
            .context(InstallError::LockAcquisition)?;
        if !file.try_lock_exclusive().context(InstallError::LockAcquisition)? {
            return Err(InstallError::LockHeld(dir.to_path_buf()).into());
        }
        info!(dir = %dir.display(), "Installation lock acquired");
        Ok(Self { dir: dir.to_path_buf(), file: Some(file) })
    }

    pub fn into_install_lock(self) -> InstallLock {
        InstallLock::new(Box::new(self))
    }
}

impl LockHandle for DirLock {
    fn dir(&self) -> &Path {
        &self.dir
    }

    fn release(&mut self) -> Result<()> {
        if let Some(file) = self.file.take() {
            unlock_file(&self.dir, &file);
            // Closing the descriptor drops the lock even if unlock failed.
            drop(file);
            debug!(dir = %self.dir.display(), "Lock file closed");
        }
        Ok(())
    }
}

impl Drop for DirLock {
    fn drop(&mut self) {
        if let Some(file) = self.file.take() {
            unlock_file(&self.dir, &file);
        }
    }
}

fn unlock_file(dir: &Path, file: &File) {
    if let Err(e) = file.unlock() {
        debug!(error = &e as &dyn Error, dir = %dir.display(), "Failed to unlock lock file");
    }
}
