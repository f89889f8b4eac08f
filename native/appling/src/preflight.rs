use std::error::Error;

use anyhow::{Context, Result};
use tracing::{debug, info, instrument};

use crate::{
    error::InstallError,
    platform::{InstallLock, Runtime},
};

/// What preflight decided.
#[derive(Debug)]
pub enum PreflightOutcome {
    /// The application was already runnable and has been launched. The lock
    /// is released; the caller should exit without showing anything.
    Launched,
    /// The application has to be installed. The caller now owns the lock.
    NeedsInstall(InstallLock),
}

impl PreflightOutcome {
    pub fn needs_install(&self) -> bool {
        matches!(self, PreflightOutcome::NeedsInstall(_))
    }

    pub fn launched(&self) -> bool {
        matches!(self, PreflightOutcome::Launched)
    }

    pub fn into_lock(self) -> Option<InstallLock> {
        match self {
            PreflightOutcome::NeedsInstall(lock) => Some(lock),
            PreflightOutcome::Launched => None,
        }
    }
}

/// Decides between launching an installed application and installing it.
///
/// The lock is taken before anything is inspected. When the application is
/// ready it is released before launching, never after.
#[instrument(skip(runtime), err)]
pub async fn preflight(runtime: &dyn Runtime, id: &str, link: &str) -> Result<PreflightOutcome> {
    let lock = runtime.lock().await.context(InstallError::LockAcquisition)?;

    let platform = match runtime.resolve(None).await {
        Ok(platform) => platform,
        Err(e) => {
            debug!(error = e.as_ref() as &dyn Error, "Platform not found, installation required");
            return Ok(PreflightOutcome::NeedsInstall(lock));
        }
    };

    if !platform.ready(link) {
        info!(link, "Application not ready, installation required");
        return Ok(PreflightOutcome::NeedsInstall(lock));
    }

    lock.unlock()?;
    info!(id, "Application already installed, launching");
    platform.launch(id).context("Failed to launch installed application")?;
    Ok(PreflightOutcome::Launched)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::test_support::{FakePlatform, FakeRuntime};

    const ID: &str = "abc123";
    const LINK: &str = "pear://abc123";

    #[tokio::test(flavor = "multi_thread")]
    async fn ready_application_is_launched_after_unlock() {
        let platform = Arc::new(FakePlatform::ready());
        let runtime = FakeRuntime::with_platform(platform.clone());

        let outcome = preflight(&runtime, ID, LINK).await.expect("preflight");

        assert!(outcome.launched());
        assert!(!outcome.needs_install());
        assert!(outcome.into_lock().is_none());
        assert_eq!(runtime.calls(), vec!["lock", "resolve", "ready", "unlock", "launch:abc123"]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn missing_platform_keeps_the_lock() {
        let runtime = FakeRuntime::without_platform();

        let outcome = preflight(&runtime, ID, LINK).await.expect("preflight");

        assert!(outcome.needs_install());
        let lock = outcome.into_lock().expect("lock handed over");
        assert_eq!(lock.dir(), runtime.dir());
        assert_eq!(runtime.calls(), vec!["lock", "resolve"]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn unready_application_keeps_the_lock() {
        let runtime = FakeRuntime::with_platform(Arc::new(FakePlatform::not_ready()));

        let outcome = preflight(&runtime, ID, LINK).await.expect("preflight");

        assert!(outcome.needs_install());
        assert_eq!(runtime.calls(), vec!["lock", "resolve", "ready"]);
        drop(outcome);
        assert_eq!(runtime.calls().last().map(String::as_str), Some("unlock"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn lock_failure_is_fatal() {
        let runtime = FakeRuntime::without_platform().failing_lock();

        let err = preflight(&runtime, ID, LINK).await.unwrap_err();

        assert!(matches!(InstallError::classify(&err), Some(InstallError::LockAcquisition)));
        assert_eq!(runtime.calls(), vec!["lock"]);
    }
}
