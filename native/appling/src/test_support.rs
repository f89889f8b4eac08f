//! Recording fakes of the external dependencies.

use std::{
    path::{Path, PathBuf},
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    time::Duration,
};

use anyhow::{Result, anyhow, bail};
use async_trait::async_trait;
use tempfile::TempDir;
use tokio::sync::{Notify, mpsc};

use crate::{
    models::{
        BootstrapStatus, CoreState, DriveState, SwarmStatus, TransferStatus, signals::view::ViewUpdate,
    },
    orchestrator::Surface,
    platform::{
        BootstrapOptions, Bootstrapper, InstallLock, LockHandle, Platform, Runtime, StatusProbe,
    },
};

/// Ordered record of calls made on the fakes sharing it.
#[derive(Debug, Clone, Default)]
pub(crate) struct CallLog(Arc<Mutex<Vec<String>>>);

impl CallLog {
    pub fn record(&self, call: impl Into<String>) {
        self.0.lock().unwrap().push(call.into());
    }

    pub fn calls(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }
}

pub(crate) fn swarm_status(progress: f64, peers: usize, bytes: u64) -> TransferStatus {
    TransferStatus::Swarm(SwarmStatus {
        drive: DriveState { core: CoreState { peers: vec![serde_json::Value::Null; peers] } },
        download_speed: 1_000.0,
        download_progress: progress,
        downloaded_bytes: bytes,
    })
}

struct FakeLock {
    dir: PathBuf,
    calls: CallLog,
}

impl LockHandle for FakeLock {
    fn dir(&self) -> &Path {
        &self.dir
    }

    fn release(&mut self) -> Result<()> {
        self.calls.record("unlock");
        Ok(())
    }
}

pub(crate) struct FakePlatform {
    calls: CallLog,
    ready: bool,
    statuses: Vec<Option<TransferStatus>>,
    failure: Option<String>,
}

impl FakePlatform {
    pub fn ready() -> Self {
        Self { calls: CallLog::default(), ready: true, statuses: vec![], failure: None }
    }

    pub fn not_ready() -> Self {
        Self { ready: false, ..Self::ready() }
    }

    /// An unready platform whose download reports `statuses` in order.
    pub fn downloading(statuses: Vec<Option<TransferStatus>>) -> Self {
        Self { statuses, ..Self::not_ready() }
    }

    pub fn failing_download(message: &str) -> Self {
        Self { failure: Some(message.to_string()), ..Self::not_ready() }
    }
}

#[async_trait]
impl Platform for FakePlatform {
    fn ready(&self, _link: &str) -> bool {
        self.calls.record("ready");
        self.ready
    }

    fn launch(&self, id: &str) -> Result<()> {
        self.calls.record(format!("launch:{id}"));
        Ok(())
    }

    async fn preflight(
        &self,
        link: &str,
        updates: mpsc::UnboundedSender<Option<TransferStatus>>,
    ) -> Result<()> {
        self.calls.record(format!("preflight:{link}"));
        for status in &self.statuses {
            updates.send(status.clone())?;
            tokio::task::yield_now().await;
        }
        match &self.failure {
            Some(message) => Err(anyhow!(message.clone())),
            None => Ok(()),
        }
    }
}

/// A runtime whose platform is resolvable once `installed` is set.
#[derive(Clone)]
pub(crate) struct FakeRuntime {
    calls: CallLog,
    platform: Option<Arc<FakePlatform>>,
    installed: Arc<AtomicBool>,
    fail_lock: bool,
    dir: Arc<TempDir>,
}

impl FakeRuntime {
    fn new(platform: Option<Arc<FakePlatform>>, installed: bool) -> Self {
        let calls = platform.as_ref().map(|p| p.calls.clone()).unwrap_or_default();
        Self {
            calls,
            platform,
            installed: Arc::new(AtomicBool::new(installed)),
            fail_lock: false,
            dir: Arc::new(tempfile::tempdir().unwrap()),
        }
    }

    pub fn with_platform(platform: Arc<FakePlatform>) -> Self {
        Self::new(Some(platform), true)
    }

    /// The platform resolves only after a bootstrap.
    pub fn bootstrappable(platform: Arc<FakePlatform>) -> Self {
        Self::new(Some(platform), false)
    }

    pub fn without_platform() -> Self {
        Self::new(None, false)
    }

    pub fn failing_lock(mut self) -> Self {
        self.fail_lock = true;
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.calls()
    }

    pub fn dir(&self) -> &Path {
        self.dir.path()
    }

    /// A bootstrapper that installs this runtime's platform after reporting
    /// `statuses`.
    pub fn bootstrapper(&self, statuses: Vec<BootstrapStatus>) -> FakeBootstrapper {
        FakeBootstrapper {
            calls: self.calls.clone(),
            installed: self.installed.clone(),
            statuses,
            step: Duration::from_millis(20),
            linger: Duration::ZERO,
            gate: None,
            failure: None,
            failures_left: Arc::new(AtomicUsize::new(0)),
            transfer_failure: None,
            runs: Arc::new(AtomicUsize::new(0)),
            lock_requested: Arc::new(Mutex::new(None)),
        }
    }
}

#[async_trait]
impl Runtime for FakeRuntime {
    async fn lock(&self) -> Result<InstallLock> {
        self.calls.record("lock");
        if self.fail_lock {
            bail!("lock is busy");
        }
        Ok(InstallLock::new(Box::new(FakeLock {
            dir: self.dir().to_path_buf(),
            calls: self.calls.clone(),
        })))
    }

    async fn resolve(&self, _dir: Option<&Path>) -> Result<Arc<dyn Platform>> {
        self.calls.record("resolve");
        match &self.platform {
            Some(platform) if self.installed.load(Ordering::Acquire) => {
                Ok(platform.clone() as Arc<dyn Platform>)
            }
            _ => bail!("platform not found"),
        }
    }

    fn open(&self, id: &str) -> Result<()> {
        self.calls.record(format!("open:{id}"));
        Ok(())
    }
}

#[derive(Default)]
struct FakeProbe(Mutex<Option<TransferStatus>>);

impl StatusProbe for FakeProbe {
    fn status(&self) -> Option<TransferStatus> {
        self.0.lock().unwrap().clone()
    }
}

#[derive(Clone)]
pub(crate) struct FakeBootstrapper {
    calls: CallLog,
    installed: Arc<AtomicBool>,
    statuses: Vec<BootstrapStatus>,
    step: Duration,
    linger: Duration,
    gate: Option<Arc<Notify>>,
    failure: Option<String>,
    failures_left: Arc<AtomicUsize>,
    transfer_failure: Option<String>,
    runs: Arc<AtomicUsize>,
    lock_requested: Arc<Mutex<Option<bool>>>,
}

impl FakeBootstrapper {
    /// Bootstrap waits for [`FakeBootstrapper::open_gate`] before doing anything.
    pub fn gated(mut self) -> Self {
        self.gate = Some(Arc::new(Notify::new()));
        self
    }

    pub fn open_gate(&self) {
        if let Some(gate) = &self.gate {
            gate.notify_one();
        }
    }

    pub fn failing_once(mut self, message: &str) -> Self {
        self.failure = Some(message.to_string());
        self.failures_left = Arc::new(AtomicUsize::new(1));
        self
    }

    /// Keeps running for `linger` after the last status was reported.
    pub fn lingering(mut self, linger: Duration) -> Self {
        self.linger = linger;
        self
    }

    /// Fails after reporting every status, with the updater still live.
    pub fn failing_after_transfer(mut self, message: &str) -> Self {
        self.transfer_failure = Some(message.to_string());
        self
    }

    pub fn runs(&self) -> usize {
        self.runs.load(Ordering::Acquire)
    }

    pub fn lock_requested(&self) -> Option<bool> {
        *self.lock_requested.lock().unwrap()
    }
}

#[async_trait]
impl Bootstrapper for FakeBootstrapper {
    async fn bootstrap(&self, platform: &str, _dir: &Path, options: BootstrapOptions) -> Result<()> {
        self.calls.record(format!("bootstrap:{platform}"));
        self.runs.fetch_add(1, Ordering::AcqRel);
        *self.lock_requested.lock().unwrap() = Some(options.lock);
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        if let Some(message) = &self.failure {
            let left = self.failures_left.fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                n.checked_sub(1)
            });
            if left.is_ok() {
                bail!(message.clone());
            }
        }

        let probe = Arc::new(FakeProbe::default());
        options
            .on_updater
            .send(probe.clone())
            .map_err(|_| anyhow!("updater receiver is gone"))?;
        for status in &self.statuses {
            *probe.0.lock().unwrap() = Some(TransferStatus::Bootstrap(status.clone()));
            tokio::time::sleep(self.step).await;
        }
        tokio::time::sleep(self.linger).await;
        if let Some(message) = &self.transfer_failure {
            bail!(message.clone());
        }
        self.installed.store(true, Ordering::Release);
        Ok(())
    }
}

/// Surface that forwards updates to a channel and records lifecycle calls.
pub(crate) struct FakeSurface {
    calls: CallLog,
    updates: mpsc::UnboundedSender<ViewUpdate>,
    fail_show: bool,
}

impl FakeSurface {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ViewUpdate>, CallLog) {
        let (updates, rx) = mpsc::unbounded_channel();
        let calls = CallLog::default();
        (Self { calls: calls.clone(), updates, fail_show: false }, rx, calls)
    }

    pub fn failing_show(mut self) -> Self {
        self.fail_show = true;
        self
    }
}

impl Surface for FakeSurface {
    fn show(&mut self) -> Result<()> {
        self.calls.record("show");
        if self.fail_show {
            bail!("no display");
        }
        Ok(())
    }

    fn post(&mut self, update: ViewUpdate) {
        let _ = self.updates.send(update);
    }

    fn close(&mut self) {
        self.calls.record("close");
    }

    fn destroy(&mut self) {
        self.calls.record("destroy");
    }
}
