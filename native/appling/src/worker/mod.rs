//! The worker side: holds the install configuration and runs install attempts.

mod attempt;
mod handle;

use std::{
    error::Error,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use derive_more::Debug;
pub use handle::{WorkerHandle, serve_stdio};
use tokio::{io::AsyncRead, task::JoinSet};
use tracing::{Instrument, debug, error, info, info_span, instrument, warn};
use uuid::Uuid;

use self::attempt::Attempt;
use crate::{
    error::InstallError,
    ipc::{IpcReceiver, IpcSender},
    models::{InstallConfig, InstallOptions, signals::worker::Message},
    platform::{Bootstrapper, Runtime},
};

pub(crate) const BOOTSTRAP_STAGE: usize = 0;
pub(crate) const DOWNLOAD_STAGE: usize = 1;

/// Tunables of an install attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkerSettings {
    pub stage_weights: Vec<f64>,
    pub sample_interval: Duration,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self::from(&InstallOptions::default())
    }
}

impl From<&InstallOptions> for WorkerSettings {
    fn from(options: &InstallOptions) -> Self {
        Self {
            stage_weights: options.stage_weights.clone(),
            sample_interval: options.sample_interval(),
        }
    }
}

/// Marks an attempt as running. Dropping the guard clears the mark, whatever
/// way the attempt ends.
#[derive(Debug)]
struct InstallGuard(Arc<AtomicBool>);

impl InstallGuard {
    fn acquire(flag: &Arc<AtomicBool>) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag.clone()))
    }
}

impl Drop for InstallGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// State of one worker for its whole lifetime.
#[derive(Debug)]
pub struct WorkerSession {
    config: Option<InstallConfig>,
    installing: Arc<AtomicBool>,
    sink: IpcSender,
    #[debug(skip)]
    runtime: Arc<dyn Runtime>,
    #[debug(skip)]
    bootstrapper: Arc<dyn Bootstrapper>,
    settings: WorkerSettings,
    #[debug(skip)]
    attempts: JoinSet<()>,
}

impl WorkerSession {
    pub fn new(
        sink: IpcSender,
        runtime: Arc<dyn Runtime>,
        bootstrapper: Arc<dyn Bootstrapper>,
        settings: WorkerSettings,
    ) -> Self {
        Self {
            config: None,
            installing: Arc::new(AtomicBool::new(false)),
            sink,
            runtime,
            bootstrapper,
            settings,
            attempts: JoinSet::new(),
        }
    }

    /// Announces readiness, then serves messages until the main side hangs
    /// up. An attempt still running at that point is aborted.
    #[instrument(skip_all)]
    pub async fn run<R>(mut self, mut receiver: IpcReceiver<R>)
    where
        R: AsyncRead + Unpin + Send,
    {
        self.sink.broadcast(Message::Ready);
        loop {
            tokio::select! {
                message = receiver.recv() => match message {
                    Some(message) => self.handle_message(message),
                    None => {
                        info!("Main side closed the channel, stopping worker");
                        break;
                    }
                },
                Some(joined) = self.attempts.join_next() => {
                    if let Err(e) = joined {
                        error!(error = &e as &dyn Error, "Install attempt task failed");
                    }
                }
            }
        }
    }

    pub fn handle_message(&mut self, message: Message) {
        match message {
            Message::Config { data } => self.setup(data),
            Message::Install => {
                self.install();
            }
            other => debug!(message = ?other, "Ignoring message not meant for the worker"),
        }
    }

    /// Stores the configuration. It is set once; later configs are ignored.
    pub fn setup(&mut self, config: InstallConfig) {
        if let Some(current) = &self.config {
            warn!(current = ?current, ignored = ?config, "Configuration already set, ignoring");
            return;
        }
        info!(
            dir = %config.dir.display(),
            platform = %config.platform,
            link = %config.link,
            "Received install configuration"
        );
        self.config = Some(config);
    }

    pub fn is_installing(&self) -> bool {
        self.installing.load(Ordering::Acquire)
    }

    /// Starts an install attempt in the background.
    ///
    /// Returns `false` without doing anything while another attempt runs, and
    /// after reporting an `error` message when the configuration is
    /// incomplete.
    pub fn install(&mut self) -> bool {
        if self.is_installing() {
            debug!("Installation already in progress, ignoring request");
            return false;
        }

        let config = match self.validated_config() {
            Ok(config) => config,
            Err(e) => {
                error!(error = &e as &dyn Error, "Configuration error");
                self.sink.broadcast(Message::Error { error: e.to_string() });
                return false;
            }
        };

        let Some(guard) = InstallGuard::acquire(&self.installing) else {
            debug!("Installation already in progress, ignoring request");
            return false;
        };

        let attempt = Attempt {
            config,
            sink: self.sink.clone(),
            runtime: self.runtime.clone(),
            bootstrapper: self.bootstrapper.clone(),
            settings: self.settings.clone(),
        };
        let attempt_id = Uuid::new_v4();
        self.attempts.spawn(
            async move {
                let _guard = guard;
                attempt.run().await;
            }
            .instrument(info_span!("install_attempt", %attempt_id)),
        );
        true
    }

    fn validated_config(&self) -> Result<InstallConfig, InstallError> {
        let config = self.config.as_ref().ok_or(InstallError::ConfigMissing)?;
        config.validate()?;
        Ok(config.clone())
    }
}
