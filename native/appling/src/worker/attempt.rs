use std::{error::Error, sync::Arc, time::Duration};

use anyhow::{Context, Result};
use tokio::{
    sync::mpsc,
    time::{self, Interval, MissedTickBehavior},
};
use tracing::{debug, error, info, instrument};

use super::{BOOTSTRAP_STAGE, DOWNLOAD_STAGE, WorkerSettings};
use crate::{
    error::InstallError,
    ipc::IpcSender,
    models::{InstallConfig, TransferStatus, signals::worker::Message},
    platform::{BootstrapOptions, Bootstrapper, Platform, Runtime, StatusProbe},
    progress::{Progress, ProgressSample, format_status},
};

/// One install attempt, from resolution to the terminal message.
pub(super) struct Attempt {
    pub(super) config: InstallConfig,
    pub(super) sink: IpcSender,
    pub(super) runtime: Arc<dyn Runtime>,
    pub(super) bootstrapper: Arc<dyn Bootstrapper>,
    pub(super) settings: WorkerSettings,
}

/// Polls the active bootstrap updater on a fixed period.
struct Sampler {
    probe: Arc<dyn StatusProbe>,
    interval: Interval,
}

impl Sampler {
    fn new(probe: Arc<dyn StatusProbe>, period: Duration) -> Self {
        let mut interval = time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self { probe, interval }
    }

    fn sample(&self, progress: &mut Progress) -> bool {
        let status = self.probe.status();
        progress.update(format_status(status.as_ref()), BOOTSTRAP_STAGE);
        status.as_ref().is_some_and(TransferStatus::is_finished)
    }
}

/// Resolves on the next tick of the sampler, never when there is none.
async fn next_tick(sampler: &mut Option<Sampler>) {
    match sampler {
        Some(sampler) => {
            sampler.interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

impl Attempt {
    /// Runs the attempt and reports how it ended.
    pub(super) async fn run(self) {
        match self.execute().await {
            Ok(()) => {
                info!(link = %self.config.link, "Installation complete");
                self.sink.broadcast(Message::Complete);
            }
            Err(e) => {
                error!(error = e.as_ref() as &dyn Error, "Installation failed");
                self.sink.broadcast(Message::Error { error: format!("{e:#}") });
            }
        }
    }

    async fn execute(&self) -> Result<()> {
        let mut progress = Progress::new(self.sink.clone(), &self.settings.stage_weights)?;

        let platform = match self.runtime.resolve(Some(&self.config.dir)).await {
            Ok(platform) => {
                info!("Platform already present, skipping bootstrap");
                progress.stage(BOOTSTRAP_STAGE, 1.0);
                platform
            }
            Err(e) => {
                debug!(error = e.as_ref() as &dyn Error, "Platform not resolved, bootstrapping");
                self.bootstrap(&mut progress).await?;
                self.runtime
                    .resolve(Some(&self.config.dir))
                    .await
                    .context(InstallError::PlatformUnavailable)?
            }
        };

        progress.update(ProgressSample::baseline(), DOWNLOAD_STAGE);
        self.download(platform.as_ref(), &mut progress).await?;

        progress.complete();
        Ok(())
    }

    #[instrument(skip_all, fields(platform = %self.config.platform, dir = %self.config.dir.display()))]
    async fn bootstrap(&self, progress: &mut Progress) -> Result<()> {
        let (updater_tx, mut updater_rx) = mpsc::unbounded_channel::<Arc<dyn StatusProbe>>();
        // The installation lock is held by the main side for the whole attempt.
        let options = BootstrapOptions { lock: false, on_updater: updater_tx };
        let bootstrap = self.bootstrapper.bootstrap(&self.config.platform, &self.config.dir, options);
        tokio::pin!(bootstrap);

        let mut sampler: Option<Sampler> = None;
        let result = loop {
            tokio::select! {
                result = &mut bootstrap => break result,
                Some(probe) = updater_rx.recv() => {
                    if sampler.is_some() {
                        debug!("New bootstrap updater replaces the previous one");
                    }
                    sampler = Some(Sampler::new(probe, self.settings.sample_interval));
                }
                _ = next_tick(&mut sampler) => {
                    let finished = sampler.as_ref().is_some_and(|s| s.sample(progress));
                    if finished {
                        debug!("Bootstrap transfer finished, sampling stopped");
                        sampler = None;
                    }
                }
            }
        };
        result.context(InstallError::Bootstrap)?;

        while let Ok(probe) = updater_rx.try_recv() {
            sampler = Some(Sampler::new(probe, self.settings.sample_interval));
        }
        if let Some(sampler) = sampler.take() {
            sampler.sample(progress);
        }
        info!("Platform bootstrapped");
        Ok(())
    }

    #[instrument(skip_all, fields(link = %self.config.link))]
    async fn download(&self, platform: &dyn Platform, progress: &mut Progress) -> Result<()> {
        let (tx, mut rx) = mpsc::unbounded_channel::<Option<TransferStatus>>();
        let download = platform.preflight(&self.config.link, tx);
        tokio::pin!(download);

        let result = loop {
            tokio::select! {
                biased;
                Some(status) = rx.recv() => {
                    progress.update(format_status(status.as_ref()), DOWNLOAD_STAGE);
                }
                result = &mut download => break result,
            }
        };
        while let Ok(status) = rx.try_recv() {
            progress.update(format_status(status.as_ref()), DOWNLOAD_STAGE);
        }

        result.context(InstallError::Download)?;
        info!("Application downloaded");
        Ok(())
    }
}
