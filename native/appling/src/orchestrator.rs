//! Main side of an installation: relays between the presentation surface and
//! the worker, and owns both of their lifetimes.

use std::{error::Error, sync::Arc};

use anyhow::{Context, Result};
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, error, info, instrument, warn};

use crate::{
    models::{
        InstallConfig, InstallOptions, WindowGeometry,
        signals::{
            view::{InstallState, ViewIntent, ViewUpdate},
            worker::Message,
        },
    },
    platform::{Bootstrapper, InstallLock, Runtime},
    preflight::{PreflightOutcome, preflight},
    worker::{WorkerHandle, WorkerSettings},
};

/// The window the user interacts with. Rendering is up to the implementor.
pub trait Surface: Send {
    fn show(&mut self) -> Result<()>;

    fn post(&mut self, update: ViewUpdate);

    /// Asks the surface to close. The relay stops afterwards.
    fn close(&mut self);

    fn destroy(&mut self);
}

/// How an installer run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallOutcome {
    /// The application was started, right away when `installed` is false.
    Launched { installed: bool },
    /// The surface was closed without launching.
    Closed,
}

/// External dependencies of the installer.
#[derive(Clone)]
pub struct Dependencies {
    pub runtime: Arc<dyn Runtime>,
    pub bootstrapper: Arc<dyn Bootstrapper>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Stop(InstallOutcome),
}

pub struct Orchestrator {
    id: String,
    config: InstallConfig,
    lock: Option<InstallLock>,
    runtime: Arc<dyn Runtime>,
    config_sent: bool,
    pending_install: bool,
}

impl Orchestrator {
    /// `lock` is the lock preflight handed over; it is released on launch, or
    /// dropped with the orchestrator on any other exit.
    pub fn new(id: &str, config: InstallConfig, lock: InstallLock, runtime: Arc<dyn Runtime>) -> Self {
        Self {
            id: id.to_string(),
            config,
            lock: Some(lock),
            runtime,
            config_sent: false,
            pending_install: false,
        }
    }

    /// Shows the surface and relays until it closes. The worker is terminated
    /// and the surface destroyed on every exit path.
    #[instrument(skip_all, fields(id = %self.id))]
    pub async fn run<S: Surface>(
        mut self,
        mut worker: WorkerHandle,
        mut surface: S,
        mut intents: UnboundedReceiver<ViewIntent>,
    ) -> Result<InstallOutcome> {
        let result = match surface.show().context("Failed to show presentation surface") {
            Ok(()) => self.relay(&mut worker, &mut surface, &mut intents).await,
            Err(e) => Err(e),
        };

        worker.terminate();
        surface.destroy();
        result
    }

    async fn relay<S: Surface>(
        &mut self,
        worker: &mut WorkerHandle,
        surface: &mut S,
        intents: &mut UnboundedReceiver<ViewIntent>,
    ) -> Result<InstallOutcome> {
        let mut worker_alive = true;
        loop {
            tokio::select! {
                intent = intents.recv() => match intent {
                    Some(intent) => {
                        if let Flow::Stop(outcome) = self.on_intent(intent, worker, surface)? {
                            return Ok(outcome);
                        }
                    }
                    None => {
                        info!("Presentation surface went away");
                        return Ok(InstallOutcome::Closed);
                    }
                },
                message = worker.recv(), if worker_alive => match message {
                    Some(message) => self.on_worker_message(message, worker, surface),
                    None => {
                        error!("Worker channel closed unexpectedly");
                        worker_alive = false;
                        surface.post(ViewUpdate::State {
                            state: InstallState::Error,
                            error: Some("Installer worker stopped unexpectedly".to_string()),
                        });
                    }
                },
            }
        }
    }

    fn on_intent<S: Surface>(
        &mut self,
        intent: ViewIntent,
        worker: &WorkerHandle,
        surface: &mut S,
    ) -> Result<Flow> {
        debug!(%intent, "Intent from presentation surface");
        match intent {
            ViewIntent::Quit => {
                surface.close();
                Ok(Flow::Stop(InstallOutcome::Closed))
            }
            ViewIntent::Install => {
                if self.config_sent {
                    worker.send(Message::Install);
                } else {
                    debug!("Worker not configured yet, deferring install");
                    self.pending_install = true;
                }
                Ok(Flow::Continue)
            }
            ViewIntent::Launch => {
                let Some(lock) = self.lock.take() else {
                    warn!("Launch requested again after the lock was handed off");
                    return Ok(Flow::Continue);
                };
                if let Err(e) = lock.unlock() {
                    error!(error = e.as_ref() as &dyn Error, "Failed to release lock before launch");
                }
                let opened = self.runtime.open(&self.id);
                surface.close();
                opened.with_context(|| format!("Failed to open application {}", self.id))?;
                info!("Application launched");
                Ok(Flow::Stop(InstallOutcome::Launched { installed: true }))
            }
        }
    }

    fn on_worker_message<S: Surface>(&mut self, message: Message, worker: &WorkerHandle, surface: &mut S) {
        match message {
            Message::Ready => {
                if self.config_sent {
                    debug!("Worker announced itself again, config already sent");
                    return;
                }
                worker.send(Message::Config { data: self.config.clone() });
                self.config_sent = true;
                if std::mem::take(&mut self.pending_install) {
                    worker.send(Message::Install);
                }
            }
            Message::Download { data } => surface.post(ViewUpdate::Progress { data }),
            Message::Complete => {
                info!("Worker finished installing");
                surface.post(ViewUpdate::State { state: InstallState::Complete, error: None });
            }
            Message::Error { error } => {
                error!(error = %error, "Worker reported an installation error");
                surface.post(ViewUpdate::State { state: InstallState::Error, error: Some(error) });
            }
            other => debug!(message = ?other, "Ignoring message not meant for the main side"),
        }
    }
}

/// Installs and launches application `id`.
///
/// Runs preflight first: an application that is already runnable is
/// launched without creating a surface. Otherwise a worker is started, the
/// surface is built from `make_surface` and the run lasts until it closes.
#[instrument(skip(options, deps, make_surface, intents), err)]
pub async fn install<S, F>(
    id: &str,
    options: &InstallOptions,
    deps: Dependencies,
    make_surface: F,
    intents: UnboundedReceiver<ViewIntent>,
) -> Result<InstallOutcome>
where
    S: Surface,
    F: FnOnce(&WindowGeometry) -> Result<S>,
{
    let link = options.link_for(id);
    let lock = match preflight(deps.runtime.as_ref(), id, &link).await? {
        PreflightOutcome::Launched => return Ok(InstallOutcome::Launched { installed: false }),
        PreflightOutcome::NeedsInstall(lock) => lock,
    };

    let config = InstallConfig { dir: lock.dir().to_path_buf(), platform: options.platform.clone(), link };
    let mut worker =
        WorkerHandle::spawn_task(deps.runtime.clone(), deps.bootstrapper, WorkerSettings::from(options));
    let surface = match make_surface(&options.window) {
        Ok(surface) => surface,
        Err(e) => {
            worker.terminate();
            return Err(e.context("Failed to create presentation surface"));
        }
    };

    Orchestrator::new(id, config, lock, deps.runtime).run(worker, surface, intents).await
}
