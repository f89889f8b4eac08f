use std::{error::Error, process::Stdio, sync::Arc};

use anyhow::{Context, Result};
use tokio::{
    process::{Child, Command},
    task::JoinHandle,
};
use tracing::{Instrument, debug, info, info_span, instrument};

use super::{WorkerSession, WorkerSettings};
use crate::{
    ipc::{self, BoxedReader, Endpoint, IpcReceiver, IpcSender},
    models::signals::worker::Message,
    platform::{Bootstrapper, Runtime},
};

enum WorkerKind {
    Task(JoinHandle<()>),
    Process(Child),
}

/// Main-side handle of a running worker.
pub struct WorkerHandle {
    sender: IpcSender,
    receiver: IpcReceiver<BoxedReader>,
    kind: WorkerKind,
}

impl WorkerHandle {
    /// Runs the worker as a task of the current runtime.
    pub fn spawn_task(
        runtime: Arc<dyn Runtime>,
        bootstrapper: Arc<dyn Bootstrapper>,
        settings: WorkerSettings,
    ) -> Self {
        let (main, worker) = ipc::pair();
        let session = WorkerSession::new(worker.sender, runtime, bootstrapper, settings);
        let task = tokio::spawn(session.run(worker.receiver).instrument(info_span!("task_worker")));
        Self { sender: main.sender, receiver: main.receiver, kind: WorkerKind::Task(task) }
    }

    /// Runs the worker as a child process speaking the framed protocol over
    /// its stdin and stdout. Its stderr is inherited.
    #[instrument(skip_all, err)]
    pub fn spawn_process(mut command: Command) -> Result<Self> {
        command.stdin(Stdio::piped()).stdout(Stdio::piped()).stderr(Stdio::inherit()).kill_on_drop(true);
        let mut child = command.spawn().context("Failed to spawn worker process")?;
        let stdin = child.stdin.take().context("Worker process has no stdin")?;
        let stdout = child.stdout.take().context("Worker process has no stdout")?;
        info!(pid = ?child.id(), "Worker process started");

        Ok(Self {
            sender: IpcSender::spawn_writer(stdin),
            receiver: IpcReceiver::new(Box::new(stdout) as BoxedReader),
            kind: WorkerKind::Process(child),
        })
    }

    /// Wraps the main end of a pair whose worker end is driven by hand.
    #[cfg(test)]
    pub(crate) fn from_endpoint(main: Endpoint<BoxedReader>) -> Self {
        Self {
            sender: main.sender,
            receiver: main.receiver,
            kind: WorkerKind::Task(tokio::spawn(async {})),
        }
    }

    pub fn send(&self, message: Message) {
        self.sender.broadcast(message);
    }

    /// Next message from the worker; `None` once it is gone.
    pub async fn recv(&mut self) -> Option<Message> {
        self.receiver.recv().await
    }

    /// Stops the worker. Never fails: errors are logged and dropped.
    pub fn terminate(&mut self) {
        match &mut self.kind {
            WorkerKind::Task(task) => {
                task.abort();
                debug!("Worker task aborted");
            }
            WorkerKind::Process(child) => match child.start_kill() {
                Ok(()) => debug!(pid = ?child.id(), "Worker process killed"),
                Err(e) => debug!(error = &e as &dyn Error, "Failed to kill worker process"),
            },
        }
    }
}

/// Entry point of a worker child process: serves the session over stdio
/// until the main side closes stdin.
pub async fn serve_stdio(
    runtime: Arc<dyn Runtime>,
    bootstrapper: Arc<dyn Bootstrapper>,
    settings: WorkerSettings,
) {
    let Endpoint { sender, receiver } = ipc::stdio();
    WorkerSession::new(sender, runtime, bootstrapper, settings).run(receiver).await;
}
