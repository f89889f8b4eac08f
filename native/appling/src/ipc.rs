//! Framed message channel between the main side and the worker.
//!
//! Every message is a JSON document in a length-delimited frame. The same
//! framing runs over an in-memory duplex pipe (worker task) or over
//! stdin/stdout (worker child process).

use std::error::Error;

use anyhow::{Context, Result};
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use tokio::{
    io::{AsyncRead, AsyncWrite, Stdin},
    sync::mpsc,
};
use tokio_util::codec::{FramedRead, FramedWrite, LengthDelimitedCodec};
use tracing::{Instrument, debug, error, info_span, warn};

use crate::models::signals::worker::Message;

const DUPLEX_BUFFER_SIZE: usize = 64 * 1024;

pub fn encode(message: &Message) -> Result<Bytes> {
    let json = serde_json::to_vec(message).context("Failed to encode IPC message")?;
    Ok(Bytes::from(json))
}

/// Decodes one frame. Malformed frames are logged and yield `None`.
pub fn decode(frame: &[u8]) -> Option<Message> {
    match serde_json::from_slice(frame) {
        Ok(message) => Some(message),
        Err(e) => {
            warn!(
                error = &e as &dyn Error,
                frame = %String::from_utf8_lossy(frame),
                "Failed to decode IPC message, dropping it"
            );
            None
        }
    }
}

/// Sending half of a channel. Cheap to clone; sending never blocks.
#[derive(Debug, Clone)]
pub struct IpcSender {
    tx: mpsc::UnboundedSender<Message>,
}

impl IpcSender {
    /// A sender whose messages land in the returned queue instead of a pipe.
    pub fn detached() -> (Self, mpsc::UnboundedReceiver<Message>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Starts a writer task that frames messages onto `writer`.
    ///
    /// The task shuts the writer down once every clone of the sender is gone,
    /// which the peer observes as end of stream.
    pub fn spawn_writer<W>(writer: W) -> Self
    where
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (sender, mut rx) = Self::detached();
        tokio::spawn(
            async move {
                let mut sink = FramedWrite::new(writer, LengthDelimitedCodec::new());
                while let Some(message) = rx.recv().await {
                    let frame = match encode(&message) {
                        Ok(frame) => frame,
                        Err(e) => {
                            error!(error = e.as_ref() as &dyn Error, "Dropping unencodable message");
                            continue;
                        }
                    };
                    if let Err(e) = sink.send(frame).await {
                        error!(error = &e as &dyn Error, "IPC write failed, closing writer");
                        return;
                    }
                }
                if let Err(e) = SinkExt::<Bytes>::close(&mut sink).await {
                    debug!(error = &e as &dyn Error, "Failed to shut down IPC writer");
                }
            }
            .instrument(info_span!("task_ipc_writer")),
        );
        sender
    }

    pub fn broadcast(&self, message: Message) {
        if let Err(e) = self.tx.send(message) {
            debug!(message = ?e.0, "IPC peer is gone, dropping message");
        }
    }
}

/// Receiving half of a channel.
#[derive(Debug)]
pub struct IpcReceiver<R> {
    frames: FramedRead<R, LengthDelimitedCodec>,
}

impl<R: AsyncRead + Unpin> IpcReceiver<R> {
    pub fn new(reader: R) -> Self {
        Self { frames: FramedRead::new(reader, LengthDelimitedCodec::new()) }
    }

    /// Waits for the next well-formed message. Returns `None` at end of stream
    /// or when the underlying pipe fails.
    pub async fn recv(&mut self) -> Option<Message> {
        while let Some(frame) = self.frames.next().await {
            match frame {
                Ok(frame) => {
                    if let Some(message) = decode(&frame) {
                        return Some(message);
                    }
                }
                Err(e) => {
                    error!(error = &e as &dyn Error, "IPC read failed");
                    return None;
                }
            }
        }
        None
    }
}

/// One side of a channel.
#[derive(Debug)]
pub struct Endpoint<R> {
    pub sender: IpcSender,
    pub receiver: IpcReceiver<R>,
}

pub type BoxedReader = Box<dyn AsyncRead + Unpin + Send>;

/// Two connected endpoints over an in-memory pipe.
pub fn pair() -> (Endpoint<BoxedReader>, Endpoint<BoxedReader>) {
    let (left, right) = tokio::io::duplex(DUPLEX_BUFFER_SIZE);
    let (left_read, left_write) = tokio::io::split(left);
    let (right_read, right_write) = tokio::io::split(right);
    (
        Endpoint {
            sender: IpcSender::spawn_writer(left_write),
            receiver: IpcReceiver::new(Box::new(left_read) as BoxedReader),
        },
        Endpoint {
            sender: IpcSender::spawn_writer(right_write),
            receiver: IpcReceiver::new(Box::new(right_read) as BoxedReader),
        },
    )
}

/// Endpoint of a worker child process: reads stdin, writes stdout.
pub fn stdio() -> Endpoint<Stdin> {
    Endpoint {
        sender: IpcSender::spawn_writer(tokio::io::stdout()),
        receiver: IpcReceiver::new(tokio::io::stdin()),
    }
}
