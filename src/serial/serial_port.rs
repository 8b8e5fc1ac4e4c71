use std::{fmt::Display, io, pin::Pin, time::Duration};

use futures::{
    channel::{
        mpsc::{self, UnboundedReceiver, UnboundedSender},
        oneshot,
    },
    SinkExt, Stream, StreamExt,
};
use serde::{Deserialize, Serialize};
use tokio::{io::AsyncWrite, task::JoinHandle};
use tokio_util::{codec::FramedWrite, sync::CancellationToken};
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::{
    dispatch::Dispatcher,
    serial::{
        codecs::lines::{line_stream, LinesCodec},
        error::SerialPortError,
        transport::{PortSettings, Transport},
        SerialMessage, SerialMessageBytes,
    },
};

/// How long a closing port may take to stop its tasks before they are aborted.
pub const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

/// How long a write may wait for the wire.
pub const WRITE_TIMEOUT: Duration = Duration::from_secs(5);

/// Identifies one opening of a port.
/// Reconnecting the same path gives a new id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Builder for a [`SerialPortHandle`].
#[derive(Debug, Default)]
pub struct SerialPortBuilder {
    path: String,
    settings: PortSettings,
    line_codec: Option<LinesCodec>,
}

struct Outgoing {
    bytes: SerialMessageBytes,
    done: oneshot::Sender<Result<(), SerialPortError>>,
}

impl std::fmt::Debug for Outgoing {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Outgoing")
            .field("bytes", &self.bytes.len())
            .finish()
    }
}

type Lines = Pin<Box<dyn Stream<Item = SerialMessage> + Send>>;

async fn read_lines(mut lines: Lines, dispatcher: Dispatcher, cancel: CancellationToken) {
    loop {
        tokio::select! {
            biased;

            _ = cancel.cancelled() => {
                debug!("Asked to close");
                break;
            }
            line = lines.next() => {
                let Some(line) = line else {
                    warn!("Port stopped producing lines, exiting");
                    break;
                };

                // Awaiting dispatch here keeps lines in arrival order.
                // A close drops the dispatch in flight.
                tokio::select! {
                    biased;

                    _ = cancel.cancelled() => {
                        debug!("Asked to close while dispatching");
                        break;
                    }
                    _ = dispatcher.handle_line(line) => {}
                }
            }
        }
    }

    // Take the writer down with us.
    cancel.cancel();
    info!("Port closed");
}

async fn write_outgoing<W: AsyncWrite + Unpin>(
    mut sink: FramedWrite<W, LinesCodec>,
    mut outgoing: UnboundedReceiver<Outgoing>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;

            _ = cancel.cancelled() => break,
            next = outgoing.next() => {
                let Some(Outgoing { bytes, done }) = next else {
                    debug!("Every writer dropped");
                    break;
                };

                tokio::select! {
                    biased;

                    _ = cancel.cancelled() => {
                        let _ = done.send(Err(SerialPortError::Disconnected));
                        break;
                    }
                    sent = sink.send(bytes) => {
                        let failed = sent.is_err();
                        if let Err(e) = &sent {
                            error!(?e, "Serial port error in send, exiting");
                        }
                        let _ = done.send(sent);

                        if failed {
                            break;
                        }
                    }
                }
            }
        }
    }

    cancel.cancel();
}

impl SerialPortBuilder {
    /// Start a new builder.
    /// The path should likely be along the lines of `/dev/ttyUSBx` on unix, and `COMx` on Windows.
    pub fn new(path: &str) -> Self {
        Self {
            path: path.to_string(),
            ..Default::default()
        }
    }

    /// Set the [`PortSettings`] to use.
    pub fn set_settings(mut self, settings: PortSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Set the [LinesCodec] to use.
    pub fn set_line_codec(mut self, codec: LinesCodec) -> Self {
        self.line_codec = Some(codec);
        self
    }

    /// Open the port and start handing its lines to `dispatcher`.
    ///
    /// Reading and writing run as separate tasks,
    /// so a slow dispatch never holds up a write.
    pub fn build<T: Transport>(
        self,
        transport: &T,
        dispatcher: Dispatcher,
    ) -> Result<SerialPortHandle, SerialPortError> {
        let stream = transport.open(&self.path, &self.settings)?;

        let connection = ConnectionId::new();
        info!(%self.path, %connection, baud = self.settings.baud_rate, "Port open");

        let codec = self.line_codec.unwrap_or_default();

        let (reader, writer) = tokio::io::split(stream);

        let lines: Lines = Box::pin(line_stream(reader, codec.clone()));
        let sink = FramedWrite::new(writer, codec);

        let (serial_tx, serial_rx) = mpsc::unbounded::<Outgoing>();

        let cancel = CancellationToken::new();
        let port_span = info_span!("port", %self.path, %connection);

        let reader = tokio::spawn(
            read_lines(lines, dispatcher, cancel.clone()).instrument(port_span.clone()),
        );
        let writer_task =
            tokio::spawn(write_outgoing(sink, serial_rx, cancel.clone()).instrument(port_span));

        Ok(SerialPortHandle {
            path: self.path,
            connection,
            reader,
            writer_task,
            writer: PortWriter {
                cancel: cancel.clone(),
                serial_tx,
            },
            cancel,
        })
    }
}

/// Puts bytes on the wire of one open port.
/// Cheap to clone, and usable without holding the [`SerialPortHandle`].
#[derive(Debug, Clone)]
pub struct PortWriter {
    cancel: CancellationToken,
    serial_tx: UnboundedSender<Outgoing>,
}

impl PortWriter {
    /// Put bytes on the wire, as-is.
    ///
    /// Returns once they are written, or fails after [`WRITE_TIMEOUT`].
    pub async fn write(&self, bytes: SerialMessageBytes) -> Result<(), SerialPortError> {
        if self.cancel.is_cancelled() {
            return Err(SerialPortError::Disconnected);
        }

        let (done, written) = oneshot::channel();

        self.serial_tx
            .unbounded_send(Outgoing { bytes, done })
            .map_err(|_| SerialPortError::Disconnected)?;

        match tokio::time::timeout(WRITE_TIMEOUT, written).await {
            Ok(written) => written.map_err(|_| SerialPortError::Disconnected)?,
            Err(_) => Err(SerialPortError::IO(io::Error::new(
                io::ErrorKind::TimedOut,
                "write did not finish in time",
            ))),
        }
    }
}

/// One open port and the tasks reading from and writing to it.
///
/// The port is released when both tasks end,
/// either through [`SerialPortHandle::close`] or because the port went away.
#[derive(Debug)]
pub struct SerialPortHandle {
    path: String,
    connection: ConnectionId,
    reader: JoinHandle<()>,
    writer_task: JoinHandle<()>,
    writer: PortWriter,
    cancel: CancellationToken,
}

/// Wait for a port task, aborting it if it does not stop in time.
async fn join_or_abort(mut task: JoinHandle<()>, timeout: Duration) -> Result<(), SerialPortError> {
    let joined = match tokio::time::timeout(timeout, &mut task).await {
        Ok(joined) => joined,
        Err(_) => {
            warn!("Port task did not stop in time, aborting it");
            task.abort();
            task.await
        }
    };

    match joined {
        Ok(()) => Ok(()),
        Err(e) if e.is_cancelled() => Ok(()),
        Err(e) => Err(SerialPortError::IO(io::Error::new(io::ErrorKind::Other, e))),
    }
}

impl SerialPortHandle {
    /// The path of the port.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Which opening of the port this is.
    pub fn connection(&self) -> ConnectionId {
        self.connection
    }

    /// Whether the port is still open and being read.
    pub fn is_open(&self) -> bool {
        !self.cancel.is_cancelled()
            && !self.reader.is_finished()
            && !self.writer_task.is_finished()
    }

    /// A writer for this port.
    pub fn writer(&self) -> PortWriter {
        self.writer.clone()
    }

    /// Put bytes on the wire, as-is.
    pub async fn write(&self, bytes: SerialMessageBytes) -> Result<(), SerialPortError> {
        self.writer.write(bytes).await
    }

    /// Stop reading and writing, and release the port.
    ///
    /// A dispatch in flight is dropped. Once this returns,
    /// no more lines from this connection are dispatched.
    pub async fn close(self) -> Result<(), SerialPortError> {
        let Self {
            path,
            reader,
            writer_task,
            cancel,
            ..
        } = self;

        cancel.cancel();

        let (read, write) = tokio::join!(
            join_or_abort(reader, CLOSE_TIMEOUT),
            join_or_abort(writer_task, CLOSE_TIMEOUT)
        );

        debug!(%path, "Port tasks stopped");
        read.and(write)
    }
}
