//! The registry owns every open port.
//! It is the only place where ports are opened and closed.
//!
//! The registry runs as a task, requests are handled one at a time.
//! So two connects for the same path never race, and a send never
//! races a close.
//!
//! The registry never waits on a board: writes complete on their own task,
//! and closing a port drops any dispatch it has in flight.

use std::{
    collections::HashMap,
    fmt::{Debug, Display},
    sync::Arc,
};

use chrono::{DateTime, Utc};
use futures::{channel::mpsc, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::{
    device::{Board, DeviceFilter},
    directory::DeviceDirectory,
    dispatch::Dispatcher,
    error::Error,
    linked::linked_devices,
    protocol::Message,
    serial::{
        codecs::lines::LinesCodec,
        serial_port::{ConnectionId, PortWriter, SerialPortBuilder, SerialPortHandle},
        transport::{PortSettings, Transport},
        SerialMessageBytes,
    },
    sink::ValueSink,
};

/// A successful connect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionInfo {
    /// The path of the port.
    pub path: String,

    /// Identifies this opening of the port.
    pub connection: ConnectionId,

    /// The selectors of the devices messages are routed to,
    /// in routing order.
    pub linked_devices: Vec<String>,

    /// When the port was opened.
    pub connected_at: DateTime<Utc>,
}

/// Actions available to ask of the registry.
#[derive(Debug)]
enum Action {
    Connect(Board),
    Disconnect(String),
    Send((String, SerialMessageBytes)),
    IsConnected(String),
    ConnectedPaths,
    Shutdown,
}

impl Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Action::Connect(board) => write!(f, "connect: {board}"),
            Action::Disconnect(path) => write!(f, "disconnect: {path}"),
            Action::Send((path, bytes)) => write!(f, "send {} byte(s) to {path}", bytes.len()),
            Action::IsConnected(path) => write!(f, "is connected: {path}"),
            Action::ConnectedPaths => write!(f, "connected paths"),
            Action::Shutdown => write!(f, "shutdown"),
        }
    }
}

#[derive(Debug)]
enum Response {
    Connected(ConnectionInfo),
    Disconnected(bool),
    Sent,
    IsConnected(bool),
    ConnectedPaths(Vec<String>),
    ShutDown,
}

struct Request {
    action: Action,
    response: oneshot::Sender<Result<Response, Error>>,
}

struct Registry<T: Transport> {
    requests: mpsc::UnboundedReceiver<Request>,
    transport: T,
    settings: PortSettings,
    line_codec: LinesCodec,
    directory: Arc<dyn DeviceDirectory>,
    sink: Arc<dyn ValueSink>,
    ports: HashMap<String, SerialPortHandle>,
}

impl<T: Transport> Registry<T> {
    async fn run(mut self) {
        while let Some(Request { action, response }) = self.requests.next().await {
            debug!(%action, "Got request");

            let stop = matches!(action, Action::Shutdown);

            let reply = match action {
                Action::Connect(board) => self.connect(board).await.map(Response::Connected),
                Action::Disconnect(path) => {
                    self.disconnect(&path).await.map(Response::Disconnected)
                }
                Action::Send((path, bytes)) => match self.writer(&path) {
                    Ok(writer) => {
                        // The write is awaited off the registry task,
                        // so a slow port never holds up the other paths.
                        tokio::spawn(
                            async move {
                                let reply = writer
                                    .write(bytes)
                                    .await
                                    .map(|()| Response::Sent)
                                    .map_err(|e| Error::port_closed(&path, e));

                                if response.send(reply).is_err() {
                                    debug!("Requester left before the reply");
                                }
                            }
                            .in_current_span(),
                        );
                        continue;
                    }
                    Err(e) => Err(e),
                },
                Action::IsConnected(path) => Ok(Response::IsConnected(self.is_connected(&path))),
                Action::ConnectedPaths => Ok(Response::ConnectedPaths(self.connected_paths())),
                Action::Shutdown => {
                    self.close_all().await;
                    Ok(Response::ShutDown)
                }
            };

            if response.send(reply).is_err() {
                debug!("Requester left before the reply");
            }

            if stop {
                break;
            }
        }

        // Also reached when every handle is dropped.
        self.close_all().await;
        info!("Registry stopped");
    }

    async fn connect(&mut self, board: Board) -> Result<ConnectionInfo, Error> {
        let path = board.path()?.to_owned();

        let devices = self
            .directory
            .get_all_devices(&DeviceFilter::default())
            .await?;
        let linked = linked_devices(&devices, &board);

        debug!(%board, "{} linked device(s)", linked.len());

        // The old read loop must be gone before the new one starts.
        if let Some(previous) = self.ports.remove(&path) {
            let connection = previous.connection();
            if let Err(e) = previous.close().await {
                warn!(%path, %connection, %e, "Problem closing previous connection, reopening anyway");
            }
        }

        let linked_selectors = linked
            .iter()
            .map(|device| device.selector.clone())
            .collect::<Vec<_>>();

        let handle = SerialPortBuilder::new(&path)
            .set_settings(self.settings)
            .set_line_codec(self.line_codec.clone())
            .build(&self.transport, Dispatcher::new(linked, self.sink.clone()))
            .map_err(|e| {
                warn!(%path, %e, "Could not open port");
                Error::port_open(&path, e)
            })?;

        let info = ConnectionInfo {
            path: path.clone(),
            connection: handle.connection(),
            linked_devices: linked_selectors,
            connected_at: Utc::now(),
        };

        self.ports.insert(path, handle);

        info!(%board, connection = %info.connection, "Connected");
        Ok(info)
    }

    async fn disconnect(&mut self, path: &str) -> Result<bool, Error> {
        let Some(handle) = self.ports.remove(path) else {
            debug!(%path, "Nothing to disconnect");
            return Ok(false);
        };

        let was_open = handle.is_open();
        handle.close().await.map_err(|e| Error::port_closed(path, e))?;

        info!(%path, "Disconnected");
        Ok(was_open)
    }

    fn writer(&self, path: &str) -> Result<PortWriter, Error> {
        self.ports
            .get(path)
            .filter(|handle| handle.is_open())
            .map(SerialPortHandle::writer)
            .ok_or_else(|| Error::NotConnected(path.into()))
    }

    fn is_connected(&self, path: &str) -> bool {
        self.ports.get(path).map_or(false, SerialPortHandle::is_open)
    }

    fn connected_paths(&self) -> Vec<String> {
        let mut paths = self
            .ports
            .values()
            .filter(|handle| handle.is_open())
            .map(|handle| handle.path().to_owned())
            .collect::<Vec<_>>();
        paths.sort();
        paths
    }

    async fn close_all(&mut self) {
        for (path, handle) in self.ports.drain() {
            if let Err(e) = handle.close().await {
                warn!(%path, %e, "Problem closing port");
            }
        }
    }
}

/// Builder for a [`RegistryHandle`].
pub struct RegistryBuilder {
    directory: Arc<dyn DeviceDirectory>,
    sink: Arc<dyn ValueSink>,
    settings: PortSettings,
    line_codec: LinesCodec,
}

impl RegistryBuilder {
    /// Start a new builder.
    pub fn new(directory: Arc<dyn DeviceDirectory>, sink: Arc<dyn ValueSink>) -> Self {
        Self {
            directory,
            sink,
            settings: PortSettings::default(),
            line_codec: LinesCodec::default(),
        }
    }

    /// Set the [`PortSettings`] ports are opened with.
    pub fn set_settings(mut self, settings: PortSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Set the [`LinesCodec`] ports are read with.
    pub fn set_line_codec(mut self, codec: LinesCodec) -> Self {
        self.line_codec = codec;
        self
    }

    /// Start the registry, opening ports through `transport`.
    pub fn build<T: Transport>(self, transport: T) -> RegistryHandle {
        let (requests_tx, requests_rx) = mpsc::unbounded::<Request>();

        let registry = Registry {
            requests: requests_rx,
            transport,
            settings: self.settings,
            line_codec: self.line_codec,
            directory: self.directory,
            sink: self.sink,
            ports: HashMap::new(),
        };

        tokio::spawn(registry.run().instrument(info_span!("registry")));

        RegistryHandle(requests_tx)
    }
}

/// A handle to the running registry.
/// Cheap to clone.
#[derive(Debug, Clone)]
pub struct RegistryHandle(mpsc::UnboundedSender<Request>);

impl Debug for Request {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Request")
            .field("action", &self.action)
            .finish()
    }
}

impl RegistryHandle {
    async fn perform_action(&self, action: Action) -> Result<Response, Error> {
        let (tx, rx) = oneshot::channel();

        self.0
            .unbounded_send(Request {
                action,
                response: tx,
            })
            .map_err(|_| Error::RegistryStopped)?;

        rx.await.map_err(|_| Error::RegistryStopped)?
    }

    /// Open the board's port and start routing its messages to the devices linked to it.
    ///
    /// Any existing connection for the same path is closed first,
    /// and its read loop has stopped before the new port is opened.
    /// The linked devices are looked up once, here.
    pub async fn connect(&self, board: Board) -> Result<ConnectionInfo, Error> {
        match self.perform_action(Action::Connect(board)).await? {
            Response::Connected(info) => Ok(info),
            other => unreachable!("Connect replied with {other:?}"),
        }
    }

    /// Close the port at `path`.
    ///
    /// Returns whether an open connection was closed.
    /// Disconnecting a path which is not connected does nothing.
    pub async fn disconnect(&self, path: &str) -> Result<bool, Error> {
        match self.perform_action(Action::Disconnect(path.into())).await? {
            Response::Disconnected(closed) => Ok(closed),
            other => unreachable!("Disconnect replied with {other:?}"),
        }
    }

    /// Close the port of a board which is being removed.
    pub async fn remove_board(&self, board: &Board) -> Result<bool, Error> {
        self.disconnect(board.path()?).await
    }

    /// Write `payload` to the board at `path`, as-is.
    pub async fn send(&self, path: &str, payload: SerialMessageBytes) -> Result<(), Error> {
        match self
            .perform_action(Action::Send((path.into(), payload)))
            .await?
        {
            Response::Sent => Ok(()),
            other => unreachable!("Send replied with {other:?}"),
        }
    }

    /// Write a protocol message to the board at `path`.
    pub async fn send_message(&self, path: &str, message: &Message) -> Result<(), Error> {
        self.send(path, message.to_line()).await
    }

    /// Whether `path` has an open port.
    pub async fn is_connected(&self, path: &str) -> Result<bool, Error> {
        match self.perform_action(Action::IsConnected(path.into())).await? {
            Response::IsConnected(connected) => Ok(connected),
            other => unreachable!("IsConnected replied with {other:?}"),
        }
    }

    /// The paths with open ports, sorted.
    pub async fn connected_paths(&self) -> Result<Vec<String>, Error> {
        match self.perform_action(Action::ConnectedPaths).await? {
            Response::ConnectedPaths(paths) => Ok(paths),
            other => unreachable!("ConnectedPaths replied with {other:?}"),
        }
    }

    /// Close every port and stop the registry.
    /// Any later request fails with [`Error::RegistryStopped`].
    pub async fn shutdown(&self) -> Result<(), Error> {
        match self.perform_action(Action::Shutdown).await? {
            Response::ShutDown => Ok(()),
            other => unreachable!("Shutdown replied with {other:?}"),
        }
    }
}
