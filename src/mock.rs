//! A mock, useful to test serial port functionality without the actual serial ports.
//!
//! Opening a path gives the registry one end of an in-memory pipe.
//! The other end is kept as a [`MockBoard`], which can play the part of the board:
//! print lines to the hub, and read what the hub wrote.

use std::{
    collections::{HashMap, HashSet},
    io,
    sync::{Arc, Mutex, MutexGuard},
};

use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};
use tracing::debug;

use crate::serial::{
    error::SerialPortError,
    transport::{PortSettings, Transport},
};

const PIPE_CAPACITY: usize = 4096;

#[derive(Debug, Default)]
struct MockState {
    boards: HashMap<String, Vec<DuplexStream>>,
    opened: HashMap<String, usize>,
    missing: HashSet<String>,
}

/// An in-memory [`Transport`].
///
/// Cloning gives another handle to the same mock.
#[derive(Debug, Default, Clone)]
pub struct MockTransport {
    state: Arc<Mutex<MockState>>,
}

impl MockTransport {
    /// A mock where every path can be opened.
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        // The state is only ever touched by short, non-panicking sections.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Make opening `path` fail, as if nothing was plugged in there.
    pub fn unplug(&self, path: &str) {
        self.state().missing.insert(path.into());
    }

    /// Undo [`MockTransport::unplug`].
    pub fn plug(&self, path: &str) {
        self.state().missing.remove(path);
    }

    /// How many times `path` has been opened.
    pub fn times_opened(&self, path: &str) -> usize {
        self.state().opened.get(path).copied().unwrap_or_default()
    }

    /// The board side of the most recent opening of `path`, if not already taken.
    pub fn take_board(&self, path: &str) -> Option<MockBoard> {
        self.state()
            .boards
            .get_mut(path)
            .and_then(|boards| boards.pop())
            .map(|stream| MockBoard { stream })
    }
}

impl Transport for MockTransport {
    type Stream = DuplexStream;

    fn open(&self, path: &str, settings: &PortSettings) -> Result<Self::Stream, SerialPortError> {
        let mut state = self.state();

        if state.missing.contains(path) {
            return Err(SerialPortError::IO(io::Error::new(
                io::ErrorKind::NotFound,
                format!("no such mock port: {path}"),
            )));
        }

        debug!(%path, ?settings, "Opening mock port");

        let (hub, board) = tokio::io::duplex(PIPE_CAPACITY);

        state.boards.entry(path.into()).or_default().push(board);
        *state.opened.entry(path.into()).or_default() += 1;

        Ok(hub)
    }
}

/// The board end of a mocked port.
#[derive(Debug)]
pub struct MockBoard {
    stream: DuplexStream,
}

impl MockBoard {
    /// Print a line to the hub. The newline is added.
    pub async fn print_line(&mut self, line: &str) -> io::Result<()> {
        self.write_raw(format!("{line}\n").as_bytes()).await
    }

    /// Write bytes to the hub as-is.
    pub async fn write_raw(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.stream.write_all(bytes).await?;
        self.stream.flush().await
    }

    /// Read exactly `len` bytes the hub wrote to the board.
    pub async fn read_exact(&mut self, len: usize) -> io::Result<Vec<u8>> {
        let mut buffer = vec![0; len];
        self.stream.read_exact(&mut buffer).await?;
        Ok(buffer)
    }

    /// Wait until the hub has released the port.
    /// Anything the hub wrote in the meantime is discarded.
    pub async fn closed(&mut self) {
        let mut buffer = [0; 256];

        while let Ok(read) = self.stream.read(&mut buffer).await {
            if read == 0 {
                break;
            }
        }
    }
}
