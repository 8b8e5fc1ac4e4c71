//! Opening ports.
//!
//! The registry only needs a byte stream per path.
//! Real boards are reached through [`SerialTransport`],
//! tests use [`crate::mock::MockTransport`].

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_serial::{SerialPortBuilderExt, SerialStream};
use tracing::debug;

use crate::serial::error::SerialPortError;

/// The baud rate boards running the hub firmware use.
pub const DEFAULT_BAUD_RATE: u32 = 9600;

/// Settings used when opening a port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortSettings {
    /// Bits per second.
    pub baud_rate: u32,

    /// Flow control on the line.
    pub flow_control: serialport::FlowControl,
}

impl Default for PortSettings {
    fn default() -> Self {
        Self {
            baud_rate: DEFAULT_BAUD_RATE,
            flow_control: serialport::FlowControl::None,
        }
    }
}

/// Something which can open a byte stream to a board given its path.
pub trait Transport: Send + Sync + 'static {
    /// The byte stream of an open port.
    type Stream: AsyncRead + AsyncWrite + Send + Unpin + 'static;

    /// Open the port at `path`.
    ///
    /// The port must not be locked for exclusive access,
    /// other tools on the host may open it too.
    fn open(&self, path: &str, settings: &PortSettings) -> Result<Self::Stream, SerialPortError>;
}

/// Opens actual serial ports on the host.
#[derive(Debug, Default, Clone, Copy)]
pub struct SerialTransport;

impl Transport for SerialTransport {
    type Stream = SerialStream;

    fn open(&self, path: &str, settings: &PortSettings) -> Result<Self::Stream, SerialPortError> {
        debug!(%path, ?settings, "Opening serial port");

        #[allow(unused_mut)]
        let mut stream = tokio_serial::new(path, settings.baud_rate)
            .data_bits(tokio_serial::DataBits::Eight)
            .parity(tokio_serial::Parity::None)
            .stop_bits(tokio_serial::StopBits::One)
            .flow_control(settings.flow_control)
            .open_native_async()?;

        #[cfg(unix)]
        stream.set_exclusive(false)?;

        Ok(stream)
    }
}
