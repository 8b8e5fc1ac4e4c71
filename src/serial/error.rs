use std::io;

use thiserror::Error;

/// Any error the serial layer might encounter.
#[derive(Debug, Error)]
pub enum SerialPortError {
    /// IO related errors.
    #[error("Underlying IO problem: {0}")]
    IO(#[from] io::Error),

    /// Problems reported by the serial port driver.
    #[error("Serial port driver problem: {0}")]
    Driver(#[from] tokio_serial::Error),

    /// Serial port disconnected.
    #[error("Serial port disconnected")]
    Disconnected,
}
