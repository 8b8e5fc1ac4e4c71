use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::serial::error::SerialPortError;

/// Errors that may occur in this library.
#[derive(Debug, Error, Serialize, Deserialize, PartialEq, Eq, Clone)]
pub enum Error {
    /// The serial transport could not open the port.
    /// No connection is registered for the path.
    #[error("Could not open port at `{path}`. Problem: {problem}")]
    PortOpen {
        /// The path which was attempted.
        path: String,

        /// What went wrong.
        problem: String,
    },

    /// There is no open connection for the path.
    #[error("No open connection for `{0}`")]
    NotConnected(String),

    /// Closing or writing to a port failed.
    #[error("Problem with port `{path}`: {problem}")]
    PortClosed {
        /// The path of the port.
        path: String,

        /// What went wrong.
        problem: String,
    },

    /// The value sink refused a value for a device.
    #[error("Value sink failed for device `{device}`. Problem: {problem}")]
    ValueSink {
        /// The selector of the device.
        device: String,

        /// What went wrong.
        problem: String,
    },

    /// A board or device lacks something it needs,
    /// for example a board without a path.
    #[error("`{selector}` is missing `{name}`")]
    MissingParameter {
        /// The selector of the board or device.
        selector: String,

        /// The missing parameter or feature.
        name: String,
    },

    /// The device directory could not be queried.
    #[error("Device directory problem: {0}")]
    Directory(String),

    /// Flashing firmware failed.
    #[error("Could not flash `{path}`. Problem: {problem}")]
    Flash {
        /// The path of the board.
        path: String,

        /// What went wrong.
        problem: String,
    },

    /// No flashing parameters are known for this board model.
    #[error("Unsupported board model `{0}`")]
    UnsupportedModel(String),

    /// Logging could not be set up.
    #[error("Logging problem: {0}")]
    Logging(String),

    /// The configuration is not valid.
    #[error("Bad configuration: {0}")]
    BadConfig(String),

    /// The connection registry is no longer running.
    #[error("The connection registry has stopped")]
    RegistryStopped,
}

impl Error {
    /// Turn into the string in a [`Error::BadConfig`], if that is the variant.
    pub fn try_into_bad_config(self) -> Result<String, Self> {
        if let Self::BadConfig(v) = self {
            Ok(v)
        } else {
            Err(self)
        }
    }

    pub(crate) fn port_open(path: &str, problem: SerialPortError) -> Self {
        Self::PortOpen {
            path: path.into(),
            problem: problem.to_string(),
        }
    }

    pub(crate) fn port_closed(path: &str, problem: impl std::fmt::Display) -> Self {
        Self::PortClosed {
            path: path.into(),
            problem: problem.to_string(),
        }
    }
}
