#![deny(missing_docs)]

//! Board Link connects a home automation hub to microcontroller boards on serial ports.
//!
//! Boards print newline delimited JSON such as
//! `{"function_name":"DHT_TEMPERATURE","parameters":{"value":21.5}}`.
//! For each connected board, a task reads its lines, decodes the messages,
//! and hands each value to the [`sink::ValueSink`] for every logical device
//! linked to that board with the same function type.
//! Anything else a board prints is logged and ignored.
//!
//! Ports are owned by the [`registry::RegistryHandle`].

/// The command line interface.
pub mod cli;

/// Relates to config files.
pub mod config;

/// Boards and the logical devices linked to them.
pub mod device;

/// Looking up logical devices.
pub mod directory;

/// Routing messages to devices.
pub mod dispatch;

/// Possible errors in this library.
pub mod error;

/// Uploading firmware to boards.
pub mod flash;

/// Finding the devices linked to a board.
pub mod linked;

/// Logging/tracing setup.
pub mod logging;

/// Mocked serial ports.
pub mod mock;

/// The line protocol boards speak.
pub mod protocol;

/// Opening, closing and writing to ports.
pub mod registry;

/// Serial port driver.
pub mod serial;

/// Where decoded values end up.
pub mod sink;
