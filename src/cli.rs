use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::Level;

use crate::config::Config;

/// The command line interface for board link.
#[derive(Parser)]
#[command(author, version, about)]
pub struct Cli {
    /// Path to a configuration file
    pub config: Option<PathBuf>,

    /// The most verbose level logged to stdout
    #[arg(long, default_value_t = Level::INFO)]
    pub log_level: Level,

    /// Also log to daily rotated files in this directory
    #[arg(long)]
    pub log_dir: Option<PathBuf>,

    /// Subcommands
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Commands available in the command line interface.
#[derive(Subcommand)]
pub enum Commands {
    /// Examples for user convenience.
    #[command(subcommand)]
    Examples(Examples),

    /// List the serial ports on this host.
    Ports,

    /// Upload firmware to a board, then exit.
    Flash {
        /// The serial path of the board
        path: String,

        /// The board model, for example "Arduino Uno"
        model: String,

        /// The Intel HEX image to upload.
        /// Taken from the configuration file if not given.
        image: Option<PathBuf>,
    },
}

/// Helpful examples for users.
#[derive(Subcommand, Clone)]
pub enum Examples {
    /// Show an example of a configuration file's contents.
    Config,

    /// Show an example of a line a board prints.
    Message,
}

/// Print the example asked for.
pub fn show_example(example: Examples) {
    match example {
        Examples::Config => {
            println!("{}", Config::example().serialize_pretty());
        }
        Examples::Message => {
            let message = crate::protocol::Message::new(
                &crate::protocol::FunctionType::DhtTemperature,
                21.5,
            );
            print!("{}", String::from_utf8_lossy(&message.to_line()));
        }
    }
}
