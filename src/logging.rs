use std::{
    path::{Path, PathBuf},
    sync::Mutex,
};

use tracing::{debug, info, metadata::LevelFilter, trace, Level};
use tracing_appender::{
    non_blocking::WorkerGuard,
    rolling::{RollingFileAppender, Rotation},
};
use tracing_subscriber::{prelude::*, EnvFilter};

use crate::error::Error;

/// The file name log files start with. The date is appended.
pub const LOG_FILE_PREFIX: &str = "board-link.log";

/// Keeps the file writer's background thread alive until [`shutdown`].
static FILE_GUARD: Mutex<Option<WorkerGuard>> = Mutex::new(None);

/// Where and how verbosely to log to files.
#[derive(Debug, Clone)]
pub struct FileLogging {
    /// The directory daily log files are put in. Created if missing.
    pub dir: PathBuf,

    /// The most verbose level written to the files.
    pub level: Level,
}

fn file_appender(dir: &Path) -> Result<RollingFileAppender, Error> {
    RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(LOG_FILE_PREFIX)
        .build(dir)
        .map_err(|e| Error::Logging(format!("Cannot log to {dir:?}: {e}")))
}

/// Initialize tracing.
///
/// Logs go to stdout, filtered by `RUST_LOG` if set and `stdout_level` otherwise,
/// and to daily rotated files if `file_logging` is given.
///
/// Only the first call installs anything, so tests may call this.
pub fn init(stdout_level: Level, file_logging: Option<FileLogging>) -> Result<(), Error> {
    let stdout_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(stdout_level.to_string()));
    let stdout_layer = tracing_subscriber::fmt::layer().with_filter(stdout_filter);

    let (file_layer, guard) = match &file_logging {
        Some(FileLogging { dir, level }) => {
            let (writer, guard) = tracing_appender::non_blocking(file_appender(dir)?);

            let layer = tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_filter(LevelFilter::from(*level));

            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    if tracing_subscriber::registry()
        .with(stdout_layer)
        .with(file_layer)
        .try_init()
        .is_err()
    {
        trace!("Logging was already initialized");
        return Ok(());
    }

    if let Some(guard) = guard {
        *FILE_GUARD.lock().unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(guard);
    }

    info!(files = ?file_logging.map(|f| f.dir), "Logging initialized");
    Ok(())
}

/// Flush anything pending to the log files before exiting.
///
/// Events after this only reach stdout.
pub fn shutdown() {
    debug!("Shutting down logging");

    let guard = FILE_GUARD
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
        .take();

    // Dropping the guard waits for the writer thread to flush.
    drop(guard);
}
