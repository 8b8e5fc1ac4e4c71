//! Uploading firmware to a board.
//!
//! This is a one-shot operation handed to `avrdude`,
//! it does not involve the registry. Disconnect the board first,
//! since the upload needs the port for itself.

use std::{
    ffi::OsString,
    path::{Path, PathBuf},
};

use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::error::Error;

/// What `avrdude` needs to know about a board model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadTarget {
    /// The microcontroller, as `avrdude -p` names it.
    pub part: &'static str,

    /// The bootloader protocol, as `avrdude -c` names it.
    pub programmer: &'static str,

    /// The bootloader baud rate.
    pub baud_rate: u32,
}

impl UploadTarget {
    /// The target for a model name such as "Arduino Uno".
    pub fn for_model(model: &str) -> Result<Self, Error> {
        let target = |part, programmer, baud_rate| UploadTarget {
            part,
            programmer,
            baud_rate,
        };

        Ok(match model {
            "Arduino Uno" | "Arduino Uno WiFi" => target("atmega328p", "arduino", 115_200),
            "Arduino Nano" | "Arduino Duemilanove or Diecimila" | "Arduino Pro or Pro Mini" => {
                target("atmega328p", "arduino", 57_600)
            }
            "Arduino Mega or Mega 2560" => target("atmega2560", "wiring", 115_200),
            "Arduino Leonardo" | "Arduino Micro" | "Arduino Yun" | "Arduino Yun Mini" => {
                target("atmega32u4", "avr109", 57_600)
            }
            other => return Err(Error::UnsupportedModel(other.into())),
        })
    }
}

/// Flashes firmware images with `avrdude`.
#[derive(Debug, Clone)]
pub struct Flasher {
    program: PathBuf,
}

impl Default for Flasher {
    fn default() -> Self {
        Self {
            program: PathBuf::from("avrdude"),
        }
    }
}

impl Flasher {
    /// Use a specific `avrdude` binary.
    pub fn new<P: AsRef<Path>>(program: P) -> Self {
        Self {
            program: program.as_ref().into(),
        }
    }

    fn arguments(path: &str, target: &UploadTarget, image: &Path) -> Vec<OsString> {
        let mut write = OsString::from("flash:w:");
        write.push(image.as_os_str());
        write.push(":i");

        vec![
            "-p".into(),
            target.part.into(),
            "-c".into(),
            target.programmer.into(),
            "-P".into(),
            path.into(),
            "-b".into(),
            target.baud_rate.to_string().into(),
            "-D".into(),
            "-U".into(),
            write,
        ]
    }

    /// Write the Intel HEX `image` to the board of `model` at `path`.
    pub async fn flash(&self, path: &str, model: &str, image: &Path) -> Result<(), Error> {
        let target = UploadTarget::for_model(model)?;

        if !image.is_file() {
            return Err(Error::Flash {
                path: path.into(),
                problem: format!("no firmware image at {image:?}"),
            });
        }

        let arguments = Self::arguments(path, &target, image);
        debug!(program = ?self.program, ?arguments, "Flashing");

        let output = Command::new(&self.program)
            .args(&arguments)
            .output()
            .await
            .map_err(|e| Error::Flash {
                path: path.into(),
                problem: format!("could not run {:?}: {e}", self.program),
            })?;

        if output.status.success() {
            info!(%path, %model, "Flashing done");
            Ok(())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!(%path, %model, status = %output.status, "Flashing failed");

            Err(Error::Flash {
                path: path.into(),
                problem: format!("{}: {}", output.status, stderr.trim()),
            })
        }
    }
}
