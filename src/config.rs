use std::path::{Path, PathBuf};

use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::{
    device::{Board, Feature, LogicalDevice, CARD_MODEL},
    error::Error,
    protocol::FunctionType,
    serial::transport::{PortSettings, DEFAULT_BAUD_RATE},
};

fn default_baud_rate() -> u32 {
    DEFAULT_BAUD_RATE
}

fn default_flow_control() -> serialport::FlowControl {
    serialport::FlowControl::None
}

/// The configuration used for running the daemon.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// The baud rate ports are opened with.
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,

    /// Flow control ports are opened with.
    #[serde(default = "default_flow_control")]
    pub flow_control: serialport::FlowControl,

    /// The boards to connect when starting.
    #[serde(default)]
    pub boards: Vec<Board>,

    /// The logical devices known to the daemon.
    #[serde(default)]
    pub devices: Vec<LogicalDevice>,

    /// The firmware image used when flashing boards.
    #[serde(default)]
    pub firmware: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            baud_rate: default_baud_rate(),
            flow_control: default_flow_control(),
            boards: vec![],
            devices: vec![],
            firmware: None,
        }
    }
}

impl Config {
    fn ron() -> ron::Options {
        ron::Options::default()
            .with_default_extension(ron::extensions::Extensions::IMPLICIT_SOME)
            .with_default_extension(ron::extensions::Extensions::UNWRAP_NEWTYPES)
    }

    /// Deserialize a .ron file's contents.
    pub fn deserialize(input: &str) -> Result<Self, Error> {
        Self::ron()
            .from_str::<Config>(input)
            .map_err(|e| Error::BadConfig(format!("Not a valid configuration: {e}")))
    }

    /// An example configuration with some fields filled in.
    pub fn example() -> Self {
        let uno = Board::new("living-room-uno", "/dev/ttyUSB0").with_model("Arduino Uno");

        Self {
            boards: vec![uno.clone()],
            devices: vec![
                LogicalDevice::new("living-room-card", &uno.selector, &FunctionType::Recv433)
                    .with_model(CARD_MODEL),
                LogicalDevice::new(
                    "living-room-temperature",
                    &uno.selector,
                    &FunctionType::DhtTemperature,
                )
                .with_feature(Feature::new(
                    "living-room-temperature-value",
                    "temperature-sensor",
                )),
                LogicalDevice::new(
                    "living-room-humidity",
                    &uno.selector,
                    &FunctionType::DhtHumidity,
                )
                .with_feature(Feature::new("living-room-humidity-value", "humidity-sensor")),
            ],
            firmware: Some(PathBuf::from("arduino-code.ino.standard.hex")),
            ..Default::default()
        }
    }

    /// Serialize the configuration in a "pretty" (i.e. non-compact) fashion.
    pub fn serialize_pretty(&self) -> String {
        Self::ron()
            .to_string_pretty(self, ron::ser::PrettyConfig::default())
            .expect("The configuration only holds serializable types")
    }

    /// Setup a new configuration from a RON file.
    pub fn new_from_path<P: AsRef<Path>>(p: P) -> Result<Self, Error> {
        let s = std::fs::read_to_string(p.as_ref()).map_err(|e| {
            Error::BadConfig(format!("Could not read {:?}: {e}", p.as_ref()))
        })?;

        Self::deserialize(&s)
    }

    /// The settings ports are opened with.
    pub fn port_settings(&self) -> PortSettings {
        PortSettings {
            baud_rate: self.baud_rate,
            flow_control: self.flow_control,
        }
    }

    fn check_board_paths(&self) -> Result<(), Error> {
        let mut paths = vec![];

        for board in &self.boards {
            paths.push(board.path().map_err(|e| Error::BadConfig(e.to_string()))?);
        }

        let duplicates = paths.into_iter().duplicates().collect::<Vec<_>>();

        if duplicates.is_empty() {
            Ok(())
        } else {
            Err(Error::BadConfig(format!("Each path can only be used by one board. Duplicates: {duplicates:?}")))
        }
    }

    fn check_board_selectors(&self) -> Result<(), Error> {
        let duplicates = self
            .boards
            .iter()
            .map(|board| &board.selector)
            .duplicates()
            .collect::<Vec<_>>();

        if duplicates.is_empty() {
            Ok(())
        } else {
            Err(Error::BadConfig(format!("Devices are linked to boards by selector, so selectors must be unique. Duplicates: {duplicates:?}")))
        }
    }

    fn check_device_functions(&self) -> Result<(), Error> {
        for device in self.devices.iter().filter(|device| !device.is_card()) {
            if let Some(function) = device.function().filter(FunctionType::is_unhandled) {
                return Err(Error::BadConfig(format!(
                    "The device `{device}` has function `{function}`, which is not one of: {}",
                    FunctionType::KNOWN.iter().join(", ")
                )));
            }
        }

        Ok(())
    }

    /// Check the configuration for mistakes.
    pub fn validate(&self) -> Result<(), Error> {
        self.check_board_paths()?;
        self.check_board_selectors()?;
        self.check_device_functions()?;

        Ok(())
    }
}
