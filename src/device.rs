//! Boards, the logical devices linked to them, and their parameters.

use std::fmt::Display;

use serde::{Deserialize, Serialize};

use crate::{error::Error, protocol::FunctionType};

/// Parameter holding the serial path of a board.
pub const ARDUINO_PATH: &str = "ARDUINO_PATH";

/// Parameter holding the model name of a board, for example "Arduino Uno".
pub const ARDUINO_MODEL: &str = "ARDUINO_MODEL";

/// Parameter of a logical device holding the selector of the board it is linked to.
pub const ARDUINO_LINKED: &str = "ARDUINO_LINKED";

/// Parameter of a logical device holding its [`FunctionType`].
pub const FUNCTION: &str = "FUNCTION";

/// The model of device records which describe a board itself.
/// These are never routed messages.
pub const CARD_MODEL: &str = "card";

/// The service boards and their devices belong to.
pub const SERVICE: &str = "arduino";

/// A named configuration value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Param {
    /// The name, such as [`ARDUINO_PATH`].
    pub name: String,

    /// The value, if set.
    pub value: Option<String>,
}

impl Param {
    /// A parameter with a value.
    pub fn new<N: AsRef<str>, V: AsRef<str>>(name: N, value: V) -> Self {
        Self {
            name: name.as_ref().into(),
            value: Some(value.as_ref().into()),
        }
    }
}

/// An ordered collection of [`Param`]s.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Params(Vec<Param>);

impl Params {
    /// The value of the first parameter called `name`, if it has one.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|param| param.name == name)
            .and_then(|param| param.value.as_deref())
    }

    /// Set the value of the first parameter called `name`,
    /// appending it if there is none.
    pub fn set<V: AsRef<str>>(&mut self, name: &str, value: V) {
        match self.0.iter_mut().find(|param| param.name == name) {
            Some(param) => param.value = Some(value.as_ref().into()),
            None => self.0.push(Param::new(name, value)),
        }
    }

    /// Iterate over borrowed [`Param`]s.
    pub fn iter(&self) -> impl Iterator<Item = &Param> {
        self.0.iter()
    }
}

impl FromIterator<Param> for Params {
    fn from_iter<T: IntoIterator<Item = Param>>(iter: T) -> Self {
        Params(iter.into_iter().collect())
    }
}

impl<N: AsRef<str>, V: AsRef<str>> FromIterator<(N, V)> for Params {
    fn from_iter<T: IntoIterator<Item = (N, V)>>(iter: T) -> Self {
        iter.into_iter()
            .map(|(name, value)| Param::new(name, value))
            .collect()
    }
}

/// A physical microcontroller reachable over a serial path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Board {
    /// Stable identifier, referred to by [`ARDUINO_LINKED`].
    pub selector: String,

    /// Human readable name.
    pub name: String,

    /// Configuration, including [`ARDUINO_PATH`] and possibly [`ARDUINO_MODEL`].
    pub params: Params,
}

impl Board {
    /// A board at `path`.
    pub fn new(selector: &str, path: &str) -> Self {
        Self {
            selector: selector.into(),
            name: selector.into(),
            params: Params::from_iter([(ARDUINO_PATH, path)]),
        }
    }

    /// The same board, with a model.
    pub fn with_model(mut self, model: &str) -> Self {
        self.params.set(ARDUINO_MODEL, model);
        self
    }

    /// The serial path of the board.
    pub fn path(&self) -> Result<&str, Error> {
        self.params
            .get(ARDUINO_PATH)
            .ok_or_else(|| Error::MissingParameter {
                selector: self.selector.clone(),
                name: ARDUINO_PATH.into(),
            })
    }

    /// The model name of the board, if configured.
    pub fn model_identifier(&self) -> Option<&str> {
        self.params.get(ARDUINO_MODEL)
    }
}

impl Display for Board {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.params.get(ARDUINO_PATH) {
            Some(path) => write!(f, "{} ({path})", self.selector),
            None => write!(f, "{}", self.selector),
        }
    }
}

/// One value bearing endpoint of a [`LogicalDevice`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Feature {
    /// Stable identifier.
    pub selector: String,

    /// Human readable name.
    pub name: String,

    /// What kind of value this is, for example "temperature-sensor".
    pub category: String,
}

impl Feature {
    /// Create a feature.
    pub fn new(selector: &str, category: &str) -> Self {
        Self {
            selector: selector.into(),
            name: selector.into(),
            category: category.into(),
        }
    }
}

/// A sensor or actuator attached through a [`Board`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogicalDevice {
    /// Stable identifier.
    pub selector: String,

    /// Human readable name.
    pub name: String,

    /// The service owning this device.
    pub service: String,

    /// The device model. Records of model [`CARD_MODEL`] describe boards.
    pub model: Option<String>,

    /// Configuration, including [`ARDUINO_LINKED`] and [`FUNCTION`].
    pub params: Params,

    /// The features values are written to.
    pub features: Vec<Feature>,
}

impl LogicalDevice {
    /// A device linked to `board`, performing `function`.
    pub fn new(selector: &str, board: &str, function: &FunctionType) -> Self {
        Self {
            selector: selector.into(),
            name: selector.into(),
            service: SERVICE.into(),
            model: None,
            params: Params::from_iter([(ARDUINO_LINKED, board), (FUNCTION, function.as_str())]),
            features: vec![],
        }
    }

    /// The same device, with another feature.
    pub fn with_feature(mut self, feature: Feature) -> Self {
        self.features.push(feature);
        self
    }

    /// The same device, with a model.
    pub fn with_model(mut self, model: &str) -> Self {
        self.model = Some(model.into());
        self
    }

    /// The selector of the board this device is linked to.
    pub fn linked_to(&self) -> Option<&str> {
        self.params.get(ARDUINO_LINKED)
    }

    /// The function type of this device, if set.
    pub fn function(&self) -> Option<FunctionType> {
        self.params.get(FUNCTION).map(FunctionType::from)
    }

    /// Whether this record describes a board rather than a sensor or actuator.
    pub fn is_card(&self) -> bool {
        self.model.as_deref() == Some(CARD_MODEL)
    }

    /// The feature decoded values are written to.
    pub fn primary_feature(&self) -> Result<&Feature, Error> {
        self.features.first().ok_or_else(|| Error::MissingParameter {
            selector: self.selector.clone(),
            name: "feature".into(),
        })
    }
}

impl Display for LogicalDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.selector)
    }
}

/// Which devices to return from a device directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceFilter {
    /// Only devices of this service.
    pub service: String,
}

impl Default for DeviceFilter {
    fn default() -> Self {
        Self {
            service: SERVICE.into(),
        }
    }
}

impl DeviceFilter {
    /// Check if a device passes the filter.
    pub fn matches(&self, device: &LogicalDevice) -> bool {
        device.service == self.service
    }
}
