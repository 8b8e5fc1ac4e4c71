//! The line protocol boards speak.
//!
//! Every line a board prints is either a JSON message such as
//!
//! ```json
//! {"function_name":"DHT_TEMPERATURE","parameters":{"value":21.5}}
//! ```
//!
//! or free text (debug output, boot banners) which is ignored.

use std::fmt::Display;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::serial::SerialMessage;

/// The kinds of messages the hub knows how to route.
///
/// Identifiers not known here are kept as [`FunctionType::Unhandled`],
/// so parsing a function type never fails.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FunctionType {
    /// A code received by a 433 MHz radio receiver.
    Recv433,

    /// A temperature reading from a DHT sensor.
    DhtTemperature,

    /// A humidity reading from a DHT sensor.
    DhtHumidity,

    /// Anything else.
    Unhandled(String),
}

impl FunctionType {
    /// The function types boards may report.
    pub const KNOWN: [FunctionType; 3] = [
        FunctionType::Recv433,
        FunctionType::DhtTemperature,
        FunctionType::DhtHumidity,
    ];

    /// The identifier used on the wire and in device parameters.
    pub fn as_str(&self) -> &str {
        match self {
            FunctionType::Recv433 => "RECV_433",
            FunctionType::DhtTemperature => "DHT_TEMPERATURE",
            FunctionType::DhtHumidity => "DHT_HUMIDITY",
            FunctionType::Unhandled(other) => other,
        }
    }

    /// Whether values of this kind are written to the device's feature.
    pub fn updates_feature(&self) -> bool {
        match self {
            FunctionType::Recv433 | FunctionType::DhtTemperature | FunctionType::DhtHumidity => {
                true
            }
            FunctionType::Unhandled(_) => false,
        }
    }

    /// Check if this is the [`FunctionType::Unhandled`] variant.
    pub fn is_unhandled(&self) -> bool {
        matches!(self, Self::Unhandled(..))
    }
}

impl From<&str> for FunctionType {
    fn from(identifier: &str) -> Self {
        match identifier {
            "RECV_433" => FunctionType::Recv433,
            "DHT_TEMPERATURE" => FunctionType::DhtTemperature,
            "DHT_HUMIDITY" => FunctionType::DhtHumidity,
            other => FunctionType::Unhandled(other.into()),
        }
    }
}

impl Display for FunctionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The payload of a [`Message`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameters {
    /// The reported value.
    pub value: serde_json::Value,
}

/// A decoded protocol line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Which function on the board produced this message.
    pub function_name: String,

    /// What it reported.
    pub parameters: Parameters,
}

impl Message {
    /// Create a new message.
    pub fn new(function: &FunctionType, value: impl Into<serde_json::Value>) -> Self {
        Self {
            function_name: function.as_str().into(),
            parameters: Parameters {
                value: value.into(),
            },
        }
    }

    /// The function type this message is tagged with.
    pub fn function(&self) -> FunctionType {
        FunctionType::from(self.function_name.as_str())
    }

    /// The reported value.
    pub fn value(&self) -> &serde_json::Value {
        &self.parameters.value
    }

    /// Encode as a single line, delimiter included.
    pub fn to_line(&self) -> Vec<u8> {
        let mut line =
            serde_json::to_vec(self).expect("A message is a string and a json value, always valid");
        line.push(b'\n');
        line
    }
}

/// A line which is not a protocol message.
#[derive(Debug, Error)]
#[error("Not a protocol message: {0}")]
pub struct DecodeError(#[from] serde_json::Error);

/// What a line turned out to be.
#[derive(Debug)]
pub enum Decoded {
    /// A protocol message.
    Message(Message),

    /// Anything else a board printed.
    Noise {
        /// The line as read.
        line: SerialMessage,

        /// Why it was not a message.
        problem: DecodeError,
    },
}

impl Decoded {
    /// The message, if the line was one.
    pub fn into_message(self) -> Option<Message> {
        if let Self::Message(message) = self {
            Some(message)
        } else {
            None
        }
    }
}

/// Try to interpret a line as a protocol message.
pub fn decode_line(line: SerialMessage) -> Decoded {
    match serde_json::from_str::<Message>(line.as_str()) {
        Ok(message) => Decoded::Message(message),
        Err(e) => Decoded::Noise {
            line,
            problem: e.into(),
        },
    }
}

/// Like [`decode_line`], but noise is logged and dropped.
pub fn decode_message(line: SerialMessage) -> Option<Message> {
    match decode_line(line) {
        Decoded::Message(message) => Some(message),
        Decoded::Noise { line, problem } => {
            debug!(%line, %problem, "Ignoring line");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    #[test]
    fn decodes_message() {
        let line = SerialMessage::from(
            r#"{"function_name":"DHT_TEMPERATURE","parameters":{"value":21.5}}"#,
        );

        let message = decode_line(line).into_message().unwrap();

        assert_eq!(message.function(), FunctionType::DhtTemperature);
        assert_eq!(message.value(), &json!(21.5));
    }

    #[test]
    fn extra_keys_are_ignored() {
        let line = SerialMessage::from(
            r#"{"function_name":"RECV_433","parameters":{"value":1234,"pulse":350},"v":2}"#,
        );

        let message = decode_message(line).unwrap();

        assert_eq!(message.function(), FunctionType::Recv433);
        assert_eq!(message.value(), &json!(1234));
    }

    #[test]
    fn free_text_is_noise() {
        for line in [
            "garbage",
            "",
            "{",
            "[1, 2, 3]",
            r#"{"function_name":"DHT_HUMIDITY"}"#,
            r#"{"parameters":{"value":3}}"#,
        ] {
            assert!(
                matches!(decode_line(line.into()), Decoded::Noise { .. }),
                "{line}"
            );
        }
    }

    #[test]
    fn unknown_function_names_are_unhandled() {
        let message = decode_message(
            r#"{"function_name":"SOIL_MOISTURE","parameters":{"value":3}}"#.into(),
        )
        .unwrap();

        assert_eq!(
            message.function(),
            FunctionType::Unhandled("SOIL_MOISTURE".into())
        );
        assert!(!message.function().updates_feature());
    }

    #[test]
    fn identifiers_match_wire_names() {
        for function in FunctionType::KNOWN {
            assert_eq!(FunctionType::from(function.as_str()), function);
            assert!(function.updates_feature());
        }
    }

    #[test]
    fn encoded_message_is_one_line() {
        let line = Message::new(&FunctionType::DhtHumidity, 40).to_line();

        assert_eq!(line.last(), Some(&b'\n'));
        assert_eq!(line.iter().filter(|&&b| b == b'\n').count(), 1);

        let decoded = decode_message(SerialMessage::new_lossy(&line[..line.len() - 1])).unwrap();
        assert_eq!(decoded.function(), FunctionType::DhtHumidity);
    }
}
