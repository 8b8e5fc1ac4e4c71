//! Routing decoded messages to the devices of one connection.

use std::sync::Arc;

use tracing::{debug, trace, warn};

use crate::{
    device::LogicalDevice,
    error::Error,
    protocol::{self, FunctionType, Message},
    serial::SerialMessage,
    sink::ValueSink,
};

/// What happened to one message.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DispatchReport {
    /// Devices which got the value.
    pub delivered: usize,

    /// Devices for which the value sink failed.
    pub failed: usize,
}

/// Hands decoded values to the value sink for every matching device.
///
/// The devices are a snapshot taken when the connection was made.
pub struct Dispatcher {
    devices: Vec<LogicalDevice>,
    sink: Arc<dyn ValueSink>,
}

impl Dispatcher {
    /// Create a dispatcher for the given linked devices.
    pub fn new(devices: Vec<LogicalDevice>, sink: Arc<dyn ValueSink>) -> Self {
        Self { devices, sink }
    }

    /// The linked devices this dispatcher routes to.
    pub fn devices(&self) -> &[LogicalDevice] {
        &self.devices
    }

    /// Decode a line and dispatch it if it is a message.
    /// Lines which are not messages are logged and dropped.
    pub async fn handle_line(&self, line: SerialMessage) -> Option<DispatchReport> {
        trace!(%line, "Line from board");

        let message = protocol::decode_message(line)?;

        Some(self.dispatch(&message).await)
    }

    /// Give the message's value to each device with the same function type.
    ///
    /// Devices are handled one at a time, in snapshot order.
    /// A failing device does not stop the others.
    pub async fn dispatch(&self, message: &Message) -> DispatchReport {
        let mut report = DispatchReport::default();

        let function = message.function();
        if !function.updates_feature() {
            debug!(%function, "Unhandled function, nothing to dispatch");
            return report;
        }

        for device in &self.devices {
            if device.function().as_ref() != Some(&function) {
                continue;
            }

            match self.apply(device, &function, message).await {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    warn!(%device, %e, "Could not apply value");
                    report.failed += 1;
                }
            }
        }

        trace!(?report, %function, "Dispatched");
        report
    }

    async fn apply(
        &self,
        device: &LogicalDevice,
        function: &FunctionType,
        message: &Message,
    ) -> Result<(), Error> {
        match function {
            FunctionType::Recv433 | FunctionType::DhtTemperature | FunctionType::DhtHumidity => {
                let feature = device.primary_feature()?;
                self.sink.set_value(device, feature, message.value()).await
            }
            FunctionType::Unhandled(_) => Ok(()),
        }
    }
}
