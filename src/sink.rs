//! Where decoded values end up.

use futures::future::{self, BoxFuture};
use tracing::info;

use crate::{
    device::{Feature, LogicalDevice},
    error::Error,
};

/// Commits a decoded value to a feature of a logical device.
///
/// Implementations typically persist the value and publish it to the rest of the hub.
/// A failure should be reported as [`Error::ValueSink`].
pub trait ValueSink: Send + Sync {
    /// Apply `value` to `feature` of `device`.
    fn set_value<'a>(
        &'a self,
        device: &'a LogicalDevice,
        feature: &'a Feature,
        value: &'a serde_json::Value,
    ) -> BoxFuture<'a, Result<(), Error>>;
}

/// A sink which only logs values.
/// Useful when running without a hub attached.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingSink;

impl ValueSink for LoggingSink {
    fn set_value<'a>(
        &'a self,
        device: &'a LogicalDevice,
        feature: &'a Feature,
        value: &'a serde_json::Value,
    ) -> BoxFuture<'a, Result<(), Error>> {
        info!(%device, feature = %feature.selector, %value, "New value");

        Box::pin(future::ready(Ok(())))
    }
}
