//! Where logical devices are looked up.

use std::sync::Arc;

use futures::future::BoxFuture;
use tokio::sync::RwLock;
use tracing::debug;

use crate::{
    device::{DeviceFilter, LogicalDevice},
    error::Error,
};

/// The hub's device records.
pub trait DeviceDirectory: Send + Sync {
    /// All devices passing `filter`.
    fn get_all_devices<'a>(
        &'a self,
        filter: &'a DeviceFilter,
    ) -> BoxFuture<'a, Result<Vec<LogicalDevice>, Error>>;
}

/// A directory kept in memory.
///
/// Cloning gives another handle to the same records.
#[derive(Debug, Default, Clone)]
pub struct InMemoryDirectory {
    devices: Arc<RwLock<Vec<LogicalDevice>>>,
}

impl InMemoryDirectory {
    /// A directory holding `devices`.
    pub fn new(devices: Vec<LogicalDevice>) -> Self {
        Self {
            devices: Arc::new(RwLock::new(devices)),
        }
    }

    /// Add a device, replacing any with the same selector.
    pub async fn upsert(&self, device: LogicalDevice) {
        let mut devices = self.devices.write().await;

        match devices.iter_mut().find(|d| d.selector == device.selector) {
            Some(existing) => *existing = device,
            None => devices.push(device),
        }
    }

    /// Remove the device with this selector, if present.
    pub async fn remove(&self, selector: &str) -> Option<LogicalDevice> {
        let mut devices = self.devices.write().await;

        let index = devices.iter().position(|d| d.selector == selector)?;
        Some(devices.remove(index))
    }
}

impl DeviceDirectory for InMemoryDirectory {
    fn get_all_devices<'a>(
        &'a self,
        filter: &'a DeviceFilter,
    ) -> BoxFuture<'a, Result<Vec<LogicalDevice>, Error>> {
        Box::pin(async move {
            let devices = self
                .devices
                .read()
                .await
                .iter()
                .filter(|device| filter.matches(device))
                .cloned()
                .collect::<Vec<_>>();

            debug!(?filter, "Directory has {} device(s)", devices.len());

            Ok(devices)
        })
    }
}
