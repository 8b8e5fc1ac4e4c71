#![allow(dead_code)]

use std::{sync::Arc, time::Duration};

use board_link::{
    device::{Feature, LogicalDevice},
    directory::InMemoryDirectory,
    error::Error,
    mock::MockTransport,
    protocol::FunctionType,
    registry::{RegistryBuilder, RegistryHandle},
    sink::ValueSink,
};
use color_eyre::Result;
use futures::future::{self, BoxFuture};
use tokio::{sync::mpsc, time::timeout};

/// A value the sink was given.
#[derive(Debug, Clone, PartialEq)]
pub struct Recorded {
    pub device: String,
    pub feature: String,
    pub value: serde_json::Value,
}

/// Forwards every value it gets to the test.
pub struct RecordingSink(mpsc::UnboundedSender<Recorded>);

impl ValueSink for RecordingSink {
    fn set_value<'a>(
        &'a self,
        device: &'a LogicalDevice,
        feature: &'a Feature,
        value: &'a serde_json::Value,
    ) -> BoxFuture<'a, Result<(), Error>> {
        let result = self
            .0
            .send(Recorded {
                device: device.selector.clone(),
                feature: feature.selector.clone(),
                value: value.clone(),
            })
            .map_err(|e| Error::ValueSink {
                device: device.selector.clone(),
                problem: e.to_string(),
            });

        Box::pin(future::ready(result))
    }
}

pub struct Hub {
    pub registry: RegistryHandle,
    pub mock: MockTransport,
    pub directory: InMemoryDirectory,
    pub values: mpsc::UnboundedReceiver<Recorded>,
}

impl Hub {
    /// The next value given to the sink.
    pub async fn next_value(&mut self) -> Result<Recorded> {
        timeout(Duration::from_secs(5), self.values.recv())
            .await?
            .ok_or_else(|| color_eyre::eyre::eyre!("Sink dropped"))
    }

    /// Check that nothing more arrives at the sink for a little while.
    pub async fn assert_no_value(&mut self) {
        let next = timeout(Duration::from_millis(200), self.values.recv()).await;

        assert!(next.is_err(), "Unexpected value: {next:?}");
    }
}

/// A sink which takes its time with every value.
///
/// It reports each value when it starts on it, and again when done.
/// With no delay it never finishes.
pub struct SlowSink {
    delay: Option<Duration>,
    started: mpsc::UnboundedSender<String>,
    finished: mpsc::UnboundedSender<Recorded>,
}

impl SlowSink {
    pub fn new(
        delay: Option<Duration>,
    ) -> (
        Self,
        mpsc::UnboundedReceiver<String>,
        mpsc::UnboundedReceiver<Recorded>,
    ) {
        let (started, started_rx) = mpsc::unbounded_channel();
        let (finished, finished_rx) = mpsc::unbounded_channel();

        (
            Self {
                delay,
                started,
                finished,
            },
            started_rx,
            finished_rx,
        )
    }
}

impl ValueSink for SlowSink {
    fn set_value<'a>(
        &'a self,
        device: &'a LogicalDevice,
        feature: &'a Feature,
        value: &'a serde_json::Value,
    ) -> BoxFuture<'a, Result<(), Error>> {
        Box::pin(async move {
            let _ = self.started.send(device.selector.clone());

            match self.delay {
                Some(delay) => tokio::time::sleep(delay).await,
                None => future::pending::<()>().await,
            }

            let _ = self.finished.send(Recorded {
                device: device.selector.clone(),
                feature: feature.selector.clone(),
                value: value.clone(),
            });
            Ok(())
        })
    }
}

pub fn start_registry(
    devices: Vec<LogicalDevice>,
    sink: Arc<dyn ValueSink>,
) -> (RegistryHandle, MockTransport, InMemoryDirectory) {
    let mock = MockTransport::new();
    let directory = InMemoryDirectory::new(devices);

    let registry = RegistryBuilder::new(Arc::new(directory.clone()), sink).build(mock.clone());

    (registry, mock, directory)
}

pub fn start_hub(devices: Vec<LogicalDevice>) -> Hub {
    let (tx, values) = mpsc::unbounded_channel();

    let (registry, mock, directory) = start_registry(devices, Arc::new(RecordingSink(tx)));

    Hub {
        registry,
        mock,
        directory,
        values,
    }
}

/// A device linked to `board` with a single feature called `<selector>-value`.
pub fn sensor(selector: &str, board: &str, function: FunctionType) -> LogicalDevice {
    LogicalDevice::new(selector, board, &function)
        .with_feature(Feature::new(&format!("{selector}-value"), "sensor"))
}

/// Wait for a condition on the registry to hold.
pub async fn eventually<F, Fut>(mut check: F) -> Result<()>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    timeout(Duration::from_secs(5), async {
        while !check().await {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await?;

    Ok(())
}
