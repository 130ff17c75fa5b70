//! The sampling loop.
//!
//! Every round runs the same four steps:
//!
//! ```text
//!   gate ──► read all (retry each) ──► publish all (one task each) ──► pace
//!    ▲                                                                  │
//!    └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The gate, the pacing sleep and every publish watch the shutdown token.
//! Publishes are spawned on the [`ShutdownCoordinator`] and never awaited by
//! the round.

use std::{sync::Arc, time::Duration};

use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use super::{
    backoff::RetryPolicy,
    device::DeviceReader,
    gate::ConnectionGate,
    publisher::{publish_reading, PublishRequest, PublishSink},
    reading::{device_topic, Reading},
    shutdown::ShutdownCoordinator,
};
use crate::config::sensors::SensorsConfig;

/// Per-round parameters, fixed for the life of the scheduler.
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduleSettings {
    pub topic: String,
    pub qos: u8,
    pub interval: Duration,
    pub retry: RetryPolicy,
    pub print_messages: bool,
}

impl From<&SensorsConfig> for ScheduleSettings {
    fn from(config: &SensorsConfig) -> Self {
        Self {
            topic: config.topic.clone(),
            qos: config.qos,
            interval: config.interval(),
            retry: RetryPolicy::new(config.read_timeout()),
            print_messages: config.print_messages,
        }
    }
}

pub struct Scheduler {
    gate: Arc<dyn ConnectionGate>,
    sink: Arc<dyn PublishSink>,
    devices: Vec<Arc<dyn DeviceReader>>,
    settings: ScheduleSettings,
    shutdown: ShutdownCoordinator,
}

impl Scheduler {
    pub fn new(
        gate: Arc<dyn ConnectionGate>,
        sink: Arc<dyn PublishSink>,
        devices: Vec<Arc<dyn DeviceReader>>,
        settings: ScheduleSettings,
        shutdown: ShutdownCoordinator,
    ) -> Self {
        Self {
            gate,
            sink,
            devices,
            settings,
            shutdown,
        }
    }

    /// Loops until the shutdown token fires. Publishes still in flight when
    /// this returns are left to the coordinator's drain.
    pub async fn run(&self) {
        let cancel = self.shutdown.cancel_token();
        info!(
            devices = self.devices.len(),
            topic = %self.settings.topic,
            interval_ms = self.settings.interval.as_millis() as u64,
            "Scheduler started"
        );

        loop {
            if let Err(e) = self.gate.await_connection(&cancel).await {
                info!(reason = %e, "Scheduler stopping");
                return;
            }

            let launched = self.run_round().await;
            debug!(launched, "Round complete");

            tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    info!("Scheduler stopping: shutdown requested");
                    return;
                }
                _ = sleep(self.settings.interval) => {}
            }
        }
    }

    /// One read-all/publish-all pass. Returns the number of publish tasks
    /// launched.
    pub async fn run_round(&self) -> usize {
        let readings = self.read_all().await;
        self.publish_all(readings)
    }

    /// Reads every device in configured order. Failures are logged and the
    /// device is skipped for this round.
    async fn read_all(&self) -> Vec<(String, Reading)> {
        let mut readings = Vec::with_capacity(self.devices.len());

        for device in &self.devices {
            let address = device.address();
            match self.settings.retry.retry(address, || device.read()).await {
                Ok(reading) => {
                    debug!(device = %address, temperature = reading.temperature, "Read device");
                    readings.push((address.to_string(), reading));
                }
                Err(e) => warn!(device = %address, error = %e, "Skipping device this round"),
            }
        }

        readings
    }

    fn publish_all(&self, readings: Vec<(String, Reading)>) -> usize {
        let device_count = self.devices.len();
        let mut launched = 0;

        for (address, reading) in readings {
            let payload = match reading.to_payload() {
                Ok(payload) => payload,
                Err(e) => {
                    error!(device = %address, error = %e, "Failed to serialize reading");
                    continue;
                }
            };

            let request = PublishRequest {
                topic: device_topic(&self.settings.topic, &address, device_count),
                device: address,
                payload,
                qos: self.settings.qos,
            };
            let sink = Arc::clone(&self.sink);
            let print_messages = self.settings.print_messages;
            let cancel = self.shutdown.cancel_token();

            self.shutdown.spawn_tracked(async move {
                publish_reading(sink.as_ref(), request, print_messages, &cancel).await;
            });
            launched += 1;
        }

        launched
    }
}
