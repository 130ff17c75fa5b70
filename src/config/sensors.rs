//! Sampling and publishing settings for the attached thermometers.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use validator::Validate;

/// The `[sensors]` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct SensorsConfig {
    /// Base topic. With more than one device each reading goes to
    /// `<topic>/<address>`; a single device publishes to `<topic>` itself.
    #[validate(length(min = 1, max = 255, message = "Topic must be between 1 and 255 characters"))]
    pub topic: String,

    #[validate(range(min = 0, max = 2, message = "Invalid QoS value, must be 0, 1, or 2"))]
    pub qos: u8,

    /// Pause between sampling rounds, in milliseconds.
    #[validate(range(min = 1, message = "Interval must be at least 1 ms"))]
    pub interval_ms: u64,

    /// Total time a single device may spend retrying a read.
    #[validate(range(
        min = 1,
        max = 3600,
        message = "Read timeout must be between 1 and 3600 seconds"
    ))]
    pub read_timeout_secs: u64,

    /// Log every successfully published payload at INFO.
    pub print_messages: bool,

    /// Root of the w1 sysfs tree.
    #[validate(length(min = 1, message = "w1 devices path must not be empty"))]
    pub w1_devices_path: String,

    /// Explicit device ids (`28-xxxxxxxxxxxx`) in read order. Empty means
    /// every DS18B20 found on the bus.
    pub devices: Vec<String>,
}

impl Default for SensorsConfig {
    fn default() -> Self {
        SensorsConfig {
            topic: "thermobee/temperature".to_string(),
            qos: 1,
            interval_ms: 10_000,
            read_timeout_secs: 60,
            print_messages: false,
            w1_devices_path: "/sys/bus/w1/devices".to_string(),
            devices: Vec::new(),
        }
    }
}

impl SensorsConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }
}
