//! The device reader seam between the scheduler and the sensor bus.

use std::io;

use thiserror::Error;

use super::reading::Reading;

/// Failure of a single read attempt.
#[derive(Debug, Error)]
pub enum DeviceError {
    /// The sensor answered with nothing usable yet (CRC mismatch, power-on
    /// value). Worth retrying.
    #[error("device {device} not responding: {reason}")]
    NotResponding { device: String, reason: String },

    /// Output that does not parse as a temperature at all.
    #[error("device {device} returned invalid data: {reason}")]
    InvalidData { device: String, reason: String },

    /// The bus itself failed (sysfs entry missing, driver error). Not retried.
    #[error("device {device} failed to convert: cannot read {path}")]
    Bus {
        device: String,
        path: String,
        #[source]
        source: io::Error,
    },
}

impl DeviceError {
    /// True when another attempt might succeed.
    pub fn is_transient(&self) -> bool {
        !matches!(self, DeviceError::Bus { .. })
    }
}

/// One physical sensor.
///
/// `read` may be called repeatedly; each call is an independent attempt.
#[async_trait::async_trait]
pub trait DeviceReader: Send + Sync {
    /// Stable hex address, used as the per-device topic suffix.
    fn address(&self) -> &str;

    async fn read(&self) -> Result<Reading, DeviceError>;
}
