//! A single temperature sample and its wire form.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use super::error::TelemetryError;

/// One successful device read. Immutable once produced.
///
/// Serializes as `{"temperature":<°C>,"timestamp":"<RFC 3339>"}`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    /// Degrees Celsius.
    pub temperature: f64,

    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

impl Reading {
    pub fn new(temperature: f64, timestamp: OffsetDateTime) -> Self {
        Self {
            temperature,
            timestamp,
        }
    }

    /// Reading stamped with the current UTC time.
    pub fn now(temperature: f64) -> Self {
        Self::new(temperature, OffsetDateTime::now_utc())
    }

    /// JSON payload published to the broker.
    ///
    /// JSON has no NaN or infinity and `serde_json` would quietly write
    /// `null`, so non-finite temperatures are rejected here.
    pub fn to_payload(&self) -> Result<Vec<u8>, TelemetryError> {
        if !self.temperature.is_finite() {
            return Err(TelemetryError::SerializationFailed(
                <serde_json::Error as serde::ser::Error>::custom(format!(
                    "temperature {} is not a finite number",
                    self.temperature
                )),
            ));
        }
        Ok(serde_json::to_vec(self)?)
    }
}

/// Topic for one device: the base topic alone when it is the only device,
/// `<base>/<address>` otherwise.
pub fn device_topic(base: &str, address: &str, device_count: usize) -> String {
    let base = base.trim_end_matches('/');
    if device_count == 1 {
        base.to_string()
    } else {
        format!("{base}/{address}")
    }
}
