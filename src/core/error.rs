//! Errors surfaced by one sampling round.
//!
//! None of these abort the scheduler: each is logged and the affected
//! device or publish is skipped. The single exception is
//! [`TelemetryError::ConnectionUnavailable`], which is how the connection
//! gate reports shutdown and ends the loop normally.

use std::time::Duration;

use thiserror::Error;

use super::device::DeviceError;

#[derive(Debug, Error)]
pub enum TelemetryError {
    /// Every attempt within the retry budget failed transiently.
    #[error("device {device} failed to respond after {budget:?}")]
    DeviceUnresponsive { device: String, budget: Duration },

    /// A non-transient device failure; not retried.
    #[error(transparent)]
    Device(#[from] DeviceError),

    /// The gate gave up waiting: shutdown was requested or the connection
    /// kernel is gone.
    #[error("broker connection unavailable")]
    ConnectionUnavailable,

    #[error("publish failed: {0}")]
    PublishFailed(String),

    #[error("failed to serialize reading: {0}")]
    SerializationFailed(#[from] serde_json::Error),
}

impl From<thermobee_mqtt::TransferError> for TelemetryError {
    fn from(err: thermobee_mqtt::TransferError) -> Self {
        TelemetryError::PublishFailed(err.to_string())
    }
}
