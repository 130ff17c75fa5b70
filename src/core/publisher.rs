//! Publish sink abstraction and the body of one publish task.

use std::fmt;

use thermobee_mqtt::MqttInstance;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use super::error::TelemetryError;

/// Outcome code reported by the broker for a publish.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReasonCode(pub u8);

impl ReasonCode {
    pub const SUCCESS: ReasonCode = ReasonCode(0);
    pub const NO_MATCHING_SUBSCRIBERS: ReasonCode = ReasonCode(16);

    /// Success, or accepted with nobody listening.
    pub fn is_ok(self) -> bool {
        self == Self::SUCCESS || self == Self::NO_MATCHING_SUBSCRIBERS
    }
}

impl fmt::Display for ReasonCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Destination for serialized readings. A call may block for as long as
/// the underlying client needs; callers run it on its own task.
///
/// Implementations must give up once `cancel` fires rather than wait on a
/// broker that may never come back.
#[async_trait::async_trait]
pub trait PublishSink: Send + Sync + 'static {
    async fn publish(
        &self,
        topic: &str,
        payload: Vec<u8>,
        qos: u8,
        cancel: &CancellationToken,
    ) -> Result<ReasonCode, TelemetryError>;
}

/// Everything one publish task needs.
#[derive(Debug, Clone, PartialEq)]
pub struct PublishRequest {
    pub device: String,
    pub topic: String,
    pub payload: Vec<u8>,
    pub qos: u8,
}

/// Performs one publish and logs the outcome. Never retries and never
/// returns an error: failures end here.
pub async fn publish_reading<S>(
    sink: &S,
    request: PublishRequest,
    print_messages: bool,
    cancel: &CancellationToken,
) where
    S: PublishSink + ?Sized,
{
    let PublishRequest {
        device,
        topic,
        payload,
        qos,
    } = request;
    let printed = print_messages.then(|| String::from_utf8_lossy(&payload).into_owned());

    match sink.publish(&topic, payload, qos, cancel).await {
        Err(e) => {
            error!(device = %device, topic = %topic, error = %e, "Failed to publish reading");
        }
        Ok(code) if !code.is_ok() => {
            info!(device = %device, topic = %topic, reason_code = code.0, "Publish returned reason code");
        }
        Ok(_) => match printed {
            Some(message) => info!(topic = %topic, "sent message: {}", message),
            None => debug!(device = %device, topic = %topic, "Reading published"),
        },
    }
}

/// MQTT 3.1.1 acknowledgements carry no reason code, so a request the client
/// accepted is reported as [`ReasonCode::SUCCESS`].
#[async_trait::async_trait]
impl PublishSink for MqttInstance {
    async fn publish(
        &self,
        topic: &str,
        payload: Vec<u8>,
        qos: u8,
        cancel: &CancellationToken,
    ) -> Result<ReasonCode, TelemetryError> {
        MqttInstance::publish(self, topic, qos, payload, cancel).await?;
        Ok(ReasonCode::SUCCESS)
    }
}
