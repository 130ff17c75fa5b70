//! Entry point tying the client builder and connection kernel together.
//!
//! ```ignore
//! let (instance, kernel) = MqttManager::from_config(config)?.build_and_start()?;
//! let mut state = instance.state_receiver();
//! state.wait_for(ConnectionState::is_connected).await?;
//! instance.publish("sensors/attic", 1, payload, &cancel).await?;
//! instance.shutdown();
//! kernel.await??;
//! ```

use rumqttc::{AsyncClient, QoS};
use tokio::{sync::watch, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use super::{
    client::ClientBuilder, config::Config, connection::ConnectionKernel, error::TransferError,
    state::ConnectionState,
};

/// Builds the broker connection from configuration.
pub struct MqttManager {
    config: Config,
}

impl MqttManager {
    pub fn from_config(config: Config) -> Result<Self, TransferError> {
        Ok(Self { config })
    }

    /// Builds the client and spawns the connection kernel.
    ///
    /// Must be called inside a tokio runtime. Returns immediately; the first
    /// connection attempt runs in the background and its progress is visible
    /// through [`MqttInstance::state_receiver`]. The join handle resolves
    /// when the kernel stops, with an error only for fatal connection
    /// failures.
    pub fn build_and_start(
        self,
    ) -> Result<(MqttInstance, JoinHandle<Result<(), TransferError>>), TransferError> {
        info!(
            host = %self.config.host,
            port = self.config.port,
            tls = self.config.tls_enabled(),
            "Building MQTT connection"
        );

        let (client, event_loop) = ClientBuilder::from_config(&self.config)?.build()?;

        let connection_cancel = CancellationToken::new();
        let kernel = ConnectionKernel::new(
            client.clone(),
            event_loop,
            self.config.connect_retry_delay(),
            connection_cancel.clone(),
        );
        let state_rx = kernel.subscribe_state();

        let handle = tokio::spawn(async move {
            let result = kernel.run().await;
            if let Err(e) = &result {
                error!(error = %e, "MQTT connection kernel exited with error");
            }
            result
        });

        Ok((
            MqttInstance {
                client,
                state_rx,
                connection_cancel,
            },
            handle,
        ))
    }
}

/// Handle to a running broker connection.
///
/// Cheap to clone; every clone talks to the same connection kernel.
#[derive(Debug, Clone)]
pub struct MqttInstance {
    client: AsyncClient,
    state_rx: watch::Receiver<ConnectionState>,
    connection_cancel: CancellationToken,
}

impl MqttInstance {
    /// Fresh receiver of connection state transitions.
    pub fn state_receiver(&self) -> watch::Receiver<ConnectionState> {
        self.state_rx.clone()
    }

    /// Queues a non-retained publish.
    ///
    /// Resolves once the request is handed to the event loop, which may wait
    /// while the request channel is full. Delivery acknowledgement (PUBACK or
    /// PUBCOMP) is tracked by the event loop, not reported here.
    ///
    /// A request still waiting for channel space when `cancel` fires is
    /// dropped and reported as [`TransferError::PublishAbandoned`].
    pub async fn publish(
        &self,
        topic: impl Into<String>,
        qos: u8,
        payload: Vec<u8>,
        cancel: &CancellationToken,
    ) -> Result<(), TransferError> {
        let qos = qos_from_u8(qos)?;
        let topic = topic.into();

        tokio::select! {
            biased;

            queued = self.client.publish(topic.clone(), qos, false, payload) => {
                queued?;
                Ok(())
            }
            _ = cancel.cancelled() => {
                debug!(topic = %topic, "Publish abandoned while waiting for the request channel");
                Err(TransferError::PublishAbandoned(topic))
            }
        }
    }

    /// Stops the connection kernel. It sends DISCONNECT if connected and then
    /// exits; await the join handle from `build_and_start` to observe that.
    pub fn shutdown(&self) {
        info!("Stopping MQTT connection");
        self.connection_cancel.cancel();
    }
}

pub fn qos_from_u8(qos: u8) -> Result<QoS, TransferError> {
    match qos {
        0 => Ok(QoS::AtMostOnce),
        1 => Ok(QoS::AtLeastOnce),
        2 => Ok(QoS::ExactlyOnce),
        other => Err(TransferError::InvalidQos(other)),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn unreachable_config() -> Config {
        Config {
            host: "127.0.0.1".into(),
            port: 1,
            client_id: "manager-test".into(),
            connect_retry_delay_ms: 100,
            ..Default::default()
        }
    }

    #[test]
    fn test_qos_conversion() {
        assert_eq!(qos_from_u8(0).unwrap(), QoS::AtMostOnce);
        assert_eq!(qos_from_u8(1).unwrap(), QoS::AtLeastOnce);
        assert_eq!(qos_from_u8(2).unwrap(), QoS::ExactlyOnce);
        assert!(matches!(qos_from_u8(3), Err(TransferError::InvalidQos(3))));
    }

    #[tokio::test]
    async fn test_build_and_start_invalid_config() {
        let config = Config {
            keep_alive: 0,
            ..Default::default()
        };
        let result = MqttManager::from_config(config).unwrap().build_and_start();
        assert!(matches!(result, Err(TransferError::ConfigError(_))));
    }

    #[tokio::test]
    async fn test_state_receiver_reports_not_connected() {
        let (instance, handle) = MqttManager::from_config(unreachable_config())
            .unwrap()
            .build_and_start()
            .unwrap();
        assert!(!instance.state_receiver().borrow().is_connected());

        instance.shutdown();
        let result = tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("kernel did not stop")
            .expect("kernel panicked");
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_publish_rejects_invalid_qos() {
        let (instance, handle) = MqttManager::from_config(unreachable_config())
            .unwrap()
            .build_and_start()
            .unwrap();

        let err = instance
            .publish("thermobee/test", 7, b"{}".to_vec(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, TransferError::InvalidQos(7)));

        instance.shutdown();
        let _ = tokio::time::timeout(Duration::from_secs(5), handle).await;
    }

    #[tokio::test]
    async fn test_cancel_releases_publishes_blocked_on_full_channel() {
        let config = Config {
            request_channel_capacity: 1,
            ..unreachable_config()
        };
        let (instance, handle) = MqttManager::from_config(config)
            .unwrap()
            .build_and_start()
            .unwrap();
        let cancel = CancellationToken::new();

        // Nothing drains the channel while the broker is unreachable.
        let publishes: Vec<_> = (0..3)
            .map(|i| {
                let instance = instance.clone();
                let cancel = cancel.clone();
                tokio::spawn(async move {
                    instance
                        .publish(format!("thermobee/{i}"), 1, b"{}".to_vec(), &cancel)
                        .await
                })
            })
            .collect();

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(publishes.iter().any(|p| !p.is_finished()));

        cancel.cancel();
        let mut abandoned = 0;
        for publish in publishes {
            let result = tokio::time::timeout(Duration::from_secs(5), publish)
                .await
                .expect("publish still blocked after cancel")
                .expect("publish task panicked");
            if matches!(result, Err(TransferError::PublishAbandoned(_))) {
                abandoned += 1;
            }
        }
        assert!(abandoned >= 1);

        instance.shutdown();
        let _ = tokio::time::timeout(Duration::from_secs(5), handle).await;
    }
}
