//! Holds each sampling round until the broker connection is up.

use std::time::Duration;

use thermobee_mqtt::ConnectionState;
use tokio::{sync::watch, time::sleep};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::error::TelemetryError;

/// How often a long wait is re-announced at WARN.
pub const DEFAULT_REMINDER: Duration = Duration::from_secs(30);

/// Blocks until a live broker connection exists.
#[async_trait::async_trait]
pub trait ConnectionGate: Send + Sync {
    /// Returns `Ok(())` once connected. Fails with
    /// [`TelemetryError::ConnectionUnavailable`] only when `cancel` fires or
    /// the connection can never come back.
    async fn await_connection(&self, cancel: &CancellationToken) -> Result<(), TelemetryError>;
}

/// Gate backed by the connection kernel's state channel.
#[derive(Debug, Clone)]
pub struct StateGate {
    state_rx: watch::Receiver<ConnectionState>,
    reminder: Duration,
}

impl StateGate {
    pub fn new(state_rx: watch::Receiver<ConnectionState>) -> Self {
        Self {
            state_rx,
            reminder: DEFAULT_REMINDER,
        }
    }

    pub fn with_reminder(mut self, reminder: Duration) -> Self {
        self.reminder = reminder;
        self
    }
}

#[async_trait::async_trait]
impl ConnectionGate for StateGate {
    async fn await_connection(&self, cancel: &CancellationToken) -> Result<(), TelemetryError> {
        if cancel.is_cancelled() {
            return Err(TelemetryError::ConnectionUnavailable);
        }

        let mut rx = self.state_rx.clone();
        if rx.borrow_and_update().is_connected() {
            return Ok(());
        }

        warn!(state = %*rx.borrow(), "Waiting for broker connection");
        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    info!("Stopped waiting for broker connection: shutdown requested");
                    return Err(TelemetryError::ConnectionUnavailable);
                }
                changed = rx.changed() => {
                    if changed.is_err() {
                        warn!("Connection kernel stopped while waiting for broker connection");
                        return Err(TelemetryError::ConnectionUnavailable);
                    }
                    let state = rx.borrow_and_update().clone();
                    if state.is_connected() {
                        info!("Broker connection available");
                        return Ok(());
                    }
                    debug!(state = %state, "Still not connected");
                }
                _ = sleep(self.reminder) => {
                    warn!(state = %*rx.borrow(), "Still waiting for broker connection");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tracing::Instrument;
    use tracing_test::traced_test;

    use super::*;

    #[tokio::test]
    async fn test_passes_immediately_when_connected() {
        let (_tx, rx) = watch::channel(ConnectionState::Connected);
        let gate = StateGate::new(rx);
        assert!(gate.await_connection(&CancellationToken::new()).await.is_ok());
    }

    #[tokio::test]
    async fn test_cancelled_token_fails_even_when_connected() {
        let (_tx, rx) = watch::channel(ConnectionState::Connected);
        let cancel = CancellationToken::new();
        cancel.cancel();
        assert!(matches!(
            StateGate::new(rx).await_connection(&cancel).await,
            Err(TelemetryError::ConnectionUnavailable)
        ));
    }

    #[tokio::test(start_paused = true)]
    #[traced_test]
    async fn test_waits_for_connected() {
        let (tx, rx) = watch::channel(ConnectionState::Connecting);
        let gate = Arc::new(StateGate::new(rx).with_reminder(Duration::from_secs(5)));
        let cancel = CancellationToken::new();

        let waiter = {
            let gate = gate.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { gate.await_connection(&cancel).await }.in_current_span())
        };

        sleep(Duration::from_secs(6)).await;
        tx.send(ConnectionState::Reconnecting(Duration::from_secs(1)))
            .unwrap();
        sleep(Duration::from_millis(10)).await;
        assert!(!waiter.is_finished());

        tx.send(ConnectionState::Connected).unwrap();
        assert!(waiter.await.unwrap().is_ok());
        assert!(logs_contain("Still waiting for broker connection"));
        assert!(logs_contain("Broker connection available"));
    }

    #[tokio::test]
    async fn test_cancel_while_waiting() {
        let (_tx, rx) = watch::channel(ConnectionState::Disconnected("eof".into()));
        let gate = StateGate::new(rx);
        let cancel = CancellationToken::new();

        let waiter = {
            let cancel = cancel.clone();
            tokio::spawn(async move { gate.await_connection(&cancel).await })
        };
        cancel.cancel();

        assert!(matches!(
            waiter.await.unwrap(),
            Err(TelemetryError::ConnectionUnavailable)
        ));
    }

    #[tokio::test]
    async fn test_kernel_gone() {
        let (tx, rx) = watch::channel(ConnectionState::Connecting);
        drop(tx);
        assert!(matches!(
            StateGate::new(rx)
                .await_connection(&CancellationToken::new())
                .await,
            Err(TelemetryError::ConnectionUnavailable)
        ));
    }
}
