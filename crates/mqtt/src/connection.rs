//! The connection kernel: the one task that polls the rumqttc event loop.
//!
//! rumqttc reconnects on the next `poll` after an error, so the kernel's job
//! is deciding whether an error is worth another attempt, waiting out the
//! configured retry delay, and broadcasting every state transition on a
//! `watch` channel for publishers to gate on.
//!
//! ```text
//! Scheduler / publish tasks ──(AsyncClient)──┐
//!                                            ▼
//!                  ConnectionKernel ── poll ── EventLoop ── TCP/TLS ── broker
//!                         │
//!                         └── watch<ConnectionState> ──► ConnectionGate
//! ```

use std::time::Duration;

use rumqttc::{
    AsyncClient, ConnectReturnCode, ConnectionError, Event, EventLoop, Outgoing, Packet,
};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use super::{error::TransferError, state::ConnectionState};

/// Upper bound on flushing the DISCONNECT packet during shutdown.
const DISCONNECT_FLUSH_TIMEOUT: Duration = Duration::from_secs(1);

/// Drives the event loop until cancelled or a fatal error occurs.
///
/// Runs on a single tokio task. Transient failures are retried forever
/// with a fixed delay; fatal ones (bad credentials, broken TLS setup) end
/// the kernel with an error.
pub struct ConnectionKernel {
    client: AsyncClient,
    event_loop: EventLoop,
    retry_delay: Duration,
    cancel: CancellationToken,
    state_tx: watch::Sender<ConnectionState>,
}

impl ConnectionKernel {
    pub fn new(
        client: AsyncClient,
        event_loop: EventLoop,
        retry_delay: Duration,
        cancel: CancellationToken,
    ) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Connecting);
        Self {
            client,
            event_loop,
            retry_delay,
            cancel,
            state_tx,
        }
    }

    /// New receiver observing the current state immediately.
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    /// Broadcasts `state` if it differs from the current one.
    fn update_state(&self, state: ConnectionState) {
        let changed = self.state_tx.send_if_modified(|current| {
            if *current == state {
                false
            } else {
                *current = state.clone();
                true
            }
        });

        if changed {
            info!(state = %state, "Connection state changed");
        }
    }

    /// Main loop. Returns `Ok(())` after a cancellation-triggered shutdown or
    /// when every client handle is gone, `Err` on a fatal connection error.
    pub async fn run(mut self) -> Result<(), TransferError> {
        self.update_state(ConnectionState::Connecting);
        info!("Starting connection event loop");

        loop {
            tokio::select! {
                biased;

                _ = self.cancel.cancelled() => {
                    info!("Shutdown requested, disconnecting from broker");
                    self.disconnect().await;
                    self.update_state(ConnectionState::Disconnected("shutdown".into()));
                    info!("Connection kernel stopped");
                    return Ok(());
                }

                event = self.event_loop.poll() => match event {
                    Ok(event) => self.handle_event(event),
                    Err(ConnectionError::RequestsDone) => {
                        info!("All client handles dropped, stopping connection kernel");
                        self.update_state(ConnectionState::Disconnected("client dropped".into()));
                        return Ok(());
                    }
                    Err(e) if is_fatal_error(&e) => {
                        error!(error = %root_cause(&e), "Fatal connection error, giving up");
                        self.update_state(ConnectionState::Disconnected(e.to_string()));
                        return Err(TransferError::from(e));
                    }
                    Err(e) => {
                        let reason = root_cause(&e);
                        warn!(
                            error = %reason,
                            retry_in_secs = self.retry_delay.as_secs_f64(),
                            "Connection lost, will retry"
                        );
                        self.update_state(ConnectionState::Disconnected(reason));
                        self.update_state(ConnectionState::Reconnecting(self.retry_delay));

                        tokio::select! {
                            _ = self.cancel.cancelled() => {}
                            _ = tokio::time::sleep(self.retry_delay) => {
                                self.update_state(ConnectionState::Connecting);
                            }
                        }
                    }
                },
            }
        }
    }

    fn handle_event(&self, event: Event) {
        match event {
            Event::Incoming(Packet::ConnAck(ack)) => {
                if ack.code == ConnectReturnCode::Success {
                    info!(session_present = ack.session_present, "Connected to broker");
                    self.update_state(ConnectionState::Connected);
                }
            }
            Event::Incoming(Packet::Disconnect) => {
                warn!("Disconnected by broker");
                self.update_state(ConnectionState::Disconnected(
                    "Disconnected by broker".into(),
                ));
            }
            Event::Incoming(Packet::PubAck(ack)) => {
                trace!(pkid = ack.pkid, "PUBACK received");
            }
            Event::Incoming(packet) => {
                trace!(?packet, "Incoming packet");
            }
            Event::Outgoing(outgoing) => {
                trace!(?outgoing, "Outgoing packet");
            }
        }
    }

    /// Best effort: queue DISCONNECT and keep polling briefly so it
    /// actually reaches the socket.
    async fn disconnect(&mut self) {
        if !self.state_tx.borrow().is_connected() {
            return;
        }

        if let Err(e) = self.client.try_disconnect() {
            warn!(error = %e, "Error queueing disconnect packet");
            return;
        }

        let flushed = tokio::time::timeout(DISCONNECT_FLUSH_TIMEOUT, async {
            loop {
                match self.event_loop.poll().await {
                    Ok(Event::Outgoing(Outgoing::Disconnect)) => break,
                    Ok(_) => continue,
                    Err(e) => {
                        debug!(error = %e, "Event loop closed while disconnecting");
                        break;
                    }
                }
            }
        })
        .await;

        if flushed.is_err() {
            warn!("Timed out flushing disconnect packet");
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Disposition {
    Fatal,
    Reconnect,
}

fn classify_connection_error(err: &ConnectionError) -> Disposition {
    use Disposition::*;

    match err {
        // Invalid certificates or incompatible crypto setup.
        ConnectionError::Tls(_) => Fatal,

        ConnectionError::Io(e) => match e.kind() {
            std::io::ErrorKind::PermissionDenied | std::io::ErrorKind::InvalidInput => Fatal,
            _ => Reconnect,
        },

        ConnectionError::ConnectionRefused(code) => match code {
            ConnectReturnCode::RefusedProtocolVersion
            | ConnectReturnCode::BadClientId
            | ConnectReturnCode::BadUserNamePassword
            | ConnectReturnCode::NotAuthorized => Fatal,
            _ => Reconnect,
        },

        // Protocol state errors (unsolicited acks, broker hiccups) are
        // cleared by a fresh session.
        ConnectionError::MqttState(_)
        | ConnectionError::NotConnAck(_)
        | ConnectionError::NetworkTimeout
        | ConnectionError::FlushTimeout => Reconnect,

        #[allow(unreachable_patterns)]
        _ => Reconnect,
    }
}

fn is_fatal_error(err: &ConnectionError) -> bool {
    matches!(classify_connection_error(err), Disposition::Fatal)
}

/// Innermost message of an error chain, without surrounding quotes.
fn root_cause(e: &dyn std::error::Error) -> String {
    let mut current = e;
    while let Some(source) = current.source() {
        current = source;
    }
    current.to_string().trim_matches('"').to_string()
}
