//! Broker connection state as observed by the connection kernel.
//!
//! The kernel publishes every transition on a `watch` channel so that
//! publishers can hold back work until the link is usable again.

use std::{fmt, time::Duration};

/// Lifecycle of the broker connection.
///
/// ```text
/// Connecting -> Connected -> Disconnected -> Reconnecting -> Connecting -> ...
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionState {
    /// CONNECT sent, waiting for CONNACK.
    Connecting,

    /// CONNACK accepted; publishes will reach the broker.
    Connected,

    /// The link dropped. Carries the reason reported by the event loop or broker.
    Disconnected(String),

    /// Waiting out the retry delay before the next connection attempt.
    Reconnecting(Duration),
}

impl ConnectionState {
    /// Short identifier without details, suitable for structured log fields.
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Connecting => "Connecting",
            ConnectionState::Connected => "Connected",
            ConnectionState::Disconnected(_) => "Disconnected",
            ConnectionState::Reconnecting(_) => "Reconnecting",
        }
    }

    /// True only for [`ConnectionState::Connected`].
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Disconnected(reason) => write!(f, "Disconnected ({reason})"),
            ConnectionState::Reconnecting(delay) => {
                write!(f, "Reconnecting (in {:.1}s)", delay.as_secs_f64())
            }
            other => f.write_str(other.as_str()),
        }
    }
}
