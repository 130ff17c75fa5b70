//! Error type shared by every operation of the connection manager.

use thiserror::Error;

/// Failures raised while configuring, driving, or using the broker connection.
#[derive(Debug, Error)]
pub enum TransferError {
    /// The client could not be assembled (bad TLS material, missing CA, ...).
    /// Raised at startup; the caller is expected to fail fast.
    #[error("Client setup error: {0}")]
    ClientSetup(String),

    /// Settings rejected by `validator`.
    #[error("Configuration error: {0}")]
    ConfigError(#[from] validator::ValidationErrors),

    /// QoS outside 0..=2.
    #[error("Invalid QoS value {0}, must be 0, 1, or 2")]
    InvalidQos(u8),

    /// The request could not be queued on the client (event loop gone, channel closed).
    #[error("Client transfer error: {0}")]
    ClientTransfer(#[from] rumqttc::ClientError),

    /// Unrecoverable event loop failure. Boxed because `ConnectionError` is large.
    #[error("Client connection error: {0}")]
    ClientConnection(#[from] Box<rumqttc::ConnectionError>),

    /// Shutdown fired while the request was still waiting to be queued.
    #[error("Publish to {0} abandoned: shutdown requested")]
    PublishAbandoned(String),

    /// Reading TLS material from disk failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<rumqttc::ConnectionError> for TransferError {
    fn from(err: rumqttc::ConnectionError) -> Self {
        TransferError::ClientConnection(Box::new(err))
    }
}
