//! Auto-reconnecting MQTT connection for thermobee.
//!
//! A thin layer over `rumqttc`:
//!
//! - [`Config`] / [`TlsConfig`]: validated broker settings
//! - [`ClientBuilder`]: turns settings into a client and event loop
//! - [`ConnectionKernel`]: polls the event loop, retries with a fixed delay,
//!   broadcasts [`ConnectionState`]
//! - [`MqttManager`] / [`MqttInstance`]: startup and the handle used by
//!   publishers
//!
//! All fallible operations return [`TransferError`].

mod client;
mod config;
mod connection;
mod error;
mod manager;
mod state;

pub use client::ClientBuilder;
pub use config::{Config, TlsConfig};
pub use connection::ConnectionKernel;
pub use error::TransferError;
pub use manager::{qos_from_u8, MqttInstance, MqttManager};
pub use state::ConnectionState;

pub use rumqttc::QoS;
