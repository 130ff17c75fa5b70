//! Broker connection settings.
//!
//! Everything here deserializes with `serde` (missing keys fall back to
//! [`Config::default`]) and is checked with `validator` before a client is
//! built, so a bad value fails at startup rather than at connect time.
//!
//! # Examples
//!
//! ```toml
//! host = "mqtt.home.local"
//! port = 8883
//! client_id = "thermobee-attic"
//! keep_alive = 30
//! connect_retry_delay_ms = 10000
//!
//! [tls]
//! ca_cert_path = "/etc/thermobee/ca.pem"
//! ```

use std::{path::Path, time::Duration};

use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

/// Connection settings for a single broker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct Config {
    /// Broker hostname or IP address. DNS resolution happens at connect time.
    #[validate(length(
        min = 1,
        max = 255,
        message = "Host must be between 1 and 255 characters"
    ))]
    pub host: String,

    /// Broker port; 1883 for plain TCP, 8883 for TLS.
    #[validate(range(min = 1, max = 65535, message = "Port must be between 1 and 65535"))]
    pub port: u16,

    /// Client identifier presented in CONNECT.
    ///
    /// Left empty, a random UUID is generated when the client is built.
    #[validate(length(max = 36, message = "Client ID must not exceed 36 characters"))]
    pub client_id: String,

    /// Optional username sent in CONNECT. Pair with TLS in production.
    pub username: Option<String>,

    /// Optional password sent in CONNECT. Ignored without a username.
    pub password: Option<String>,

    /// Keep-alive interval in seconds.
    #[validate(range(
        min = 5,
        max = 3600,
        message = "Keep alive must be between 5 and 3600 seconds"
    ))]
    pub keep_alive: u64,

    /// Fixed delay between connection attempts, in milliseconds.
    #[validate(range(
        min = 100,
        max = 3_600_000,
        message = "Connect retry delay must be between 100 ms and 1 hour"
    ))]
    pub connect_retry_delay_ms: u64,

    /// Request a clean session from the broker.
    pub clean_session: bool,

    /// Maximum QoS 1/2 publishes awaiting acknowledgement.
    #[validate(range(
        min = 1,
        max = 1000,
        message = "Max inflight must be between 1 and 1000"
    ))]
    pub max_inflight: u16,

    /// How many requests may be queued on the client before `publish` waits.
    #[validate(range(
        min = 1,
        max = 1024,
        message = "Request channel capacity must be between 1 and 1024"
    ))]
    pub request_channel_capacity: usize,

    /// TLS settings. Absent, or present without a CA path, means plain TCP.
    #[validate(nested)]
    pub tls: Option<TlsConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            host: "localhost".to_string(),
            port: 1883,
            client_id: String::new(),
            username: None,
            password: None,
            keep_alive: 30,
            connect_retry_delay_ms: 10_000,
            clean_session: true,
            max_inflight: 100,
            request_channel_capacity: 64,
            tls: None,
        }
    }
}

impl Config {
    pub fn connect_retry_delay(&self) -> Duration {
        Duration::from_millis(self.connect_retry_delay_ms)
    }

    /// True when a TLS section with a CA certificate is configured.
    pub fn tls_enabled(&self) -> bool {
        self.tls.as_ref().is_some_and(TlsConfig::is_enabled)
    }
}

/// Certificate paths for a TLS connection.
///
/// Files are checked for existence during validation and read when the
/// client is built.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct TlsConfig {
    /// PEM file with the CA certificates trusted to sign the broker certificate.
    #[validate(custom(
        function = "validate_file_path",
        message = "CA certificate file does not exist"
    ))]
    pub ca_cert_path: Option<String>,

    /// PEM client certificate for mutual TLS. Requires `client_key_path`.
    #[validate(custom(
        function = "validate_file_path",
        message = "Client certificate file does not exist"
    ))]
    pub client_cert_path: Option<String>,

    /// PEM private key matching `client_cert_path`, unencrypted.
    #[validate(custom(
        function = "validate_file_path",
        message = "Client key file does not exist"
    ))]
    pub client_key_path: Option<String>,
}

impl TlsConfig {
    /// True only when both client certificate and key are set.
    pub fn has_client_auth(&self) -> bool {
        self.client_cert_path.is_some() && self.client_key_path.is_some()
    }

    pub fn is_enabled(&self) -> bool {
        self.ca_cert_path.is_some()
    }

    /// Checks the combination of paths, not just each path on its own.
    ///
    /// A CA path is mandatory and a half-configured client identity
    /// (certificate without key or the reverse) is rejected.
    pub fn validate_config(&self) -> Result<(), ValidationError> {
        let Some(ca) = self.ca_cert_path.as_deref() else {
            return Err(ValidationError::new("missing_ca_cert")
                .with_message("CA certificate path is required".into()));
        };
        validate_file_path(ca)?;

        match (
            self.client_cert_path.as_deref(),
            self.client_key_path.as_deref(),
        ) {
            (Some(cert), Some(key)) => {
                validate_file_path(cert)?;
                validate_file_path(key)?;
                Ok(())
            }
            (None, None) => Ok(()),
            _ => Err(ValidationError::new("incomplete_client_auth").with_message(
                "Both client certificate and key must be provided or neither".into(),
            )),
        }
    }
}

/// Path must be non-empty and point at an existing regular file.
fn validate_file_path(path: &str) -> Result<(), ValidationError> {
    if path.is_empty() {
        return Err(
            ValidationError::new("empty_path").with_message("File path cannot be empty".into())
        );
    }

    let path_obj = Path::new(path);
    if !path_obj.exists() {
        return Err(ValidationError::new("file_not_found")
            .with_message(format!("File does not exist: {path}").into()));
    }
    if !path_obj.is_file() {
        return Err(ValidationError::new("not_a_file")
            .with_message(format!("Path is not a file: {path}").into()));
    }

    Ok(())
}
