//! Construction of the rumqttc client/event-loop pair.
//!
//! `ClientBuilder` turns a validated [`Config`] into `MqttOptions`, picks the
//! transport (plain TCP or TLS from PEM files on disk) and finally splits into
//! an `AsyncClient` for issuing requests and an `EventLoop` that must be
//! polled by exactly one task.
//!
//! ```ignore
//! let (client, event_loop) = ClientBuilder::from_config(&config)?.build()?;
//! ```

use std::{fs, time::Duration};

use rumqttc::{AsyncClient, EventLoop, MqttOptions, TlsConfiguration, Transport};
use tracing::debug;
use validator::Validate;

use super::{
    config::{Config, TlsConfig},
    error::TransferError,
};

/// Accumulates client options and builds the client when asked.
///
/// The returned `AsyncClient` is cheap to clone and safe to share between
/// tasks. The `EventLoop` is not; hand it to a single
/// [`ConnectionKernel`](crate::ConnectionKernel).
pub struct ClientBuilder {
    opts: MqttOptions,

    /// Capacity of the request channel between client and event loop.
    cap: usize,

    tls_config: Option<TlsConfig>,
}

impl ClientBuilder {
    /// Builder for a validated configuration.
    ///
    /// Fails with [`TransferError::ConfigError`] when validation rejects the
    /// settings. An empty `client_id` is replaced by a random UUID.
    pub fn from_config(config: &Config) -> Result<Self, TransferError> {
        config.validate()?;

        let client_id = if config.client_id.is_empty() {
            uuid::Uuid::new_v4().to_string()
        } else {
            config.client_id.clone()
        };
        debug!(client_id = %client_id, host = %config.host, port = config.port, "Preparing MQTT client");

        let mut opts = MqttOptions::new(client_id, config.host.clone(), config.port);
        opts.set_keep_alive(Duration::from_secs(config.keep_alive));
        opts.set_clean_session(config.clean_session);
        opts.set_inflight(config.max_inflight);

        if let Some(username) = &config.username {
            opts.set_credentials(
                username.clone(),
                config.password.clone().unwrap_or_default(),
            );
        }

        let tls_config = config.tls.clone().filter(TlsConfig::is_enabled);

        Ok(Self {
            opts,
            cap: config.request_channel_capacity,
            tls_config,
        })
    }

    /// Reads the PEM material and assembles a rustls transport.
    fn build_tls_transport(tls_config: &TlsConfig) -> Result<Transport, TransferError> {
        tls_config
            .validate_config()
            .map_err(|e| TransferError::ClientSetup(format!("Invalid TLS configuration: {e}")))?;
        debug!(client_auth = tls_config.has_client_auth(), "Building TLS transport");

        let ca_path = tls_config
            .ca_cert_path
            .as_deref()
            .ok_or_else(|| TransferError::ClientSetup("CA certificate path is not set".into()))?;
        let ca = fs::read(ca_path)?;

        let client_auth = match (
            tls_config.client_cert_path.as_deref(),
            tls_config.client_key_path.as_deref(),
        ) {
            (Some(cert), Some(key)) => Some((fs::read(cert)?, fs::read(key)?)),
            _ => None,
        };

        Ok(Transport::Tls(TlsConfiguration::Simple {
            ca,
            client_auth,
            alpn: None,
        }))
    }

    /// Consumes the builder and returns the client and its event loop.
    ///
    /// Nothing touches the network here; the first connection attempt
    /// happens when the event loop is polled.
    pub fn build(self) -> Result<(AsyncClient, EventLoop), TransferError> {
        let mut opts = self.opts;
        if let Some(tls) = &self.tls_config {
            opts.set_transport(Self::build_tls_transport(tls)?);
        } else {
            opts.set_transport(Transport::Tcp);
        }

        Ok(AsyncClient::new(opts, self.cap))
    }
}

#[cfg(test)]
mod tests {
    use std::{fs::File, io::Write};

    use tempfile::TempDir;

    use super::*;

    struct TestFiles {
        _temp_dir: TempDir,
        ca_cert: String,
        client_cert: String,
        client_key: String,
    }

    impl TestFiles {
        fn new() -> std::io::Result<Self> {
            let temp_dir = TempDir::new()?;

            let ca_cert = temp_dir.path().join("ca.crt");
            let client_cert = temp_dir.path().join("client.crt");
            let client_key = temp_dir.path().join("client.key");

            File::create(&ca_cert)?.write_all(b"ca certificate content")?;
            File::create(&client_cert)?.write_all(b"client certificate content")?;
            File::create(&client_key)?.write_all(b"client key content")?;

            Ok(TestFiles {
                _temp_dir: temp_dir,
                ca_cert: ca_cert.to_string_lossy().into_owned(),
                client_cert: client_cert.to_string_lossy().into_owned(),
                client_key: client_key.to_string_lossy().into_owned(),
            })
        }
    }

    #[test]
    fn test_build_tcp_client() {
        let config = Config {
            client_id: "test_client".into(),
            keep_alive: 30,
            username: Some("user".into()),
            password: Some("pass".into()),
            request_channel_capacity: 10,
            ..Default::default()
        };
        let builder = ClientBuilder::from_config(&config).unwrap();
        assert_eq!(builder.opts.keep_alive(), Duration::from_secs(30));
        assert_eq!(
            builder.opts.credentials(),
            Some(("user".to_string(), "pass".to_string()))
        );
        assert!(builder.build().is_ok());
    }

    #[test]
    fn test_build_from_default_config_generates_client_id() {
        let builder = ClientBuilder::from_config(&Config::default()).unwrap();
        assert_eq!(builder.opts.client_id().len(), 36);
        assert!(builder.tls_config.is_none());
        assert!(builder.build().is_ok());
    }

    #[test]
    fn test_build_from_config_keeps_client_id() {
        let config = Config {
            client_id: "thermobee-test".into(),
            username: Some("bee".into()),
            ..Default::default()
        };
        let builder = ClientBuilder::from_config(&config).unwrap();
        assert_eq!(builder.opts.client_id(), "thermobee-test");
        assert_eq!(builder.cap, config.request_channel_capacity);
    }

    #[test]
    fn test_build_from_config_invalid() {
        let config = Config {
            host: String::new(),
            ..Default::default()
        };
        assert!(matches!(
            ClientBuilder::from_config(&config),
            Err(TransferError::ConfigError(_))
        ));
    }

    #[test]
    fn test_build_tls_client_with_client_auth() {
        let files = TestFiles::new().expect("Failed to create test files");
        let config = Config {
            port: 8883,
            tls: Some(TlsConfig {
                ca_cert_path: Some(files.ca_cert.clone()),
                client_cert_path: Some(files.client_cert.clone()),
                client_key_path: Some(files.client_key.clone()),
            }),
            ..Default::default()
        };

        let builder = ClientBuilder::from_config(&config).unwrap();
        assert!(builder.tls_config.is_some());
        assert!(builder.build().is_ok());
    }

    #[test]
    fn test_build_tls_client_ca_only() {
        let files = TestFiles::new().expect("Failed to create test files");
        let config = Config {
            port: 8883,
            tls: Some(TlsConfig {
                ca_cert_path: Some(files.ca_cert.clone()),
                client_cert_path: None,
                client_key_path: None,
            }),
            ..Default::default()
        };
        let builder = ClientBuilder::from_config(&config).unwrap();
        assert!(builder.build().is_ok());
    }

    #[test]
    fn test_build_tls_ca_removed_after_validation() {
        let files = TestFiles::new().expect("Failed to create test files");
        let config = Config {
            port: 8883,
            tls: Some(TlsConfig {
                ca_cert_path: Some(files.ca_cert.clone()),
                client_cert_path: None,
                client_key_path: None,
            }),
            ..Default::default()
        };
        let builder = ClientBuilder::from_config(&config).unwrap();
        drop(files);
        assert!(builder.build().is_err());
    }
}
