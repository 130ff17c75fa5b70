//! `THERMOBEE_*` environment overrides.
//!
//! | Variable                              | Target                               |
//! |---------------------------------------|--------------------------------------|
//! | `THERMOBEE_SERVER_URL`                | `transport.host/port/tls`            |
//! | `THERMOBEE_CA_FILE`                   | `transport.tls.ca_cert_path`         |
//! | `THERMOBEE_CLIENT_ID`                 | `transport.client_id`                |
//! | `THERMOBEE_USERNAME`                  | `transport.username`                 |
//! | `THERMOBEE_PASSWORD`                  | `transport.password`                 |
//! | `THERMOBEE_TOPIC`                     | `sensors.topic`                      |
//! | `THERMOBEE_QOS`                       | `sensors.qos`                        |
//! | `THERMOBEE_KEEP_ALIVE` (s)            | `transport.keep_alive`               |
//! | `THERMOBEE_CONNECT_RETRY_DELAY` (ms)  | `transport.connect_retry_delay_ms`   |
//! | `THERMOBEE_DELAY_BETWEEN_MESSAGES` (ms)| `sensors.interval_ms`               |
//! | `THERMOBEE_PRINT_MESSAGES`            | `sensors.print_messages`             |
//! | `THERMOBEE_DEBUG`                     | `logger.debug`                       |
//!
//! Unset variables leave the file value alone. A variable that is set but
//! blank, or that does not parse, is an error.

use std::str::FromStr;

use thermobee_mqtt::TlsConfig;
use url::Url;

use super::{Config, ConfigError};

pub const SERVER_URL: &str = "THERMOBEE_SERVER_URL";
pub const CA_FILE: &str = "THERMOBEE_CA_FILE";
pub const CLIENT_ID: &str = "THERMOBEE_CLIENT_ID";
pub const USERNAME: &str = "THERMOBEE_USERNAME";
pub const PASSWORD: &str = "THERMOBEE_PASSWORD";
pub const TOPIC: &str = "THERMOBEE_TOPIC";
pub const QOS: &str = "THERMOBEE_QOS";
pub const KEEP_ALIVE: &str = "THERMOBEE_KEEP_ALIVE";
pub const CONNECT_RETRY_DELAY: &str = "THERMOBEE_CONNECT_RETRY_DELAY";
pub const DELAY_BETWEEN_MESSAGES: &str = "THERMOBEE_DELAY_BETWEEN_MESSAGES";
pub const PRINT_MESSAGES: &str = "THERMOBEE_PRINT_MESSAGES";
pub const DEBUG: &str = "THERMOBEE_DEBUG";

/// Typed access to an environment lookup.
struct EnvReader<'a, F> {
    lookup: &'a F,
}

impl<F> EnvReader<'_, F>
where
    F: Fn(&str) -> Option<String>,
{
    fn string(&self, key: &'static str) -> Result<Option<String>, ConfigError> {
        match (self.lookup)(key) {
            None => Ok(None),
            Some(value) if value.trim().is_empty() => Err(env_error(key, "must not be blank")),
            Some(value) => Ok(Some(value)),
        }
    }

    fn integer<T: FromStr>(&self, key: &'static str) -> Result<Option<T>, ConfigError> {
        self.string(key)?
            .map(|value| {
                value
                    .trim()
                    .parse::<T>()
                    .map_err(|_| env_error(key, format!("must be a non-negative integer (is {value})")))
            })
            .transpose()
    }

    fn boolean(&self, key: &'static str) -> Result<Option<bool>, ConfigError> {
        self.string(key)?
            .map(|value| parse_bool(&value).ok_or_else(|| {
                env_error(key, format!("must be a valid boolean option (is {value})"))
            }))
            .transpose()
    }
}

fn env_error(key: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Environment {
        key,
        reason: reason.into(),
    }
}

/// `true/t/1` and `false/f/0`, case-insensitive.
fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_uppercase().as_str() {
        "TRUE" | "T" | "1" => Some(true),
        "FALSE" | "F" | "0" => Some(false),
        _ => None,
    }
}

impl Config {
    /// Overlays every `THERMOBEE_*` variable returned by `lookup`.
    pub fn apply_env<F>(&mut self, lookup: &F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = EnvReader { lookup };

        if let Some(ca) = env.string(CA_FILE)? {
            self.transport
                .tls
                .get_or_insert_with(TlsConfig::default)
                .ca_cert_path = Some(ca);
        }
        if let Some(url) = env.string(SERVER_URL)? {
            self.apply_server_url(&url)?;
        }

        if let Some(client_id) = env.string(CLIENT_ID)? {
            self.transport.client_id = client_id;
        }
        if let Some(username) = env.string(USERNAME)? {
            self.transport.username = Some(username);
        }
        if let Some(password) = env.string(PASSWORD)? {
            self.transport.password = Some(password);
        }
        if let Some(keep_alive) = env.integer(KEEP_ALIVE)? {
            self.transport.keep_alive = keep_alive;
        }
        if let Some(delay) = env.integer(CONNECT_RETRY_DELAY)? {
            self.transport.connect_retry_delay_ms = delay;
        }

        if let Some(topic) = env.string(TOPIC)? {
            self.sensors.topic = topic;
        }
        if let Some(qos) = env.integer(QOS)? {
            self.sensors.qos = qos;
        }
        if let Some(interval) = env.integer(DELAY_BETWEEN_MESSAGES)? {
            self.sensors.interval_ms = interval;
        }
        if let Some(print) = env.boolean(PRINT_MESSAGES)? {
            self.sensors.print_messages = print;
        }

        if let Some(debug) = env.boolean(DEBUG)? {
            self.logger.debug = debug;
        }

        Ok(())
    }

    /// `mqtt://` and `tcp://` select plain TCP (default port 1883);
    /// `mqtts://`, `ssl://` and `tls://` select TLS (default port 8883) and
    /// need a CA file. Credentials embedded in the URL are honored.
    fn apply_server_url(&mut self, raw: &str) -> Result<(), ConfigError> {
        let url = Url::parse(raw.trim())
            .map_err(|e| env_error(SERVER_URL, format!("must be a valid URL ({e})")))?;

        let tls = match url.scheme() {
            "mqtt" | "tcp" => false,
            "mqtts" | "ssl" | "tls" => true,
            other => return Err(env_error(SERVER_URL, format!("has unsupported scheme '{other}'"))),
        };

        let host = url
            .host_str()
            .map(|h| h.trim_matches(&['[', ']'][..]))
            .filter(|h| !h.is_empty())
            .ok_or_else(|| env_error(SERVER_URL, "must include a host"))?;

        let transport = &mut self.transport;
        transport.host = host.to_string();
        transport.port = url.port().unwrap_or(if tls { 8883 } else { 1883 });

        if !url.username().is_empty() {
            transport.username = Some(url.username().to_string());
            transport.password = url.password().map(str::to_string);
        }

        if tls {
            if !transport.tls_enabled() {
                return Err(env_error(
                    SERVER_URL,
                    format!("uses TLS but no CA file is configured (set {CA_FILE})"),
                ));
            }
        } else {
            transport.tls = None;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn apply(pairs: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let map: HashMap<&str, &str> = pairs.iter().copied().collect();
        let lookup = |key: &str| map.get(key).map(|v| v.to_string());
        let mut config = Config::default();
        config.apply_env(&lookup)?;
        Ok(config)
    }

    #[test]
    fn test_no_variables_keeps_defaults() {
        let config = apply(&[]).unwrap();
        assert_eq!(config.sensors, Config::default().sensors);
        assert_eq!(config.transport, Config::default().transport);
    }

    #[test]
    fn test_full_override() {
        let config = apply(&[
            (SERVER_URL, "mqtt://broker.local:1884"),
            (CLIENT_ID, "attic"),
            (USERNAME, "bee"),
            (PASSWORD, "hive"),
            (TOPIC, "house/attic"),
            (QOS, "2"),
            (KEEP_ALIVE, "60"),
            (CONNECT_RETRY_DELAY, "2500"),
            (DELAY_BETWEEN_MESSAGES, "30000"),
            (PRINT_MESSAGES, "true"),
            (DEBUG, "f"),
        ])
        .unwrap();

        assert_eq!(config.transport.host, "broker.local");
        assert_eq!(config.transport.port, 1884);
        assert_eq!(config.transport.client_id, "attic");
        assert_eq!(config.transport.username.as_deref(), Some("bee"));
        assert_eq!(config.transport.password.as_deref(), Some("hive"));
        assert_eq!(config.transport.keep_alive, 60);
        assert_eq!(config.transport.connect_retry_delay_ms, 2500);
        assert_eq!(config.sensors.topic, "house/attic");
        assert_eq!(config.sensors.qos, 2);
        assert_eq!(config.sensors.interval_ms, 30_000);
        assert!(config.sensors.print_messages);
        assert!(!config.logger.debug);
    }

    #[test]
    fn test_blank_value_rejected() {
        let err = apply(&[(TOPIC, "  ")]).unwrap_err();
        assert!(matches!(err, ConfigError::Environment { key: TOPIC, .. }));
        assert!(err.to_string().contains("must not be blank"));
    }

    #[test]
    fn test_non_integer_rejected() {
        let err = apply(&[(DELAY_BETWEEN_MESSAGES, "10s")]).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Environment {
                key: DELAY_BETWEEN_MESSAGES,
                ..
            }
        ));
        assert!(apply(&[(QOS, "-1")]).is_err());
    }

    #[test]
    fn test_boolean_spellings() {
        for (raw, expected) in [("TRUE", true), ("t", true), ("1", true), ("False", false), ("F", false), ("0", false)] {
            let config = apply(&[(PRINT_MESSAGES, raw)]).unwrap();
            assert_eq!(config.sensors.print_messages, expected, "value {raw}");
        }
        assert!(apply(&[(DEBUG, "yes")]).is_err());
    }

    #[test]
    fn test_url_default_ports() {
        let config = apply(&[(SERVER_URL, "tcp://10.0.0.5")]).unwrap();
        assert_eq!(config.transport.host, "10.0.0.5");
        assert_eq!(config.transport.port, 1883);
        assert!(config.transport.tls.is_none());
    }

    #[test]
    fn test_tls_url_with_ca_file() {
        let config = apply(&[
            (SERVER_URL, "mqtts://broker.example.com"),
            (CA_FILE, "/etc/thermobee/ca.pem"),
        ])
        .unwrap();
        assert_eq!(config.transport.port, 8883);
        assert!(config.transport.tls_enabled());
        assert_eq!(
            config.transport.tls.and_then(|t| t.ca_cert_path).as_deref(),
            Some("/etc/thermobee/ca.pem")
        );
    }

    #[test]
    fn test_tls_url_without_ca_file() {
        let err = apply(&[(SERVER_URL, "ssl://broker.example.com:8884")]).unwrap_err();
        assert!(err.to_string().contains(CA_FILE));
    }

    #[test]
    fn test_url_credentials_and_ipv6() {
        let config = apply(&[(SERVER_URL, "mqtt://bee:hive@[::1]:1884")]).unwrap();
        assert_eq!(config.transport.host, "::1");
        assert_eq!(config.transport.username.as_deref(), Some("bee"));
        assert_eq!(config.transport.password.as_deref(), Some("hive"));
    }

    #[test]
    fn test_bad_url_rejected() {
        assert!(apply(&[(SERVER_URL, "not a url")]).is_err());
        assert!(apply(&[(SERVER_URL, "http://broker.local")]).is_err());
    }
}
