//! Application configuration loading, validation, and management.
//!
//! The top-level [`Config`] aggregates logging, sensor and broker settings.
//! It is resolved once at startup, in this order:
//!
//! 1. the TOML file named by `THERMOBEE_CONFIG`, else
//!    `/etc/thermobee/config.toml`, else built-in defaults;
//! 2. `THERMOBEE_*` environment overrides (see [`env`]);
//! 3. validation of the merged result.
//!
//! Any failure is fatal; the configuration is immutable afterwards.

use std::{
    fs,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use validator::Validate;

use self::{logger::LoggerConfig, sensors::SensorsConfig};

pub mod env;
pub mod logger;
pub mod sensors;

/// Broker connection settings, owned by the MQTT crate.
pub type TransportConfig = thermobee_mqtt::Config;

/// Environment variable naming the configuration file.
pub const CONFIG_PATH_ENV: &str = "THERMOBEE_CONFIG";

const DEFAULT_CONFIG_PATH: &str = "/etc/thermobee/config.toml";

/// Timestamped console output for use before the tracing subscriber exists.
#[macro_export]
macro_rules! print_info {
    ($($arg:tt)*) => {
        println!("{}  {} {}",
            console::style($crate::config::startup_timestamp()).dim(),
            console::style("INFO").green(),
            format_args!($($arg)*)
        );
    };
}

#[macro_export]
macro_rules! print_warn {
    ($($arg:tt)*) => {
        println!("{}  {} {}",
            console::style($crate::config::startup_timestamp()).dim(),
            console::style("WARN").yellow(),
            format_args!($($arg)*)
        );
    };
}

#[macro_export]
macro_rules! print_error {
    ($($arg:tt)*) => {
        eprintln!("{}  {} {}",
            console::style($crate::config::startup_timestamp()).dim(),
            console::style("ERROR").red(),
            format_args!($($arg)*)
        );
    };
}

#[doc(hidden)]
pub fn startup_timestamp() -> String {
    time::OffsetDateTime::now_utc()
        .format(time::macros::format_description!(
            "[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond digits:6]Z"
        ))
        .unwrap_or_default()
}

/// Errors that can occur during configuration loading, parsing, or validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error while reading configuration: {0}")]
    IoError(#[from] std::io::Error),

    /// Failure to parse the TOML configuration file.
    #[error("Parse error while reading configuration: {0}")]
    ParseError(String),

    /// Validation failure after parsing and environment overrides.
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// An environment override is blank or malformed.
    #[error("Environment variable {key} {reason}")]
    Environment { key: &'static str, reason: String },
}

/// Top-level application configuration.
#[derive(Serialize, Deserialize, Debug, Validate, Clone, Default)]
#[serde(default)]
pub struct Config {
    #[validate(nested)]
    pub logger: LoggerConfig,

    #[validate(nested)]
    pub sensors: SensorsConfig,

    #[validate(nested)]
    pub transport: TransportConfig,
}

impl Config {
    /// Resolves the configuration from the process environment.
    pub fn new() -> Result<Self, ConfigError> {
        Self::resolve(|key| std::env::var(key).ok())
    }

    /// Same as [`Config::new`] with an injectable environment.
    pub fn resolve<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = match Self::config_path(&lookup)? {
            Some(path) => Self::read(&path)?,
            None => {
                print_info!("No configuration file found, using defaults");
                Config::default()
            }
        };

        config.apply_env(&lookup)?;
        config.check()?;
        Ok(config)
    }

    /// Determines the configuration file path.
    ///
    /// An explicit `THERMOBEE_CONFIG` must exist; the default location is
    /// optional.
    fn config_path<F>(lookup: &F) -> Result<Option<PathBuf>, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(config_path) = lookup(CONFIG_PATH_ENV).filter(|p| !p.trim().is_empty()) {
            let path = PathBuf::from(config_path);
            if !path.exists() {
                return Err(ConfigError::Config(format!(
                    "{CONFIG_PATH_ENV} points to a missing file: {}",
                    path.display()
                )));
            }
            print_info!("Using config from {}: {}", CONFIG_PATH_ENV, path.display());
            return Ok(Some(path));
        }

        let fallback = Path::new(DEFAULT_CONFIG_PATH);
        if fallback.exists() {
            print_info!("Using default config path: {}", fallback.display());
            return Ok(Some(fallback.to_path_buf()));
        }

        Ok(None)
    }

    fn read(path: &Path) -> Result<Config, ConfigError> {
        print_info!("Loading configuration from: {}", path.display());
        let config_str = fs::read_to_string(path)?;
        Self::from_toml_str(&config_str)
    }

    /// Parses TOML; missing tables and keys take their defaults.
    pub fn from_toml_str(s: &str) -> Result<Config, ConfigError> {
        toml::from_str(s).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    fn check(&self) -> Result<(), ConfigError> {
        self.validate()
            .map_err(|e| ConfigError::ValidationError(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use std::{collections::HashMap, io::Write};

    use tempfile::NamedTempFile;

    use super::*;

    const SAMPLE: &str = r#"
        [logger]
        level = "warn"

        [sensors]
        topic = "house/attic"
        qos = 0
        interval_ms = 5000
        devices = ["28-3ce10457784c"]

        [transport]
        host = "broker.local"
        port = 1884
        client_id = "attic"
    "#;

    fn env_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    fn sample_file() -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_from_toml_str_partial() {
        let config = Config::from_toml_str(SAMPLE).unwrap();
        assert_eq!(config.logger.level, "warn");
        assert_eq!(config.sensors.topic, "house/attic");
        assert_eq!(config.sensors.read_timeout_secs, 60);
        assert_eq!(config.transport.host, "broker.local");
        assert_eq!(config.transport.keep_alive, 30);
    }

    #[test]
    fn test_from_toml_str_rejects_garbage() {
        assert!(matches!(
            Config::from_toml_str("[sensors\ntopic ="),
            Err(ConfigError::ParseError(_))
        ));
    }

    #[test]
    fn test_resolve_validates_file() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"[sensors]\nqos = 5\n").unwrap();
        let path = file.path().to_string_lossy().into_owned();
        assert!(matches!(
            Config::resolve(env_from(&[(CONFIG_PATH_ENV, path.as_str())])),
            Err(ConfigError::ValidationError(_))
        ));

        let file = sample_file();
        let path = file.path().to_string_lossy().into_owned();
        assert!(Config::resolve(env_from(&[(CONFIG_PATH_ENV, path.as_str())])).is_ok());
    }

    #[test]
    fn test_resolve_file_then_env() {
        let file = sample_file();
        let path = file.path().to_string_lossy().into_owned();
        let config = Config::resolve(env_from(&[
            (CONFIG_PATH_ENV, path.as_str()),
            ("THERMOBEE_TOPIC", "house/cellar"),
            ("THERMOBEE_DEBUG", "T"),
        ]))
        .unwrap();

        assert_eq!(config.sensors.topic, "house/cellar");
        assert_eq!(config.sensors.interval_ms, 5000);
        assert!(config.logger.debug);
        assert_eq!(config.transport.port, 1884);
    }

    #[test]
    fn test_resolve_missing_explicit_file() {
        let result = Config::resolve(env_from(&[(CONFIG_PATH_ENV, "/nonexistent/thermobee.toml")]));
        assert!(matches!(result, Err(ConfigError::Config(_))));
    }

    #[test]
    fn test_resolve_env_validation_failure() {
        let file = sample_file();
        let path = file.path().to_string_lossy().into_owned();
        let result = Config::resolve(env_from(&[
            (CONFIG_PATH_ENV, path.as_str()),
            ("THERMOBEE_QOS", "3"),
        ]));
        assert!(matches!(result, Err(ConfigError::ValidationError(_))));
    }

    #[test]
    fn test_startup_timestamp_format() {
        let ts = startup_timestamp();
        assert!(ts.ends_with('Z'));
        assert_eq!(ts.len(), "2024-01-01T00:00:00.000000Z".len());
    }
}
