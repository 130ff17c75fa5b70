//! thermobee: DS18B20 temperature sampler and MQTT publisher
//!
//! Reads every configured 1-Wire thermometer on a fixed cadence and publishes
//! one JSON reading per device to an MQTT broker. Rounds only start while the
//! broker connection is up, flaky sensors are retried with bounded
//! exponential backoff, and publishes run as independent tasks that are
//! drained before the process exits.
//!
//! ## Modules
//!
//! * `config`: Configuration structures, loading, validation, and defaults.
//!   TOML file plus `THERMOBEE_*` environment overrides, validated with the
//!   `validator` crate.
//!
//! * `core`: Sampling runtime:
//!   - w1 sysfs device discovery and reads
//!   - Backoff retrier
//!   - Connection gate
//!   - Publish scheduler and publish tasks
//!   - Shutdown coordinator
//!
//! * `logger`: Logging initialization using `tracing`.
//!   Console output in compact, pretty or JSON form and optional systemd
//!   journald integration.
//!
//! The broker connection itself lives in the `thermobee-mqtt` workspace crate.

pub mod config;
pub mod core;
pub mod logger;
