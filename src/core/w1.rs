//! DS18B20 thermometers through the Linux `w1-therm` sysfs interface.
//!
//! The kernel exposes every slave on the bus as a directory named
//! `<family>-<serial>` under `/sys/bus/w1/devices`. Reading its `w1_slave`
//! file triggers a conversion and returns the scratchpad plus the decoded
//! value:
//!
//! ```text
//! /sys/bus/w1/devices/
//!   28-3ce10457784c/
//!     w1_slave   <- "72 01 4b 46 7f ff 0e 10 57 : crc=57 YES"
//!                   "72 01 4b 46 7f ff 0e 10 57 t=23125"
//!   w1_bus_master1/
//! ```

use std::path::{Path, PathBuf};

use crc::{Crc, CRC_8_MAXIM_DOW};
use thiserror::Error;
use tracing::debug;

use super::{
    device::{DeviceError, DeviceReader},
    reading::Reading,
};

/// DS18B20 family code.
pub const FAMILY_DS18B20: u8 = 0x28;

/// Scratchpad value reported before the first conversion completes.
const POWER_ON_RESET_MILLI: i64 = 85_000;

const DALLAS_CRC: Crc<u8> = Crc::<u8>::new(&CRC_8_MAXIM_DOW);

#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("Failed to read w1 devices directory {path}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Configured device {0} not found on the w1 bus")]
    UnknownDevice(String),

    #[error("Device {0} is listed more than once")]
    DuplicateDevice(String),

    #[error("No DS18B20 devices found under {0}")]
    NoDevices(String),
}

/// One DS18B20 on the w1 bus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct W1Thermometer {
    id: String,
    address: String,
    slave_path: PathBuf,
}

impl W1Thermometer {
    /// Recognizes a sysfs slave directory name such as `28-3ce10457784c`.
    ///
    /// Returns `None` for other families and for bus master entries.
    pub fn from_sysfs_id(root: &Path, id: &str) -> Option<Self> {
        let (family, serial) = id.split_once('-')?;
        let family = u8::from_str_radix(family, 16).ok()?;
        if family != FAMILY_DS18B20 || serial.len() != 12 {
            return None;
        }
        let serial = u64::from_str_radix(serial, 16).ok()?;

        Some(Self {
            id: id.to_string(),
            address: rom_address(family, serial),
            slave_path: root.join(id).join("w1_slave"),
        })
    }

    /// Sysfs directory name.
    pub fn id(&self) -> &str {
        &self.id
    }
}

/// Full 64-bit ROM code in hex: CRC, serial, family (most
/// significant byte first).
fn rom_address(family: u8, serial: u64) -> String {
    let mut rom = [0u8; 8];
    rom[0] = family;
    rom[1..7].copy_from_slice(&serial.to_le_bytes()[..6]);
    rom[7] = DALLAS_CRC.checksum(&rom[..7]);
    format!("{:x}", u64::from_le_bytes(rom))
}

/// Every DS18B20 under `root`, sorted by sysfs id.
pub async fn discover(root: &Path) -> Result<Vec<W1Thermometer>, DiscoveryError> {
    let io_err = |source| DiscoveryError::Io {
        path: root.display().to_string(),
        source,
    };

    let mut entries = tokio::fs::read_dir(root).await.map_err(io_err)?;
    let mut found = Vec::new();
    while let Some(entry) = entries.next_entry().await.map_err(io_err)? {
        let Ok(name) = entry.file_name().into_string() else {
            continue;
        };
        match W1Thermometer::from_sysfs_id(root, &name) {
            Some(device) => {
                debug!(id = %name, address = %device.address, "Found DS18B20");
                found.push(device);
            }
            None => debug!(entry = %name, "Skipping w1 entry"),
        }
    }

    found.sort_by(|a, b| a.id.cmp(&b.id));
    Ok(found)
}

/// Restricts and orders `found` to the configured list. Entries may be given
/// either as sysfs ids or as ROM addresses. An empty list keeps everything.
/// Naming one device twice, under either form, is an error.
pub fn select(
    found: Vec<W1Thermometer>,
    wanted: &[String],
) -> Result<Vec<W1Thermometer>, DiscoveryError> {
    if wanted.is_empty() {
        return Ok(found);
    }

    let mut selected: Vec<W1Thermometer> = Vec::with_capacity(wanted.len());
    for want in wanted {
        let want = want.trim().to_lowercase();
        let device = found
            .iter()
            .find(|d| d.id == want || d.address == want)
            .ok_or_else(|| DiscoveryError::UnknownDevice(want.clone()))?;

        if selected.iter().any(|d| d.id == device.id) {
            return Err(DiscoveryError::DuplicateDevice(want));
        }
        selected.push(device.clone());
    }
    Ok(selected)
}

/// Discovery plus selection; an empty result is an error.
pub async fn discover_configured(
    root: &Path,
    wanted: &[String],
) -> Result<Vec<W1Thermometer>, DiscoveryError> {
    let devices = select(discover(root).await?, wanted)?;
    if devices.is_empty() {
        return Err(DiscoveryError::NoDevices(root.display().to_string()));
    }
    Ok(devices)
}

/// Extracts °C from `w1_slave` contents.
pub fn parse_w1_slave(device: &str, content: &str) -> Result<f64, DeviceError> {
    let mut lines = content.lines();
    let crc_line = lines.next().unwrap_or_default();
    if !crc_line.trim_end().ends_with("YES") {
        return Err(DeviceError::NotResponding {
            device: device.to_string(),
            reason: "CRC check failed".to_string(),
        });
    }

    let value = lines
        .next()
        .and_then(|line| line.rsplit_once("t="))
        .map(|(_, v)| v.trim())
        .ok_or_else(|| DeviceError::InvalidData {
            device: device.to_string(),
            reason: "missing temperature field".to_string(),
        })?;

    let milli: i64 = value.parse().map_err(|_| DeviceError::InvalidData {
        device: device.to_string(),
        reason: format!("unparseable temperature '{value}'"),
    })?;

    if milli == POWER_ON_RESET_MILLI {
        return Err(DeviceError::NotResponding {
            device: device.to_string(),
            reason: "power-on reset value".to_string(),
        });
    }

    Ok(milli as f64 / 1000.0)
}

#[async_trait::async_trait]
impl DeviceReader for W1Thermometer {
    fn address(&self) -> &str {
        &self.address
    }

    async fn read(&self) -> Result<Reading, DeviceError> {
        let content = tokio::fs::read_to_string(&self.slave_path)
            .await
            .map_err(|source| DeviceError::Bus {
                device: self.address.clone(),
                path: self.slave_path.display().to_string(),
                source,
            })?;

        let celsius = parse_w1_slave(&self.address, &content)?;
        Ok(Reading::now(celsius))
    }
}
