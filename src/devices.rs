//! # Device table.
//!
//! Devices are listed in the `[Devices]` section of an INI file, one
//! `name = address` pair per line:
//!
//! ```ini
//! [Devices]
//! Kitchen = A4:C1:38:00:00:01
//! Bedroom = A4:C1:38:00:00:02
//! ```
//!
//! File order is preserved; it decides each poller's start stagger.

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use ini::Ini;

use crate::error::ConfigError;

/// INI section holding the device table.
pub const DEVICES_SECTION: &str = "Devices";

/// A configured sensor. Immutable once loaded.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Device {
    name: Arc<str>,
    address: Arc<str>,
}

impl Device {
    /// Creates a device record.
    pub fn new(name: impl Into<Arc<str>>, address: impl Into<Arc<str>>) -> Self {
        Self {
            name: name.into(),
            address: address.into(),
        }
    }

    /// Metric label and log context.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Radio address passed to the backend.
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Shared handle to the name, for events and callbacks.
    pub fn name_arc(&self) -> Arc<str> {
        Arc::clone(&self.name)
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.address)
    }
}

/// Loads the device table from an INI file.
pub fn load_devices(path: &Path) -> Result<Vec<Device>, ConfigError> {
    let ini = Ini::load_from_file(path)?;
    parse_devices(&ini)
}

/// Parses the device table from INI text.
pub fn parse_devices_str(text: &str) -> Result<Vec<Device>, ConfigError> {
    let ini = Ini::load_from_str(text).map_err(|e| ConfigError::Read(ini::Error::Parse(e)))?;
    parse_devices(&ini)
}

fn parse_devices(ini: &Ini) -> Result<Vec<Device>, ConfigError> {
    let section = ini
        .section(Some(DEVICES_SECTION))
        .ok_or(ConfigError::MissingSection {
            section: DEVICES_SECTION,
        })?;

    let mut devices = Vec::new();
    for (name, address) in section.iter() {
        let (name, address) = (name.trim(), address.trim());
        if address.is_empty() {
            return Err(ConfigError::InvalidEntry {
                name: name.to_string(),
                address: address.to_string(),
                reason: "address is empty",
            });
        }
        if devices.iter().any(|d: &Device| d.name() == name) {
            return Err(ConfigError::InvalidEntry {
                name: name.to_string(),
                address: address.to_string(),
                reason: "duplicate device name",
            });
        }
        tracing::info!(index = devices.len(), device = name, address, "device configured");
        devices.push(Device::new(name, address));
    }

    if devices.is_empty() {
        return Err(ConfigError::Empty);
    }
    Ok(devices)
}
