//! Persistent CLI settings
//!
//! Stored as TOML under the user config directory. Every field has a
//! default, so a missing file or a partial file both load.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use vial_transport::protocol::{hid, timing};
use vial_transport::{ChannelConfig, HidDiscovery, TransportType};

/// Which keyboard interface to open
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceSelector {
    /// Restrict to this vendor id
    pub vid: Option<u16>,
    /// Restrict to this product id (only honoured together with `vid`)
    pub pid: Option<u16>,
    pub usage_page: u16,
    pub usage: u16,
}

impl Default for DeviceSelector {
    fn default() -> Self {
        Self {
            vid: None,
            pid: None,
            usage_page: hid::USAGE_PAGE,
            usage: hid::USAGE,
        }
    }
}

/// Command channel timing, in milliseconds
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Timeouts {
    pub command_ms: u64,
    pub batch_stall_ms: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            command_ms: timing::COMMAND_TIMEOUT_MS,
            batch_stall_ms: timing::BATCH_STALL_TIMEOUT_MS,
        }
    }
}

/// Complete CLI configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverConfig {
    pub device: DeviceSelector,
    pub timeouts: Timeouts,
    /// Transport to prefer when a keyboard is reachable over several
    pub transport: TransportType,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            device: DeviceSelector::default(),
            timeouts: Timeouts::default(),
            transport: TransportType::UsbHid,
        }
    }
}

impl DriverConfig {
    /// Get the default config file path
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("vialctl")
            .join("config.toml")
    }

    /// Load config from a file, or return default if not found
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: DriverConfig = toml::from_str(&content)?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Save config to a file
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Channel timing derived from the configured timeouts
    pub fn channel_config(&self) -> ChannelConfig {
        ChannelConfig::default()
            .with_command_timeout(Duration::from_millis(self.timeouts.command_ms))
            .with_batch_stall_timeout(Duration::from_millis(self.timeouts.batch_stall_ms))
    }

    /// HID discovery matching the device selector
    pub fn discovery(&self) -> HidDiscovery {
        let discovery =
            HidDiscovery::new().with_usage(self.device.usage_page, self.device.usage);
        match (self.device.vid, self.device.pid) {
            (Some(vid), Some(pid)) => discovery.with_filter(vid, pid),
            _ => discovery,
        }
    }
}
