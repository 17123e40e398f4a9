//! Common types for transport layer

use serde::{Deserialize, Serialize};

/// Transport type identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TransportType {
    /// Raw HID reports over USB
    UsbHid,
    /// Nordic UART Service tunnel over Bluetooth LE
    BleNus,
    /// In-memory transport used by tests and simulations
    Mock,
}

impl TransportType {
    /// Check if this transport is wireless
    pub fn is_wireless(&self) -> bool {
        matches!(self, Self::BleNus)
    }
}

/// Device identification information
#[derive(Debug, Clone)]
pub struct TransportDeviceInfo {
    /// USB Vendor ID
    pub vid: u16,
    /// USB Product ID
    pub pid: u16,
    /// Transport type
    pub transport_type: TransportType,
    /// Device path or identifier (transport-specific)
    pub device_path: String,
    /// Serial number if available
    pub serial: Option<String>,
    /// Product name if available
    pub product_name: Option<String>,
    /// HID usage page of the opened interface
    pub usage_page: u16,
    /// HID usage of the opened interface
    pub usage: u16,
}

impl TransportDeviceInfo {
    /// Short human-readable label: product name, falling back to VID:PID
    pub fn display_name(&self) -> String {
        match &self.product_name {
            Some(name) if !name.is_empty() => name.clone(),
            _ => format!("{:04X}:{:04X}", self.vid, self.pid),
        }
    }
}

/// A device found during discovery
#[derive(Debug, Clone)]
pub struct DiscoveredDevice {
    /// Device information
    pub info: TransportDeviceInfo,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(product_name: Option<&str>) -> TransportDeviceInfo {
        TransportDeviceInfo {
            vid: 0x3434,
            pid: 0x0361,
            transport_type: TransportType::UsbHid,
            device_path: "/dev/hidraw3".into(),
            serial: None,
            product_name: product_name.map(String::from),
            usage_page: 0xFF60,
            usage: 0x61,
        }
    }

    #[test]
    fn test_display_name_prefers_product() {
        assert_eq!(info(Some("Q1 Pro")).display_name(), "Q1 Pro");
    }

    #[test]
    fn test_display_name_falls_back_to_ids() {
        assert_eq!(info(None).display_name(), "3434:0361");
        assert_eq!(info(Some("")).display_name(), "3434:0361");
    }

    #[test]
    fn test_wireless() {
        assert!(TransportType::BleNus.is_wireless());
        assert!(!TransportType::UsbHid.is_wireless());
    }
}
