//! Device discovery for VIA/Vial keyboards

use std::sync::Arc;

use async_trait::async_trait;
use hidapi::HidApi;
use tracing::{debug, info};

use crate::error::TransportError;
use crate::hid_raw::HidRawTransport;
use crate::protocol::hid;
use crate::types::{DiscoveredDevice, TransportDeviceInfo, TransportType};
use crate::Transport;

/// Device discovery abstraction
#[async_trait]
pub trait DeviceDiscovery: Send + Sync {
    /// List currently available devices
    async fn list_devices(&self) -> Result<Vec<DiscoveredDevice>, TransportError>;

    /// Open a specific device
    async fn open_device(
        &self,
        device: &DiscoveredDevice,
    ) -> Result<Arc<dyn Transport>, TransportError>;
}

/// Raw HID discovery, matching the VIA usage page and usage
pub struct HidDiscovery {
    usage_page: u16,
    usage: u16,
    /// Optional VID/PID restriction
    filter: Option<(u16, u16)>,
}

impl Default for HidDiscovery {
    fn default() -> Self {
        Self::new()
    }
}

impl HidDiscovery {
    /// Create a discovery instance for the standard VIA interface
    pub fn new() -> Self {
        Self {
            usage_page: hid::USAGE_PAGE,
            usage: hid::USAGE,
            filter: None,
        }
    }

    /// Match a non-standard usage page/usage pair
    pub fn with_usage(mut self, usage_page: u16, usage: u16) -> Self {
        self.usage_page = usage_page;
        self.usage = usage;
        self
    }

    /// Only report devices with this VID/PID
    pub fn with_filter(mut self, vid: u16, pid: u16) -> Self {
        self.filter = Some((vid, pid));
        self
    }

    fn matches(&self, device: &hidapi::DeviceInfo) -> bool {
        if device.usage_page() != self.usage_page || device.usage() != self.usage {
            return false;
        }
        match self.filter {
            Some((vid, pid)) => device.vendor_id() == vid && device.product_id() == pid,
            None => true,
        }
    }

    fn to_info(device: &hidapi::DeviceInfo) -> TransportDeviceInfo {
        TransportDeviceInfo {
            vid: device.vendor_id(),
            pid: device.product_id(),
            transport_type: TransportType::UsbHid,
            device_path: device.path().to_string_lossy().into_owned(),
            serial: device.serial_number().map(String::from),
            product_name: device.product_string().map(String::from),
            usage_page: device.usage_page(),
            usage: device.usage(),
        }
    }
}

#[async_trait]
impl DeviceDiscovery for HidDiscovery {
    async fn list_devices(&self) -> Result<Vec<DiscoveredDevice>, TransportError> {
        let api = HidApi::new()?;
        let devices: Vec<DiscoveredDevice> = api
            .device_list()
            .filter(|d| self.matches(d))
            .map(|d| DiscoveredDevice {
                info: Self::to_info(d),
            })
            .collect();

        info!("Found {} VIA devices", devices.len());
        Ok(devices)
    }

    async fn open_device(
        &self,
        device: &DiscoveredDevice,
    ) -> Result<Arc<dyn Transport>, TransportError> {
        let api = HidApi::new()?;
        let path = std::ffi::CString::new(device.info.device_path.clone())
            .map_err(|e| TransportError::Internal(format!("invalid device path: {e}")))?;

        debug!("Opening {} twice (writer + reader)", device.info.device_path);
        let writer = api.open_path(&path)?;
        let reader = api.open_path(&path)?;

        let transport = HidRawTransport::new(writer, reader, device.info.clone())?;
        Ok(Arc::new(transport))
    }
}
