//! Opening a keyboard from the CLI configuration

use anyhow::Context;
use tracing::info;

use vial_keyboard::{DeviceDiscovery, DiscoveredDevice, TransportError, TransportType, VialKeyboard};

use crate::config::DriverConfig;

/// Pick the device to open: the first with the preferred transport, else the first found
pub fn pick_device(
    devices: &[DiscoveredDevice],
    preferred: TransportType,
) -> Result<&DiscoveredDevice, TransportError> {
    devices
        .iter()
        .find(|d| d.info.transport_type == preferred)
        .or_else(|| devices.first())
        .ok_or_else(|| {
            TransportError::DeviceNotFound(
                "no matching interface (is the keyboard running VIA/Vial firmware?)".into(),
            )
        })
}

/// List keyboards matching the configured selector
pub async fn list_devices(config: &DriverConfig) -> anyhow::Result<Vec<DiscoveredDevice>> {
    let devices = config
        .discovery()
        .list_devices()
        .await
        .context("Failed to enumerate HID devices")?;
    Ok(devices)
}

/// Open the configured keyboard and wrap it in a client
pub async fn open_keyboard(config: &DriverConfig) -> anyhow::Result<VialKeyboard> {
    let discovery = config.discovery();
    let devices = discovery.list_devices().await?;
    let device = pick_device(&devices, config.transport)?;

    info!(
        "Opening {} at {}",
        device.info.display_name(),
        device.info.device_path
    );
    let transport = discovery
        .open_device(device)
        .await
        .with_context(|| format!("Failed to open {}", device.info.device_path))?;
    Ok(VialKeyboard::with_config(transport, config.channel_config()))
}
