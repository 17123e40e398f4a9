//! Utility command handlers.

use super::{open, CommandResult};
use vial_driver::{list_devices, DriverConfig};

/// List keyboards exposing the VIA interface
pub async fn list(config: &DriverConfig) -> CommandResult {
    let devices = list_devices(config).await?;
    if devices.is_empty() {
        println!("No VIA/Vial keyboards found");
        return Ok(());
    }
    println!("VIA/Vial keyboards:");
    for device in &devices {
        let info = &device.info;
        println!(
            "  VID={:04x} PID={:04x} usage={:04x} page={:04x} {:?} {} path={}",
            info.vid,
            info.pid,
            info.usage,
            info.usage_page,
            info.transport_type,
            info.display_name(),
            info.device_path,
        );
    }
    Ok(())
}

/// Reset the EEPROM to firmware defaults
pub async fn reset_eeprom(config: &DriverConfig) -> CommandResult {
    let keyboard = open(config).await?;
    println!("Resetting EEPROM...");
    keyboard.reset_eeprom().await?;
    println!("EEPROM reset. Replug the keyboard if it does not pick up its defaults.");
    keyboard.close().await?;
    Ok(())
}
