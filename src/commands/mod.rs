//! Command handlers for the CLI application.
//!
//! This module organizes command handlers by category:
//! - `utility`: Device listing and EEPROM reset
//! - `query`: Read-only device information (info)
//! - `keymap`: Keymap dump and single-key assignment
//! - `macros`: Macro show and set
//! - `dynamic`: Tap-dance, combo and key-override tables
//! - `quantum`: QMK settings
//! - `backup`: Snapshot backup and restore

pub mod backup;
pub mod dynamic;
pub mod keymap;
pub mod macros;
pub mod quantum;
pub mod query;
pub mod utility;

use anyhow::{anyhow, Context};
use vial_driver::{open_keyboard, DriverConfig};
use vial_keyboard::{KeycodeConverter, VialKeyboard};

/// Result type for command handlers
pub type CommandResult = anyhow::Result<()>;

/// Open the configured keyboard and fetch its definition
///
/// The definition carries the matrix size and custom keycode names every
/// handler needs for display.
pub async fn open(config: &DriverConfig) -> anyhow::Result<VialKeyboard> {
    let keyboard = open_keyboard(config).await?;
    keyboard
        .get_definition()
        .await
        .context("Failed to read keyboard definition")?;
    Ok(keyboard)
}

/// Parse a keycode given by name or number
pub fn parse_keycode(converter: &KeycodeConverter, s: &str) -> anyhow::Result<u16> {
    if let Some(value) = converter.resolve(s) {
        return Ok(value);
    }
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u16::from_str_radix(hex, 16).ok(),
        None => s.parse().ok(),
    };
    parsed.ok_or_else(|| anyhow!("Unknown keycode '{s}'"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_keycode() {
        let converter = KeycodeConverter::default();
        assert_eq!(parse_keycode(&converter, "KC_A").unwrap(), 0x04);
        assert_eq!(parse_keycode(&converter, "0x2C").unwrap(), 0x2C);
        assert_eq!(parse_keycode(&converter, "41").unwrap(), 41);
        assert!(parse_keycode(&converter, "KC_NOT_A_KEY").is_err());
    }
}
