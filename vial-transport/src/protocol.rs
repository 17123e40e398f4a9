//! Protocol constants for VIA/Vial keyboard communication
//!
//! Every outbound report starts with a discriminator byte chosen by the host.
//! Plain VIA commands use a single byte, the Vial sub-protocol is nested under
//! [`via::VIAL_PREFIX`] and keyboard-specific passthrough commands under
//! [`via::CUSTOM_PREFIX`].

/// Raw HID report payload size (without report ID)
pub const REPORT_SIZE: usize = 32;

/// VIA command identifiers
pub mod via {
    pub const GET_PROTOCOL_VERSION: u8 = 0x01;
    pub const GET_KEYBOARD_VALUE: u8 = 0x02;
    pub const SET_KEYBOARD_VALUE: u8 = 0x03;
    pub const DYNAMIC_KEYMAP_GET_KEYCODE: u8 = 0x04;
    pub const DYNAMIC_KEYMAP_SET_KEYCODE: u8 = 0x05;
    pub const DYNAMIC_KEYMAP_RESET: u8 = 0x06;
    pub const CUSTOM_SET_VALUE: u8 = 0x07;
    pub const CUSTOM_GET_VALUE: u8 = 0x08;
    pub const CUSTOM_SAVE: u8 = 0x09;
    pub const EEPROM_RESET: u8 = 0x0A;
    pub const BOOTLOADER_JUMP: u8 = 0x0B;
    pub const MACRO_GET_COUNT: u8 = 0x0C;
    pub const MACRO_GET_BUFFER_SIZE: u8 = 0x0D;
    pub const MACRO_GET_BUFFER: u8 = 0x0E;
    pub const MACRO_SET_BUFFER: u8 = 0x0F;
    pub const MACRO_RESET: u8 = 0x10;
    pub const GET_LAYER_COUNT: u8 = 0x11;
    pub const KEYMAP_GET_BUFFER: u8 = 0x12;
    pub const KEYMAP_SET_BUFFER: u8 = 0x13;
    pub const GET_ENCODER: u8 = 0x14;
    pub const SET_ENCODER: u8 = 0x15;
    /// Vial sub-protocol
    pub const VIAL_PREFIX: u8 = 0xFE;
    /// Keyboard-specific passthrough (unhandled by VIA core)
    pub const CUSTOM_PREFIX: u8 = 0xFF;
}

/// Keyboard value ids for GET/SET_KEYBOARD_VALUE
pub mod keyboard_value {
    pub const UPTIME: u8 = 0x01;
    pub const LAYOUT_OPTIONS: u8 = 0x02;
}

/// Vial sub-commands (second byte after `via::VIAL_PREFIX`)
pub mod vial {
    pub const GET_KEYBOARD_ID: u8 = 0x00;
    pub const GET_SIZE: u8 = 0x01;
    pub const GET_DEFINITION: u8 = 0x02;
    pub const GET_ENCODER: u8 = 0x03;
    pub const SET_ENCODER: u8 = 0x04;
    pub const GET_UNLOCK_STATUS: u8 = 0x05;
    pub const UNLOCK_START: u8 = 0x06;
    pub const UNLOCK_POLL: u8 = 0x07;
    pub const LOCK: u8 = 0x08;
    pub const QMK_SETTINGS_QUERY: u8 = 0x09;
    pub const QMK_SETTINGS_GET: u8 = 0x0A;
    pub const QMK_SETTINGS_SET: u8 = 0x0B;
    pub const QMK_SETTINGS_RESET: u8 = 0x0C;
    /// Operate on tap-dance, combo and key-override entries
    pub const DYNAMIC_ENTRY_OP: u8 = 0x0D;
}

/// Dynamic-entry operations (third byte after `vial::DYNAMIC_ENTRY_OP`)
pub mod dynamic_entry {
    pub const GET_NUMBER_OF_ENTRIES: u8 = 0x00;
    pub const TAP_DANCE_GET: u8 = 0x01;
    pub const TAP_DANCE_SET: u8 = 0x02;
    pub const COMBO_GET: u8 = 0x03;
    pub const COMBO_SET: u8 = 0x04;
    pub const KEY_OVERRIDE_GET: u8 = 0x05;
    pub const KEY_OVERRIDE_SET: u8 = 0x06;
}

/// Buffer page sizes
pub mod page {
    /// Payload bytes per keymap/macro buffer page (32 - 4 byte header)
    pub const BUFFER: usize = 28;
    /// Bytes per compressed definition page
    pub const DEFINITION: usize = 32;
}

/// Raw HID interface identification
pub mod hid {
    /// VIA raw HID usage page
    pub const USAGE_PAGE: u16 = 0xFF60;
    /// VIA raw HID usage
    pub const USAGE: u16 = 0x61;
    /// Report ID prepended to every output report
    pub const REPORT_ID: u8 = 0x00;
}

/// Nordic UART Service tunnel
pub mod ble {
    /// Maximum bytes per characteristic write
    pub const MTU: usize = 20;
    pub const NUS_SERVICE_UUID: &str = "6e400001-b5a3-f393-e0a9-e50e24dcca9e";
    /// Central to peripheral
    pub const NUS_TX_CHARACTERISTIC_UUID: &str = "6e400002-b5a3-f393-e0a9-e50e24dcca9e";
    /// Peripheral to central
    pub const NUS_RX_CHARACTERISTIC_UUID: &str = "6e400003-b5a3-f393-e0a9-e50e24dcca9e";
}

/// Timing constants
pub mod timing {
    /// Single command response timeout (ms)
    pub const COMMAND_TIMEOUT_MS: u64 = 500;
    /// Interval between inbound polls (ms)
    pub const POLL_INTERVAL_MS: u64 = 1;
    /// Maximum outstanding writes in a batch
    pub const BATCH_WINDOW: usize = 3;
    /// Batch stall timeout (ms), reset whenever a response arrives
    pub const BATCH_STALL_TIMEOUT_MS: u64 = 1000;
    /// Reader thread read timeout (ms), bounds shutdown latency
    pub const READ_TIMEOUT_MS: i32 = 100;
}

/// Build a Vial sub-protocol report: `[0xFE, sub, payload...]`
pub fn vial_report(sub: u8, payload: &[u8]) -> Vec<u8> {
    let mut report = Vec::with_capacity(2 + payload.len());
    report.push(via::VIAL_PREFIX);
    report.push(sub);
    report.extend_from_slice(payload);
    report
}

/// Build a dynamic-entry report: `[0xFE, 0x0D, op, payload...]`
pub fn dynamic_entry_report(op: u8, payload: &[u8]) -> Vec<u8> {
    let mut report = Vec::with_capacity(3 + payload.len());
    report.extend_from_slice(&[via::VIAL_PREFIX, vial::DYNAMIC_ENTRY_OP, op]);
    report.extend_from_slice(payload);
    report
}

/// Build a paged buffer request: `[cmd, offset_hi, offset_lo, size, data...]`
///
/// Used for both keymap and macro buffers, which share the same layout.
pub fn buffer_report(cmd: u8, offset: u16, size: u8, data: &[u8]) -> Vec<u8> {
    let mut report = Vec::with_capacity(4 + data.len());
    report.push(cmd);
    report.extend_from_slice(&offset.to_be_bytes());
    report.push(size);
    report.extend_from_slice(data);
    report
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vial_report() {
        assert_eq!(vial_report(vial::GET_SIZE, &[]), vec![0xFE, 0x01]);
        assert_eq!(
            vial_report(vial::GET_DEFINITION, &3u16.to_le_bytes()),
            vec![0xFE, 0x02, 0x03, 0x00]
        );
    }

    #[test]
    fn test_dynamic_entry_report() {
        assert_eq!(
            dynamic_entry_report(dynamic_entry::COMBO_GET, &[7]),
            vec![0xFE, 0x0D, 0x03, 0x07]
        );
    }

    #[test]
    fn test_buffer_report_is_big_endian() {
        let report = buffer_report(via::KEYMAP_GET_BUFFER, 0x01A4, 28, &[]);
        assert_eq!(report, vec![0x12, 0x01, 0xA4, 28]);
    }
}
