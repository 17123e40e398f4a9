//! Dynamic-entry codecs: tap-dance, combo and key-override records
//!
//! Entries live in firmware-sized tables addressed by index. A get response
//! starts with a status byte: `0` means the record follows little-endian
//! from offset 1, anything else means the index is absent and the record
//! decodes as all zeros.

use serde::{Deserialize, Serialize};
use vial_transport::protocol::{dynamic_entry as op, dynamic_entry_report};

/// Read a little-endian u16 at `idx`, 0 past the end
fn le16(buf: &[u8], idx: usize) -> u16 {
    match buf.get(idx..idx + 2) {
        Some(b) => u16::from_le_bytes([b[0], b[1]]),
        None => 0,
    }
}

fn byte(buf: &[u8], idx: usize) -> u8 {
    buf.get(idx).copied().unwrap_or(0)
}

/// Fixed-layout record stored in a dynamic-entry table
pub trait DynamicEntry: Sized + Default + Clone {
    /// Human-readable table name
    const NAME: &'static str;
    const GET_OP: u8;
    const SET_OP: u8;

    /// Decode the record body (after the status byte)
    fn decode(record: &[u8]) -> Self;

    /// Encode the record body
    fn encode(&self) -> Vec<u8>;

    /// Decode a get response, honouring the status byte
    fn from_response(response: &[u8]) -> Self {
        match response.split_first() {
            Some((0, record)) => Self::decode(record),
            _ => Self::default(),
        }
    }

    /// `[0xFE, 0x0D, get_op, index]`
    fn get_request(index: u8) -> Vec<u8> {
        dynamic_entry_report(Self::GET_OP, &[index])
    }

    /// `[0xFE, 0x0D, set_op, index, record...]`
    fn set_request(&self, index: u8) -> Vec<u8> {
        let mut payload = vec![index];
        payload.extend(self.encode());
        dynamic_entry_report(Self::SET_OP, &payload)
    }
}

// ============================================================================
// Tap dance
// ============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TapDance {
    pub on_tap: u16,
    pub on_hold: u16,
    pub on_double_tap: u16,
    pub on_tap_hold: u16,
    /// Milliseconds
    pub tapping_term: u16,
}

impl DynamicEntry for TapDance {
    const NAME: &'static str = "tap dance";
    const GET_OP: u8 = op::TAP_DANCE_GET;
    const SET_OP: u8 = op::TAP_DANCE_SET;

    fn decode(record: &[u8]) -> Self {
        Self {
            on_tap: le16(record, 0),
            on_hold: le16(record, 2),
            on_double_tap: le16(record, 4),
            on_tap_hold: le16(record, 6),
            tapping_term: le16(record, 8),
        }
    }

    fn encode(&self) -> Vec<u8> {
        [
            self.on_tap,
            self.on_hold,
            self.on_double_tap,
            self.on_tap_hold,
            self.tapping_term,
        ]
        .iter()
        .flat_map(|v| v.to_le_bytes())
        .collect()
    }
}

// ============================================================================
// Combo
// ============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Combo {
    pub keys: [u16; 4],
    pub output: u16,
}

impl DynamicEntry for Combo {
    const NAME: &'static str = "combo";
    const GET_OP: u8 = op::COMBO_GET;
    const SET_OP: u8 = op::COMBO_SET;

    fn decode(record: &[u8]) -> Self {
        Self {
            keys: [
                le16(record, 0),
                le16(record, 2),
                le16(record, 4),
                le16(record, 6),
            ],
            output: le16(record, 8),
        }
    }

    fn encode(&self) -> Vec<u8> {
        self.keys
            .iter()
            .chain(std::iter::once(&self.output))
            .flat_map(|v| v.to_le_bytes())
            .collect()
    }
}

// ============================================================================
// Key override
// ============================================================================

/// Key override option bits
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OverrideOptions(pub u8);

impl OverrideOptions {
    pub const ACTIVATION_TRIGGER_DOWN: u8 = 1 << 0;
    pub const ACTIVATION_REQUIRED_MOD_DOWN: u8 = 1 << 1;
    pub const ACTIVATION_NEGATIVE_MOD_UP: u8 = 1 << 2;
    pub const ONE_MOD: u8 = 1 << 3;
    pub const NO_REREGISTER_TRIGGER: u8 = 1 << 4;
    pub const NO_UNREGISTER_ON_OTHER_KEY_DOWN: u8 = 1 << 5;
    pub const ENABLED: u8 = 1 << 7;

    pub fn has(self, bit: u8) -> bool {
        self.0 & bit != 0
    }

    pub fn set(&mut self, bit: u8, on: bool) {
        if on {
            self.0 |= bit;
        } else {
            self.0 &= !bit;
        }
    }

    pub fn is_enabled(self) -> bool {
        self.has(Self::ENABLED)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyOverride {
    pub trigger: u16,
    pub replacement: u16,
    /// Bitmask over layers 0-15
    pub layers: u16,
    pub trigger_mods: u8,
    pub negative_mod_mask: u8,
    pub suppressed_mods: u8,
    pub options: OverrideOptions,
}

impl KeyOverride {
    /// Whether the override is active on `layer`
    pub fn on_layer(&self, layer: u8) -> bool {
        layer < 16 && self.layers & (1 << layer) != 0
    }
}

impl DynamicEntry for KeyOverride {
    const NAME: &'static str = "key override";
    const GET_OP: u8 = op::KEY_OVERRIDE_GET;
    const SET_OP: u8 = op::KEY_OVERRIDE_SET;

    fn decode(record: &[u8]) -> Self {
        Self {
            trigger: le16(record, 0),
            replacement: le16(record, 2),
            layers: le16(record, 4),
            trigger_mods: byte(record, 6),
            negative_mod_mask: byte(record, 7),
            suppressed_mods: byte(record, 8),
            options: OverrideOptions(byte(record, 9)),
        }
    }

    fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(10);
        out.extend(self.trigger.to_le_bytes());
        out.extend(self.replacement.to_le_bytes());
        out.extend(self.layers.to_le_bytes());
        out.extend([
            self.trigger_mods,
            self.negative_mod_mask,
            self.suppressed_mods,
            self.options.0,
        ]);
        out
    }
}

// ============================================================================
// Entry counts
// ============================================================================

/// Firmware table sizes reported by `GET_NUMBER_OF_ENTRIES`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DynamicEntryCounts {
    pub tap_dance: u8,
    pub combo: u8,
    pub key_override: u8,
    /// Feature flags in the last response byte (bit0 caps word, bit1 layer lock)
    pub features: u8,
}

impl DynamicEntryCounts {
    pub fn request() -> Vec<u8> {
        dynamic_entry_report(op::GET_NUMBER_OF_ENTRIES, &[])
    }

    pub fn from_response(response: &[u8]) -> Self {
        Self {
            tap_dance: byte(response, 0),
            combo: byte(response, 1),
            key_override: byte(response, 2),
            features: byte(response, 31),
        }
    }

    pub fn has_caps_word(&self) -> bool {
        self.features & 0x01 != 0
    }

    pub fn has_layer_lock(&self) -> bool {
        self.features & 0x02 != 0
    }
}
