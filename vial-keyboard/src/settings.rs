//! Keyboard identity and state types

use serde::{Deserialize, Serialize};

/// Response of the Vial keyboard id query
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VialKeyboardId {
    /// Vial protocol revision
    pub protocol: u32,
    /// Firmware-build unique id
    pub uid: u64,
}

impl VialKeyboardId {
    /// Parse `[protocol u32 LE, uid u64 LE]`
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        let protocol = u32::from_le_bytes(bytes.get(0..4)?.try_into().ok()?);
        let uid = u64::from_le_bytes(bytes.get(4..12)?.try_into().ok()?);
        Some(Self { protocol, uid })
    }

    /// UID as 16 hex digits
    pub fn uid_hex(&self) -> String {
        format!("{:016X}", self.uid)
    }
}

/// Matrix position of a key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyPosition {
    pub row: u8,
    pub col: u8,
}

/// Security lock state of a Vial keyboard
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnlockStatus {
    pub unlocked: bool,
    pub in_progress: bool,
    /// Keys that must be held to unlock
    pub unlock_keys: Vec<KeyPosition>,
}

impl UnlockStatus {
    /// Parse `[unlocked, in_progress, (row, col)...]`, pairs of `0xFF` are unused
    pub fn from_bytes(bytes: &[u8]) -> Self {
        let unlock_keys = bytes
            .get(2..)
            .unwrap_or(&[])
            .chunks_exact(2)
            .filter(|pair| pair != &[0xFF, 0xFF])
            .map(|pair| KeyPosition {
                row: pair[0],
                col: pair[1],
            })
            .collect();
        Self {
            unlocked: bytes.first() == Some(&1),
            in_progress: bytes.get(1) == Some(&1),
            unlock_keys,
        }
    }
}

/// Progress of a running unlock
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UnlockPoll {
    pub unlocked: bool,
    pub in_progress: bool,
    /// Remaining hold ticks
    pub counter: u8,
}

impl UnlockPoll {
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self {
            unlocked: bytes.first() == Some(&1),
            in_progress: bytes.get(1) == Some(&1),
            counter: bytes.get(2).copied().unwrap_or(0),
        }
    }
}

/// Rotation direction of an encoder action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EncoderDirection {
    CounterClockwise = 0,
    Clockwise = 1,
}

/// One encoder keycode assignment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncoderAssignment {
    pub layer: u8,
    pub index: u8,
    pub direction: EncoderDirection,
    pub keycode: u16,
}
