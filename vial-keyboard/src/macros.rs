//! Macro codec
//!
//! Macro storage is one flat byte buffer. Each slot is a byte stream
//! followed by a single `0x00`. Inside a slot, any byte other than `0x01`
//! is literal text and `0x01` opens an escape:
//!
//! | Bytes                  | Action                                   |
//! |------------------------|------------------------------------------|
//! | `01 01 kc`             | tap basic keycode                        |
//! | `01 02 kc`             | press basic keycode                      |
//! | `01 03 kc`             | release basic keycode                    |
//! | `01 04 lo hi`          | delay `(lo - 1) + (hi - 1) * 255` ms      |
//! | `01 05 lo hi`          | tap 16-bit keycode                       |
//! | `01 06 lo hi`          | press 16-bit keycode                     |
//! | `01 07 lo hi`          | release 16-bit keycode                   |
//!
//! The byte `0x01` can never appear as literal text. An extended keycode
//! whose low byte is zero embeds a `0x00` in the slot and is written as-is.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::KeyboardError;

/// Escape byte
pub const ESCAPE: u8 = 0x01;
/// Slot terminator
pub const TERMINATOR: u8 = 0x00;

/// Escape subtypes
pub mod subtype {
    pub const TAP: u8 = 1;
    pub const DOWN: u8 = 2;
    pub const UP: u8 = 3;
    pub const DELAY: u8 = 4;
    pub const EXT_TAP: u8 = 5;
    pub const EXT_DOWN: u8 = 6;
    pub const EXT_UP: u8 = 7;
}

/// Offset between basic and extended key subtypes
const EXTENDED_OFFSET: u8 = 4;

/// Largest delay representable with the `+1/+1` byte pair
pub const MAX_DELAY_MS: u16 = 254 + 254 * 255;

/// One macro action
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum MacroAction {
    /// Run of literal bytes
    Text(Vec<u8>),
    Tap(u16),
    Down(u16),
    Up(u16),
    /// Delay in milliseconds
    Delay(u16),
}

impl MacroAction {
    /// Text action from a string
    pub fn text(s: &str) -> Self {
        Self::Text(s.as_bytes().to_vec())
    }
}

// ============================================================================
// Parsing
// ============================================================================

/// Parse one slot (without its terminator) into actions
///
/// Adjacent text bytes form a single `Text` action. Unknown escape subtypes
/// consume the escape and subtype byte and are dropped, as are escapes
/// truncated by the end of the slot.
pub fn parse_actions(slot: &[u8]) -> Vec<MacroAction> {
    let mut actions = Vec::new();
    let mut text = Vec::new();
    let mut idx = 0;

    while idx < slot.len() {
        if slot[idx] != ESCAPE {
            text.push(slot[idx]);
            idx += 1;
            continue;
        }
        if !text.is_empty() {
            actions.push(MacroAction::Text(std::mem::take(&mut text)));
        }

        let Some(&sub) = slot.get(idx + 1) else {
            break;
        };
        let arity = match sub {
            subtype::TAP..=subtype::UP => 1,
            subtype::DELAY | subtype::EXT_TAP..=subtype::EXT_UP => 2,
            _ => {
                idx += 2;
                continue;
            }
        };
        let Some(args) = slot.get(idx + 2..idx + 2 + arity) else {
            break;
        };

        let action = match sub {
            subtype::TAP => MacroAction::Tap(u16::from(args[0])),
            subtype::DOWN => MacroAction::Down(u16::from(args[0])),
            subtype::UP => MacroAction::Up(u16::from(args[0])),
            subtype::DELAY => MacroAction::Delay(decode_delay(args[0], args[1])),
            subtype::EXT_TAP => MacroAction::Tap(u16::from_le_bytes([args[0], args[1]])),
            subtype::EXT_DOWN => MacroAction::Down(u16::from_le_bytes([args[0], args[1]])),
            _ => MacroAction::Up(u16::from_le_bytes([args[0], args[1]])),
        };
        actions.push(action);
        idx += 2 + arity;
    }

    if !text.is_empty() {
        actions.push(MacroAction::Text(text));
    }
    actions
}

fn decode_delay(lo: u8, hi: u8) -> u16 {
    let lo = u16::from(lo.saturating_sub(1));
    let hi = u16::from(hi.saturating_sub(1));
    lo + hi * 255
}

// ============================================================================
// Serialization
// ============================================================================

/// Encode a key action, choosing the basic or extended subtype by value
///
/// `sub` may be a basic (1..=3) or extended (5..=7) subtype:
/// - keycode 0 encodes to nothing
/// - basic subtype with a keycode above 0xFF is promoted to extended
/// - extended subtype with a keycode up to 0xFF is demoted to basic
pub fn encode_key_action(sub: u8, keycode: u16) -> Vec<u8> {
    if keycode == 0 {
        return Vec::new();
    }
    let [lo, hi] = keycode.to_le_bytes();
    let basic = if sub > subtype::DELAY {
        sub - EXTENDED_OFFSET
    } else {
        sub
    };
    if keycode > 0xFF {
        vec![ESCAPE, basic + EXTENDED_OFFSET, lo, hi]
    } else {
        vec![ESCAPE, basic, lo]
    }
}

/// Encode a delay with both bytes offset by one
pub fn encode_delay(ms: u16) -> Vec<u8> {
    let ms = ms.min(MAX_DELAY_MS);
    let upper = ms / 255 + 1;
    let lower = ms - (upper - 1) * 255 + 1;
    // Both fit in a byte once clamped
    vec![ESCAPE, subtype::DELAY, lower as u8, upper as u8]
}

/// Serialize actions into one slot (without terminator)
///
/// # Errors
/// `InvalidParameter` if a text action contains `0x00` or `0x01`.
pub fn serialize_actions(actions: &[MacroAction]) -> Result<Vec<u8>, KeyboardError> {
    let mut out = Vec::new();
    for action in actions {
        match action {
            MacroAction::Text(bytes) => {
                if let Some(bad) = bytes.iter().find(|&&b| b == ESCAPE || b == TERMINATOR) {
                    return Err(KeyboardError::InvalidParameter(format!(
                        "macro text cannot contain byte 0x{bad:02X}"
                    )));
                }
                out.extend_from_slice(bytes);
            }
            MacroAction::Tap(kc) => out.extend(encode_key_action(subtype::TAP, *kc)),
            MacroAction::Down(kc) => out.extend(encode_key_action(subtype::DOWN, *kc)),
            MacroAction::Up(kc) => out.extend(encode_key_action(subtype::UP, *kc)),
            MacroAction::Delay(ms) => out.extend(encode_delay(*ms)),
        }
    }
    Ok(out)
}

// ============================================================================
// Multi-slot buffer
// ============================================================================

/// Split a buffer into complete slots
///
/// Bytes after the last terminator belong to an incomplete slot and are
/// dropped.
pub fn split_slots(buffer: &[u8]) -> Vec<Vec<u8>> {
    let mut slots: Vec<Vec<u8>> = buffer
        .split(|&b| b == TERMINATOR)
        .map(<[u8]>::to_vec)
        .collect();
    slots.pop();
    slots
}

/// Concatenate slots, each followed by a terminator
pub fn join_slots<'a>(slots: impl IntoIterator<Item = &'a [u8]>) -> Vec<u8> {
    let mut out = Vec::new();
    for slot in slots {
        out.extend_from_slice(slot);
        out.push(TERMINATOR);
    }
    out
}

/// Partial, lazily-extended copy of the device macro buffer
///
/// Slots are stored as raw bytes keyed by index.
#[derive(Debug, Default, Clone)]
pub struct MacroCache {
    slots: BTreeMap<usize, Vec<u8>>,
}

/// Where to resume reading the device buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadCursor {
    /// First slot index not yet cached
    pub next_slot: usize,
    /// Byte offset where that slot starts
    pub offset: usize,
}

/// A contiguous rewrite of the buffer tail
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WritePlan {
    pub offset: usize,
    pub data: Vec<u8>,
}

impl MacroCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, index: usize) -> Option<&[u8]> {
        self.slots.get(&index).map(Vec::as_slice)
    }

    pub fn contains(&self, index: usize) -> bool {
        self.slots.contains_key(&index)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn clear(&mut self) {
        self.slots.clear();
    }

    /// Cursor after the highest contiguously cached slot
    pub fn cursor(&self) -> ReadCursor {
        let mut cursor = ReadCursor {
            next_slot: 0,
            offset: 0,
        };
        while let Some(slot) = self.slots.get(&cursor.next_slot) {
            cursor.offset += slot.len() + 1;
            cursor.next_slot += 1;
        }
        cursor
    }

    /// Store slots read starting at `first`, ignoring indices past `slot_count`
    pub fn absorb(&mut self, first: usize, slots: Vec<Vec<u8>>, slot_count: usize) {
        for (i, slot) in slots.into_iter().enumerate() {
            if first + i < slot_count {
                self.slots.insert(first + i, slot);
            }
        }
    }

    /// Plan a rewrite of `index` with `bytes`
    ///
    /// Requires every slot below `index` to be cached. The plan starts at the
    /// edited slot and covers every cached slot from there on.
    pub fn plan_write(&self, index: usize, bytes: &[u8]) -> Option<WritePlan> {
        if (0..index).any(|i| !self.slots.contains_key(&i)) {
            return None;
        }
        let offset = self.slots.range(..index).map(|(_, s)| s.len() + 1).sum();

        let mut data = Vec::new();
        data.extend_from_slice(bytes);
        data.push(TERMINATOR);
        for (_, slot) in self.slots.range(index + 1..) {
            data.extend_from_slice(slot);
            data.push(TERMINATOR);
        }
        Some(WritePlan { offset, data })
    }

    /// Replace one slot after a successful write
    pub fn store(&mut self, index: usize, bytes: Vec<u8>) {
        self.slots.insert(index, bytes);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_promotion_rule_vectors() {
        assert_eq!(encode_key_action(subtype::TAP, 0x04), vec![1, 1, 0x04]);
        assert_eq!(encode_key_action(subtype::DOWN, 0x0204), vec![1, 6, 0x04, 0x02]);
        assert_eq!(encode_key_action(subtype::UP, 0x5221), vec![1, 7, 0x21, 0x52]);
        // Extended subtype demoted for small keycodes
        assert_eq!(encode_key_action(subtype::EXT_TAP, 0xE1), vec![1, 1, 0xE1]);
        assert_eq!(encode_key_action(subtype::EXT_UP, 0x2129), vec![1, 7, 0x29, 0x21]);
        // Unset key
        assert!(encode_key_action(subtype::TAP, 0).is_empty());
        assert!(encode_key_action(subtype::EXT_DOWN, 0).is_empty());
    }

    #[test]
    fn test_delay_encoding() {
        assert_eq!(encode_delay(0), vec![1, 4, 1, 1]);
        assert_eq!(encode_delay(500), vec![1, 4, 246, 2]);
        assert_eq!(encode_delay(255), vec![1, 4, 1, 2]);
        assert_eq!(encode_delay(MAX_DELAY_MS), vec![1, 4, 255, 255]);
        assert_eq!(encode_delay(u16::MAX), encode_delay(MAX_DELAY_MS));
    }

    #[test]
    fn test_parse_mixed_slot() {
        let slot = [b'h', b'i', 1, 1, 0x28, 1, 4, 246, 2, 1, 5, 0x04, 0x02, b'!'];
        assert_eq!(
            parse_actions(&slot),
            vec![
                MacroAction::text("hi"),
                MacroAction::Tap(0x28),
                MacroAction::Delay(500),
                MacroAction::Tap(0x0204),
                MacroAction::text("!"),
            ]
        );
    }

    #[test]
    fn test_parse_drops_unknown_and_truncated() {
        assert_eq!(
            parse_actions(&[1, 9, b'a', 1, 2]),
            vec![MacroAction::text("a")]
        );
        assert_eq!(parse_actions(&[b'x', 1, 5, 0x04]), vec![MacroAction::text("x")]);
        assert!(parse_actions(&[1]).is_empty());
    }

    #[test]
    fn test_parse_serialize_idempotent() {
        let actions = vec![
            MacroAction::Delay(0),
            MacroAction::text("Hello"),
            MacroAction::Delay(500),
            MacroAction::Tap(0x04),
            MacroAction::Down(0xE1),
            MacroAction::Tap(0x2129),
            MacroAction::Up(0xE1),
            MacroAction::text("."),
        ];
        let bytes = serialize_actions(&actions).unwrap();
        assert_eq!(parse_actions(&bytes), actions);
    }

    #[test]
    fn test_serialize_drops_unset_keys() {
        let bytes = serialize_actions(&[MacroAction::Tap(0), MacroAction::text("a")]).unwrap();
        assert_eq!(bytes, b"a".to_vec());
    }

    #[test]
    fn test_text_cannot_hold_escape() {
        let err = serialize_actions(&[MacroAction::Text(vec![b'a', 0x01])]).unwrap_err();
        assert!(matches!(err, KeyboardError::InvalidParameter(_)));
    }

    #[test]
    fn test_extended_zero_low_byte_is_written_verbatim() {
        // 0x0200 has a zero low byte; it lands in the slot unchanged
        let bytes = serialize_actions(&[MacroAction::Tap(0x0200)]).unwrap();
        assert_eq!(bytes, vec![1, 5, 0x00, 0x02]);
    }

    #[test]
    fn test_multi_slot_law() {
        let slots = vec![
            vec![MacroAction::text("one")],
            vec![],
            vec![MacroAction::Tap(0x04), MacroAction::Delay(20)],
        ];
        let encoded: Vec<Vec<u8>> = slots
            .iter()
            .map(|s| serialize_actions(s).unwrap())
            .collect();
        let mut buffer = join_slots(encoded.iter().map(Vec::as_slice));
        // Unused storage after the last slot
        buffer.extend([0u8; 4]);

        let parsed: Vec<Vec<MacroAction>> = split_slots(&buffer)
            .iter()
            .take(slots.len())
            .map(|s| parse_actions(s))
            .collect();
        assert_eq!(parsed, slots);
    }

    #[test]
    fn test_split_drops_incomplete_tail() {
        assert_eq!(split_slots(b"ab\0cd"), vec![b"ab".to_vec()]);
        assert!(split_slots(b"").is_empty());
    }

    #[test]
    fn test_cache_cursor_stops_at_gap() {
        let mut cache = MacroCache::new();
        cache.absorb(0, vec![b"abc".to_vec(), b"".to_vec()], 8);
        cache.store(3, b"zz".to_vec());
        assert_eq!(
            cache.cursor(),
            ReadCursor {
                next_slot: 2,
                offset: 5
            }
        );
    }

    #[test]
    fn test_cache_absorb_respects_count() {
        let mut cache = MacroCache::new();
        cache.absorb(0, vec![vec![], vec![], vec![]], 2);
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_plan_write_rewrites_tail_only() {
        let mut cache = MacroCache::new();
        cache.absorb(0, vec![b"aa".to_vec(), b"bbb".to_vec(), b"c".to_vec()], 3);

        let plan = cache.plan_write(1, b"XY").unwrap();
        assert_eq!(plan.offset, 3);
        assert_eq!(plan.data, b"XY\0c\0".to_vec());
    }

    #[test]
    fn test_plan_write_needs_lower_slots() {
        let mut cache = MacroCache::new();
        cache.store(1, b"b".to_vec());
        assert!(cache.plan_write(1, b"x").is_none());
        assert_eq!(cache.plan_write(0, b"x").unwrap().offset, 0);
    }
}
