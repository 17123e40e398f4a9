//! Keycode capability table
//!
//! The table is embedded JSON in the QMK constants format: a map of keycode
//! values to `{group, key, label, aliases}` and a map of named sub-ranges.
//! It is parsed once on first use and shared for the process lifetime.

use std::collections::{BTreeMap, HashMap};
use std::sync::OnceLock;

use serde::{Deserialize, Deserializer};

use crate::error::KeyboardError;

/// Embedded QMK keycode constants
const KEYCODES_JSON: &str = include_str!("keycodes.json");

static TABLE: OnceLock<CapabilityTable> = OnceLock::new();

/// Get the process-wide capability table
pub fn capability_table() -> &'static CapabilityTable {
    TABLE.get_or_init(|| {
        CapabilityTable::from_json(KEYCODES_JSON).expect("embedded keycode table is valid")
    })
}

/// One direct keycode entry
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct KeycodeEntry {
    pub group: String,
    pub key: String,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub aliases: Vec<String>,
}

impl KeycodeEntry {
    /// Display label: explicit label, else first alias, else the key name
    pub fn display_label(&self) -> &str {
        self.label
            .as_deref()
            .or_else(|| self.aliases.first().map(String::as_str))
            .unwrap_or(&self.key)
    }
}

/// Inclusive numeric keycode interval
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct KeycodeRange {
    #[serde(deserialize_with = "hex_u16")]
    pub start: u16,
    #[serde(deserialize_with = "hex_u16")]
    pub end: u16,
}

impl KeycodeRange {
    pub const fn new(start: u16, end: u16) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, value: u16) -> bool {
        (self.start..=self.end).contains(&value)
    }
}

/// Named sub-ranges used by the decoder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct Ranges {
    #[serde(rename = "QK_BASIC")]
    pub basic: KeycodeRange,
    #[serde(rename = "QK_MODS")]
    pub mods: KeycodeRange,
    #[serde(rename = "QK_MOD_TAP")]
    pub mod_tap: KeycodeRange,
    #[serde(rename = "QK_LAYER_TAP")]
    pub layer_tap: KeycodeRange,
    #[serde(rename = "QK_LAYER_MOD")]
    pub layer_mod: KeycodeRange,
    #[serde(rename = "QK_TO")]
    pub to: KeycodeRange,
    #[serde(rename = "QK_MOMENTARY")]
    pub momentary: KeycodeRange,
    #[serde(rename = "QK_DEF_LAYER")]
    pub def_layer: KeycodeRange,
    #[serde(rename = "QK_TOGGLE_LAYER")]
    pub toggle_layer: KeycodeRange,
    #[serde(rename = "QK_ONE_SHOT_LAYER")]
    pub one_shot_layer: KeycodeRange,
    #[serde(rename = "QK_ONE_SHOT_MOD")]
    pub one_shot_mod: KeycodeRange,
    #[serde(rename = "QK_LAYER_TAP_TOGGLE")]
    pub layer_tap_toggle: KeycodeRange,
    #[serde(rename = "QK_TAP_DANCE")]
    pub tap_dance: KeycodeRange,
    #[serde(rename = "QK_MACRO")]
    pub macros: KeycodeRange,
    #[serde(rename = "QK_KB")]
    pub kb: KeycodeRange,
}

impl Default for Ranges {
    fn default() -> Self {
        // Empty intervals: start > end never matches
        let none = KeycodeRange::new(u16::MAX, 0);
        Self {
            basic: none,
            mods: none,
            mod_tap: none,
            layer_tap: none,
            layer_mod: none,
            to: none,
            momentary: none,
            def_layer: none,
            toggle_layer: none,
            one_shot_layer: none,
            one_shot_mod: none,
            layer_tap_toggle: none,
            tap_dance: none,
            macros: none,
            kb: none,
        }
    }
}

#[derive(Deserialize)]
struct RawTable {
    version: String,
    ranges: Ranges,
    keycodes: HashMap<String, KeycodeEntry>,
}

/// Read-only keycode capability table
#[derive(Debug, Default)]
pub struct CapabilityTable {
    version: String,
    ranges: Ranges,
    entries: BTreeMap<u16, KeycodeEntry>,
    by_name: HashMap<String, u16>,
}

impl CapabilityTable {
    /// Parse a table from QMK-constants JSON
    pub fn from_json(json: &str) -> Result<Self, KeyboardError> {
        let raw: RawTable = serde_json::from_str(json)
            .map_err(|e| KeyboardError::Definition(format!("keycode table: {e}")))?;

        let mut entries = BTreeMap::new();
        for (value, entry) in raw.keycodes {
            let value = parse_hex(&value).ok_or_else(|| {
                KeyboardError::Definition(format!("bad keycode value {value:?}"))
            })?;
            entries.insert(value, entry);
        }

        let mut by_name = HashMap::new();
        for (&value, entry) in &entries {
            by_name.insert(entry.key.clone(), value);
            for alias in &entry.aliases {
                by_name.entry(alias.clone()).or_insert(value);
            }
        }

        Ok(Self {
            version: raw.version,
            ranges: raw.ranges,
            entries,
            by_name,
        })
    }

    /// Constants format version
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Named sub-ranges
    pub fn ranges(&self) -> &Ranges {
        &self.ranges
    }

    /// Direct entry for a value
    pub fn get(&self, value: u16) -> Option<&KeycodeEntry> {
        self.entries.get(&value)
    }

    /// Look up a direct entry by key name or alias
    pub fn value_of(&self, name: &str) -> Option<u16> {
        self.by_name.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn parse_hex(s: &str) -> Option<u16> {
    match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u16::from_str_radix(hex, 16).ok(),
        None => s.parse().ok(),
    }
}

fn hex_u16<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u16, D::Error> {
    let s = String::deserialize(deserializer)?;
    parse_hex(&s).ok_or_else(|| serde::de::Error::custom(format!("bad hex value {s:?}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embedded_table_loads() {
        let table = capability_table();
        assert!(!table.is_empty());
        assert_eq!(table.version(), "0.0.3");
        assert_eq!(table.get(0x04).map(|e| e.key.as_str()), Some("KC_A"));
    }

    #[test]
    fn test_ranges_are_inclusive() {
        let ranges = capability_table().ranges();
        assert!(ranges.mods.contains(0x0100));
        assert!(ranges.mods.contains(0x1FFF));
        assert!(!ranges.mods.contains(0x2000));
        assert!(ranges.mod_tap.contains(0x2000));
        assert_eq!(ranges.kb, KeycodeRange::new(0x7E00, 0x7E3F));
    }

    #[test]
    fn test_lookup_by_alias() {
        let table = capability_table();
        assert_eq!(table.value_of("KC_ENTER"), Some(0x28));
        assert_eq!(table.value_of("KC_ENT"), Some(0x28));
        assert_eq!(table.value_of("_______"), Some(0x01));
        assert_eq!(table.value_of("KC_NOPE"), None);
    }

    #[test]
    fn test_label_fallback() {
        let table = capability_table();
        // No label, falls back to first alias
        assert_eq!(table.get(0x00).map(|e| e.display_label()), Some("XXXXXXX"));
        assert_eq!(table.get(0x28).map(|e| e.display_label()), Some("Enter"));
        // No label and no aliases
        assert_eq!(table.get(0x66).map(|e| e.display_label()), Some("KC_KB_POWER"));
    }

    #[test]
    fn test_malformed_table_is_rejected() {
        assert!(matches!(
            CapabilityTable::from_json("not json"),
            Err(KeyboardError::Definition(_))
        ));
        let bad_value = r#"{"version": "0.0.1", "keycodes": {"0xZZ": {"group": "basic", "key": "KC_A"}}}"#;
        assert!(matches!(
            CapabilityTable::from_json(bad_value),
            Err(KeyboardError::Definition(_))
        ));
    }

    #[test]
    fn test_parse_hex() {
        assert_eq!(parse_hex("0x7E00"), Some(0x7E00));
        assert_eq!(parse_hex("42"), Some(42));
        assert_eq!(parse_hex("0xZZ"), None);
    }

    #[test]
    fn test_default_ranges_match_nothing() {
        let ranges = Ranges::default();
        assert!(!ranges.basic.contains(0));
        assert!(!ranges.kb.contains(0x7E00));
    }
}
