//! Decoded configuration snapshot for backup and restore
//!
//! Keycodes are stored by symbolic name so a snapshot stays readable and
//! survives firmware keycode renumbering. Names that no longer resolve are
//! restored as `KC_NO`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::dynamic::{Combo, KeyOverride, OverrideOptions, TapDance};
use crate::error::KeyboardError;
use crate::keycode::KeycodeConverter;

/// Format version written by this crate
pub const SNAPSHOT_VERSION: u32 = 1;

fn resolve(converter: &KeycodeConverter, name: &str) -> u16 {
    converter.resolve(name).unwrap_or_else(|| {
        warn!("Unknown keycode name {:?}, restoring as KC_NO", name);
        0
    })
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TapDanceConfig {
    pub on_tap: String,
    pub on_hold: String,
    pub on_double_tap: String,
    pub on_tap_hold: String,
    pub tapping_term: u16,
}

impl TapDanceConfig {
    pub fn from_entry(entry: &TapDance, converter: &KeycodeConverter) -> Self {
        Self {
            on_tap: converter.name(entry.on_tap),
            on_hold: converter.name(entry.on_hold),
            on_double_tap: converter.name(entry.on_double_tap),
            on_tap_hold: converter.name(entry.on_tap_hold),
            tapping_term: entry.tapping_term,
        }
    }

    pub fn to_entry(&self, converter: &KeycodeConverter) -> TapDance {
        TapDance {
            on_tap: resolve(converter, &self.on_tap),
            on_hold: resolve(converter, &self.on_hold),
            on_double_tap: resolve(converter, &self.on_double_tap),
            on_tap_hold: resolve(converter, &self.on_tap_hold),
            tapping_term: self.tapping_term,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComboConfig {
    pub key1: String,
    pub key2: String,
    pub key3: String,
    pub key4: String,
    pub output: String,
}

impl ComboConfig {
    pub fn from_entry(entry: &Combo, converter: &KeycodeConverter) -> Self {
        let [k1, k2, k3, k4] = entry.keys.map(|k| converter.name(k));
        Self {
            key1: k1,
            key2: k2,
            key3: k3,
            key4: k4,
            output: converter.name(entry.output),
        }
    }

    pub fn to_entry(&self, converter: &KeycodeConverter) -> Combo {
        Combo {
            keys: [&self.key1, &self.key2, &self.key3, &self.key4].map(|k| resolve(converter, k)),
            output: resolve(converter, &self.output),
        }
    }
}

/// Key override with symbolic trigger and replacement, numeric masks
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OverrideConfig {
    pub trigger: String,
    pub replacement: String,
    pub layers: u16,
    pub trigger_mods: u8,
    pub negative_mod_mask: u8,
    pub suppressed_mods: u8,
    pub options: u8,
}

impl OverrideConfig {
    pub fn from_entry(entry: &KeyOverride, converter: &KeycodeConverter) -> Self {
        Self {
            trigger: converter.name(entry.trigger),
            replacement: converter.name(entry.replacement),
            layers: entry.layers,
            trigger_mods: entry.trigger_mods,
            negative_mod_mask: entry.negative_mod_mask,
            suppressed_mods: entry.suppressed_mods,
            options: entry.options.0,
        }
    }

    pub fn to_entry(&self, converter: &KeycodeConverter) -> KeyOverride {
        KeyOverride {
            trigger: resolve(converter, &self.trigger),
            replacement: resolve(converter, &self.replacement),
            layers: self.layers,
            trigger_mods: self.trigger_mods,
            negative_mod_mask: self.negative_mod_mask,
            suppressed_mods: self.suppressed_mods,
            options: OverrideOptions(self.options),
        }
    }
}

/// Everything needed to restore a keyboard's configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyboardSnapshot {
    pub version: u32,
    /// Vial keyboard UID, hex
    pub uid: String,
    pub via_protocol: u16,
    pub vial_protocol: u32,
    #[serde(default)]
    pub layout_options: u32,
    /// Symbolic keycode per matrix position, per layer
    pub layers: Vec<Vec<String>>,
    /// `[counter-clockwise, clockwise]` per encoder, per layer
    #[serde(default)]
    pub encoders: Vec<Vec<[String; 2]>>,
    #[serde(default)]
    pub tap_dance: Vec<TapDanceConfig>,
    #[serde(default)]
    pub combo: Vec<ComboConfig>,
    #[serde(default)]
    pub key_override: Vec<OverrideConfig>,
    #[serde(default)]
    pub quantum_settings: BTreeMap<u16, u32>,
}

impl KeyboardSnapshot {
    pub fn to_json(&self) -> Result<String, KeyboardError> {
        serde_json::to_string_pretty(self)
            .map_err(|e| KeyboardError::InvalidParameter(format!("snapshot: {e}")))
    }

    pub fn from_json(json: &str) -> Result<Self, KeyboardError> {
        let snapshot: Self = serde_json::from_str(json)
            .map_err(|e| KeyboardError::InvalidParameter(format!("snapshot: {e}")))?;
        if snapshot.version > SNAPSHOT_VERSION {
            return Err(KeyboardError::NotSupported(format!(
                "snapshot version {} is newer than {}",
                snapshot.version, SNAPSHOT_VERSION
            )));
        }
        Ok(snapshot)
    }

    /// Resolve every layer to keycode values
    pub fn layer_values(&self, converter: &KeycodeConverter) -> Vec<Vec<u16>> {
        self.layers
            .iter()
            .map(|layer| layer.iter().map(|name| resolve(converter, name)).collect())
            .collect()
    }

    /// Resolve every encoder to `[ccw, cw]` keycode values
    pub fn encoder_values(&self, converter: &KeycodeConverter) -> Vec<Vec<[u16; 2]>> {
        self.encoders
            .iter()
            .map(|layer| {
                layer
                    .iter()
                    .map(|[ccw, cw]| [resolve(converter, ccw), resolve(converter, cw)])
                    .collect()
            })
            .collect()
    }
}
