//! Keycode codec
//!
//! Maps 16-bit QMK keycodes to structured [`Keycode`] descriptions and back.
//! Decoding never fails: values outside every known range decode to an
//! `Any(n)` keycode carrying the raw value.
//!
//! Precedence:
//! 1. Device custom keycodes (bounded prefix of the `QK_KB` range)
//! 2. Direct entries of the capability table
//! 3. Composite ranges (modified, mod-tap, layer-tap, layer functions, ...)
//! 4. `Any(n)` fallback

mod table;

pub use table::{capability_table, CapabilityTable, KeycodeEntry, KeycodeRange, Ranges};

use std::collections::HashMap;
use std::fmt;
use std::sync::OnceLock;

use serde::{Deserialize, Serialize};

// ============================================================================
// Modifiers
// ============================================================================

/// 5-bit QMK modifier mask as found in bits 8-12 of composite keycodes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModifierBits(pub u8);

impl ModifierBits {
    pub const NONE: Self = Self(0);
    pub const CTRL: Self = Self(0x01);
    pub const SHIFT: Self = Self(0x02);
    pub const ALT: Self = Self(0x04);
    pub const GUI: Self = Self(0x08);
    /// Right-hand variants of the other bits
    pub const USE_RIGHT: Self = Self(0x10);

    const NAMES: [(Self, &'static str, &'static str); 4] = [
        (Self::CTRL, "Ctrl", "CTL"),
        (Self::SHIFT, "Shift", "SFT"),
        (Self::ALT, "Alt", "ALT"),
        (Self::GUI, "GUI", "GUI"),
    ];

    pub const fn bits(self) -> u8 {
        self.0 & 0x1F
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn is_right(self) -> bool {
        self.contains(Self::USE_RIGHT)
    }

    fn has_any_modifier(self) -> bool {
        self.0 & 0x0F != 0
    }

    /// Editor label: `"Ctrl+Shift*"` for right-hand, `"*Ctrl+Shift"` otherwise
    pub fn label(self) -> String {
        let names: Vec<&str> = Self::NAMES
            .iter()
            .filter(|(bit, _, _)| self.contains(*bit))
            .map(|(_, name, _)| *name)
            .collect();
        let joined = names.join("+");
        if self.is_right() {
            format!("{joined}*")
        } else {
            format!("*{joined}")
        }
    }

    /// QMK function names, e.g. `["LCTL", "LSFT"]`
    fn function_names(self) -> Vec<String> {
        let side = if self.is_right() { 'R' } else { 'L' };
        Self::NAMES
            .iter()
            .filter(|(bit, _, _)| self.contains(*bit))
            .map(|(_, _, code)| format!("{side}{code}"))
            .collect()
    }

    /// QMK mod-mask expression, e.g. `"MOD_LCTL|MOD_LSFT"`
    fn mask_name(self) -> Option<String> {
        if !self.has_any_modifier() {
            return None;
        }
        let names: Vec<String> = self
            .function_names()
            .into_iter()
            .map(|n| format!("MOD_{n}"))
            .collect();
        Some(names.join("|"))
    }
}

impl std::ops::BitOr for ModifierBits {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self((self.0 | rhs.0) & 0x1F)
    }
}

// ============================================================================
// Keycode
// ============================================================================

/// Which decoding arm produced a keycode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum KeycodeKind {
    Custom,
    Direct,
    Modified,
    ModTap,
    LayerTap,
    LayerMod,
    To,
    Momentary,
    DefaultLayer,
    ToggleLayer,
    OneShotLayer,
    OneShotMod,
    LayerTapToggle,
    TapDance,
    Macro,
    Unknown,
}

/// Keyboard-specific keycode declared by the device definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomKeycode {
    pub name: String,
    #[serde(default)]
    pub title: String,
    #[serde(rename = "shortName", default)]
    pub short_name: String,
}

/// Decoded keycode
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Keycode {
    /// Raw device value
    pub value: u16,
    /// Symbolic name, unique per value
    pub key: String,
    /// Display label (the tap side for composites)
    pub label: String,
    pub group: Option<String>,
    pub kind: KeycodeKind,
    /// Rendered modifier mask of a modified keycode
    pub modifier_label: Option<String>,
    /// Rendered hold side of a mod-tap or layer-tap keycode
    pub hold_label: Option<String>,
}

impl Keycode {
    fn simple(value: u16, key: String, group: &str, kind: KeycodeKind) -> Self {
        Self {
            value,
            label: key.clone(),
            key,
            group: Some(group.into()),
            kind,
            modifier_label: None,
            hold_label: None,
        }
    }

    fn unknown(value: u16) -> Self {
        Self::simple(value, format!("Any({value})"), "unknown", KeycodeKind::Unknown)
    }

    /// Tap-side keycode: the base key of composites, else the value itself
    pub fn tap_keycode(&self) -> u16 {
        match self.kind {
            KeycodeKind::Modified | KeycodeKind::ModTap | KeycodeKind::LayerTap => {
                self.value & 0x00FF
            }
            _ => self.value,
        }
    }

    /// Hold-side base of a mod-tap or layer-tap keycode, else 0
    pub fn hold_keycode(&self) -> u16 {
        match self.kind {
            KeycodeKind::ModTap | KeycodeKind::LayerTap => self.value & 0xFF00,
            _ => 0,
        }
    }

    /// Modifier mask of a modified or mod-tap keycode
    pub fn modifiers(&self) -> ModifierBits {
        match self.kind {
            KeycodeKind::Modified | KeycodeKind::ModTap => {
                ModifierBits(((self.value >> 8) & 0x1F) as u8)
            }
            KeycodeKind::OneShotMod => ModifierBits((self.value & 0x1F) as u8),
            _ => ModifierBits::NONE,
        }
    }

    /// Target layer of a layer keycode
    pub fn layer(&self) -> Option<u8> {
        match self.kind {
            KeycodeKind::LayerTap => Some(((self.value >> 8) & 0x0F) as u8),
            KeycodeKind::LayerMod => Some(((self.value >> 5) & 0x0F) as u8),
            KeycodeKind::To
            | KeycodeKind::Momentary
            | KeycodeKind::DefaultLayer
            | KeycodeKind::ToggleLayer
            | KeycodeKind::OneShotLayer
            | KeycodeKind::LayerTapToggle => Some((self.value & 0x1F) as u8),
            _ => None,
        }
    }
}

impl fmt::Display for Keycode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key)
    }
}

// ============================================================================
// Decoding
// ============================================================================

/// Decode a raw value against the embedded capability table
pub fn decode(value: u16, custom: Option<&[CustomKeycode]>) -> Keycode {
    decode_with(capability_table(), value, custom)
}

/// Decode a raw value against an explicit capability table
pub fn decode_with(table: &CapabilityTable, value: u16, custom: Option<&[CustomKeycode]>) -> Keycode {
    let ranges = table.ranges();

    if let Some(custom) = custom {
        if ranges.kb.contains(value) {
            if let Some(entry) = custom.get(usize::from(value - ranges.kb.start)) {
                let label = [&entry.short_name, &entry.title]
                    .into_iter()
                    .find(|s| !s.is_empty())
                    .unwrap_or(&entry.name)
                    .clone();
                return Keycode {
                    value,
                    key: entry.name.clone(),
                    label,
                    group: Some("custom".into()),
                    kind: KeycodeKind::Custom,
                    modifier_label: None,
                    hold_label: None,
                };
            }
        }
    }

    if let Some(entry) = table.get(value) {
        return Keycode {
            value,
            key: entry.key.clone(),
            label: entry.display_label().to_string(),
            group: Some(entry.group.clone()),
            kind: KeycodeKind::Direct,
            modifier_label: None,
            hold_label: None,
        };
    }

    let base = |v: u16| decode_with(table, v & 0x00FF, None);
    let n = value & 0x1F;

    match classify(ranges, value) {
        KeycodeKind::Modified => {
            let mods = ModifierBits(((value >> 8) & 0x1F) as u8);
            let tap = base(value);
            let names = mods.function_names();
            let key = if names.is_empty() {
                format!("Any({value})")
            } else {
                names
                    .iter()
                    .rev()
                    .fold(tap.key.clone(), |inner, name| format!("{name}({inner})"))
            };
            Keycode {
                value,
                key,
                label: tap.label,
                group: Some("modified".into()),
                kind: KeycodeKind::Modified,
                modifier_label: Some(mods.label()),
                hold_label: None,
            }
        }
        KeycodeKind::ModTap => {
            let mods = ModifierBits(((value >> 8) & 0x1F) as u8);
            let tap = base(value);
            let key = match mods.mask_name() {
                Some(mask) => format!("MT({mask},{})", tap.key),
                None => format!("Any({value})"),
            };
            Keycode {
                value,
                key,
                label: tap.label,
                group: Some("mod-tap".into()),
                kind: KeycodeKind::ModTap,
                modifier_label: None,
                hold_label: Some(mods.label()),
            }
        }
        KeycodeKind::LayerTap => {
            let layer = (value >> 8) & 0x0F;
            let tap = base(value);
            Keycode {
                value,
                key: format!("LT({layer},{})", tap.key),
                label: tap.label,
                group: Some("layer-tap".into()),
                kind: KeycodeKind::LayerTap,
                modifier_label: None,
                hold_label: Some(format!("Layer{layer}")),
            }
        }
        KeycodeKind::LayerMod => {
            let layer = (value >> 5) & 0x0F;
            let mods = ModifierBits((value & 0x1F) as u8);
            match mods.mask_name() {
                Some(mask) => Keycode::simple(
                    value,
                    format!("LM({layer},{mask})"),
                    "layers",
                    KeycodeKind::LayerMod,
                ),
                None => Keycode::unknown(value),
            }
        }
        KeycodeKind::OneShotMod => match ModifierBits(n as u8).mask_name() {
            Some(mask) => Keycode::simple(value, format!("OSM({mask})"), "layers", KeycodeKind::OneShotMod),
            None => Keycode::unknown(value),
        },
        kind @ (KeycodeKind::To
        | KeycodeKind::Momentary
        | KeycodeKind::DefaultLayer
        | KeycodeKind::ToggleLayer
        | KeycodeKind::OneShotLayer
        | KeycodeKind::LayerTapToggle) => {
            let name = match kind {
                KeycodeKind::To => "TO",
                KeycodeKind::Momentary => "MO",
                KeycodeKind::DefaultLayer => "DF",
                KeycodeKind::ToggleLayer => "TG",
                KeycodeKind::OneShotLayer => "OSL",
                _ => "TT",
            };
            Keycode::simple(value, format!("{name}({n})"), "layers", kind)
        }
        KeycodeKind::TapDance => Keycode::simple(
            value,
            format!("TD({})", value - ranges.tap_dance.start),
            "tap-dance",
            KeycodeKind::TapDance,
        ),
        KeycodeKind::Macro => Keycode::simple(
            value,
            format!("M{}", value - ranges.macros.start),
            "macro",
            KeycodeKind::Macro,
        ),
        _ => Keycode::unknown(value),
    }
}

/// Ordered range check with an unconditional fallback arm
fn classify(ranges: &Ranges, value: u16) -> KeycodeKind {
    let arms = [
        (ranges.mods, KeycodeKind::Modified),
        (ranges.mod_tap, KeycodeKind::ModTap),
        (ranges.layer_tap, KeycodeKind::LayerTap),
        (ranges.layer_mod, KeycodeKind::LayerMod),
        (ranges.to, KeycodeKind::To),
        (ranges.momentary, KeycodeKind::Momentary),
        (ranges.def_layer, KeycodeKind::DefaultLayer),
        (ranges.toggle_layer, KeycodeKind::ToggleLayer),
        (ranges.one_shot_layer, KeycodeKind::OneShotLayer),
        (ranges.one_shot_mod, KeycodeKind::OneShotMod),
        (ranges.layer_tap_toggle, KeycodeKind::LayerTapToggle),
        (ranges.tap_dance, KeycodeKind::TapDance),
        (ranges.macros, KeycodeKind::Macro),
    ];
    arms.iter()
        .find(|(range, _)| range.contains(value))
        .map(|(_, kind)| *kind)
        .unwrap_or(KeycodeKind::Unknown)
}

// ============================================================================
// Composition
// ============================================================================

/// Compose a keycode from a tap side, a hold side and a modifier mask
///
/// - no hold and a basic tap: modified keycode `tap | mods << 8`
/// - mod-tap base hold: hold's high byte, the mods, tap's low byte
/// - layer-tap base hold: hold's high byte, tap's low byte (mods are dropped)
/// - anything else: `tap` unchanged
pub fn combine(tap: u16, hold: u16, mods: ModifierBits) -> u16 {
    let ranges = capability_table().ranges();
    if hold == 0 && ranges.basic.contains(tap) {
        tap | (u16::from(mods.bits()) << 8)
    } else if ranges.mod_tap.contains(hold) && hold & 0x00FF == 0 {
        (hold & 0xFF00) | (u16::from(mods.bits()) << 8) | (tap & 0x00FF)
    } else if ranges.layer_tap.contains(hold) && hold & 0x00FF == 0 {
        (hold & 0xFF00) | (tap & 0x00FF)
    } else {
        tap
    }
}

// ============================================================================
// Converter
// ============================================================================

/// Decoder bound to one keyboard's custom keycode table
#[derive(Debug, Default)]
pub struct KeycodeConverter {
    custom: Vec<CustomKeycode>,
    names: OnceLock<HashMap<String, u16>>,
}

impl KeycodeConverter {
    pub fn new(custom: Vec<CustomKeycode>) -> Self {
        Self {
            custom,
            names: OnceLock::new(),
        }
    }

    pub fn custom_keycodes(&self) -> &[CustomKeycode] {
        &self.custom
    }

    pub fn decode(&self, value: u16) -> Keycode {
        decode(value, Some(&self.custom))
    }

    /// Symbolic name of a value
    pub fn name(&self, value: u16) -> String {
        self.decode(value).key
    }

    /// Resolve a symbolic name back to its value
    ///
    /// Matches the name any value decodes to, then table aliases.
    pub fn resolve(&self, name: &str) -> Option<u16> {
        let names = self.names.get_or_init(|| {
            let mut names = HashMap::new();
            for value in 0..=u16::MAX {
                names.entry(self.decode(value).key).or_insert(value);
            }
            names
        });
        names
            .get(name)
            .copied()
            .or_else(|| capability_table().value_of(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(value: u16) -> Keycode {
        decode(value, None)
    }

    #[test]
    fn test_direct_entry() {
        let kc = dec(0x04);
        assert_eq!(kc.key, "KC_A");
        assert_eq!(kc.label, "A");
        assert_eq!(kc.kind, KeycodeKind::Direct);
        assert_eq!(kc.group.as_deref(), Some("basic"));
    }

    #[test]
    fn test_modified_left_shift() {
        let kc = dec(0x0204);
        assert_eq!(kc.kind, KeycodeKind::Modified);
        assert_eq!(kc.key, "LSFT(KC_A)");
        assert_eq!(kc.label, "A");
        assert_eq!(kc.modifier_label.as_deref(), Some("*Shift"));
        assert!(kc.modifiers().contains(ModifierBits::SHIFT));
        assert_eq!(kc.tap_keycode(), 0x04);
    }

    #[test]
    fn test_modified_right_hand_label() {
        // Right Ctrl+Alt on KC_DEL
        let kc = dec(0x154C);
        assert_eq!(kc.modifier_label.as_deref(), Some("Ctrl+Alt*"));
        assert_eq!(kc.key, "RCTL(RALT(KC_DELETE))");
    }

    #[test]
    fn test_mod_tap() {
        // MT(MOD_LCTL, KC_ESC)
        let kc = dec(0x2129);
        assert_eq!(kc.kind, KeycodeKind::ModTap);
        assert_eq!(kc.key, "MT(MOD_LCTL,KC_ESCAPE)");
        assert_eq!(kc.label, "Esc");
        assert_eq!(kc.hold_label.as_deref(), Some("*Ctrl"));
        assert_eq!(kc.hold_keycode(), 0x2100);
        assert_eq!(kc.tap_keycode(), 0x29);
    }

    #[test]
    fn test_layer_tap() {
        let kc = dec(0x422C);
        assert_eq!(kc.kind, KeycodeKind::LayerTap);
        assert_eq!(kc.key, "LT(2,KC_SPACE)");
        assert_eq!(kc.hold_label.as_deref(), Some("Layer2"));
        assert_eq!(kc.layer(), Some(2));
    }

    #[test]
    fn test_layer_functions() {
        assert_eq!(dec(0x5221).key, "MO(1)");
        assert_eq!(dec(0x5203).key, "TO(3)");
        assert_eq!(dec(0x5262).key, "TG(2)");
        assert_eq!(dec(0x5240).key, "DF(0)");
        assert_eq!(dec(0x5281).key, "OSL(1)");
        assert_eq!(dec(0x52C4).key, "TT(4)");
        assert_eq!(dec(0x52A2).key, "OSM(MOD_LSFT)");
        assert_eq!(dec(0x5022).key, "LM(1,MOD_LSFT)");
        assert_eq!(dec(0x5221).layer(), Some(1));
    }

    #[test]
    fn test_tap_dance_and_macro() {
        assert_eq!(dec(0x5705).key, "TD(5)");
        assert_eq!(dec(0x7703).key, "M3");
    }

    #[test]
    fn test_unknown_never_rejects() {
        for value in [0x00A0, 0x5400, 0x7B00, 0x8000, 0xFFFF] {
            let kc = dec(value);
            assert_eq!(kc.kind, KeycodeKind::Unknown);
            assert_eq!(kc.key, format!("Any({value})"));
            assert_eq!(kc.label, kc.key);
        }
    }

    #[test]
    fn test_custom_keycodes_bounded_by_table() {
        let custom = vec![
            CustomKeycode {
                name: "CUSTOM_MACRO_0".into(),
                title: "Macro zero".into(),
                short_name: "CM0".into(),
            },
            CustomKeycode {
                name: "CUSTOM_1".into(),
                title: "Custom one".into(),
                short_name: String::new(),
            },
        ];
        let first = decode(0x7E00, Some(&custom));
        assert_eq!(first.kind, KeycodeKind::Custom);
        assert_eq!(first.key, "CUSTOM_MACRO_0");
        assert_eq!(first.label, "CM0");
        assert_eq!(decode(0x7E01, Some(&custom)).label, "Custom one");
        // Past the end of the custom table
        assert_eq!(decode(0x7E02, Some(&custom)).kind, KeycodeKind::Unknown);
    }

    #[test]
    fn test_combine_shift_a() {
        let value = combine(dec(0x04).value, dec(0x00).value, ModifierBits::SHIFT);
        let kc = dec(value);
        assert_eq!(kc.kind, KeycodeKind::Modified);
        assert!(kc.modifiers().contains(ModifierBits::SHIFT));
        assert_eq!(kc.label, "A");
    }

    #[test]
    fn test_combine_layer_tap_drops_mods() {
        let value = combine(0x2C, 0x4300, ModifierBits::CTRL);
        assert_eq!(value, 0x432C);
    }

    #[test]
    fn test_combine_passthrough() {
        // Non-basic tap without hold stays as-is
        assert_eq!(combine(0x5221, 0, ModifierBits::SHIFT), 0x5221);
        // Hold that is not a tap base
        assert_eq!(combine(0x04, 0x0005, ModifierBits::SHIFT), 0x04);
    }

    #[test]
    fn test_composite_ranges_round_trip() {
        let ranges = *capability_table().ranges();
        let probes = |r: KeycodeRange| [r.start, r.start + (r.end - r.start) / 2, r.end];

        for range in [ranges.mods, ranges.mod_tap, ranges.layer_tap] {
            for value in probes(range) {
                let kc = dec(value);
                let rebuilt = combine(kc.tap_keycode(), kc.hold_keycode(), kc.modifiers());
                assert_eq!(rebuilt, value, "value 0x{value:04X} ({:?})", kc.kind);
                assert_eq!(dec(rebuilt).kind, kc.kind);
            }
        }
    }

    #[test]
    fn test_basic_range_round_trip() {
        for value in [0x0000u16, 0x0004, 0x007F, 0x00FF] {
            let kc = dec(value);
            assert_eq!(combine(kc.tap_keycode(), 0, ModifierBits::NONE), value);
        }
    }

    #[test]
    fn test_modifier_label_rendering() {
        assert_eq!((ModifierBits::CTRL | ModifierBits::SHIFT).label(), "*Ctrl+Shift");
        assert_eq!(
            (ModifierBits::GUI | ModifierBits::USE_RIGHT).label(),
            "GUI*"
        );
    }

    #[test]
    fn test_converter_resolve() {
        let converter = KeycodeConverter::new(vec![CustomKeycode {
            name: "USER_BOOT".into(),
            title: String::new(),
            short_name: String::new(),
        }]);
        assert_eq!(converter.resolve("KC_A"), Some(0x04));
        assert_eq!(converter.resolve("LSFT(KC_A)"), Some(0x0204));
        assert_eq!(converter.resolve("MO(1)"), Some(0x5221));
        assert_eq!(converter.resolve("USER_BOOT"), Some(0x7E00));
        assert_eq!(converter.resolve("KC_ENT"), Some(0x28));
        assert_eq!(converter.resolve("Any(41000)"), Some(41000));
        assert_eq!(converter.resolve("NOT_A_KEY"), None);
    }
}
