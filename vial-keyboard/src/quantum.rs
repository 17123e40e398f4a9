//! QMK (quantum) settings catalog and value codec
//!
//! Settings are firmware-wide values addressed by a 16-bit id. The device
//! always answers with a 32-bit little-endian word; only the low
//! `byte_width` bytes are meaningful.

use vial_transport::protocol::{vial, vial_report};

/// Byte width of a setting, 1, 2 or 4
pub type ByteWidth = u8;

/// How a setting is edited
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingKind {
    /// Numeric value within an inclusive range
    Range { min: u32, max: u32 },
    /// Bit flags: each option names a bit position
    Flags(&'static [(&'static str, u8)]),
}

/// One catalog entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuantumSetting {
    pub label: &'static str,
    pub id: u16,
    pub width: ByteWidth,
    pub kind: SettingKind,
}

impl QuantumSetting {
    /// Mask a raw device word to this setting's width
    pub fn mask(&self, raw: u32) -> u32 {
        mask_to_width(raw, self.width)
    }

    /// Check a value against the width and range
    pub fn accepts(&self, value: u32) -> bool {
        if value != self.mask(value) {
            return false;
        }
        match self.kind {
            SettingKind::Range { min, max } => (min..=max).contains(&value),
            SettingKind::Flags(options) => {
                let allowed = options.iter().fold(0u32, |acc, (_, bit)| acc | (1 << bit));
                value & !allowed == 0
            }
        }
    }
}

/// Named group of settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuantumPage {
    pub label: &'static str,
    pub settings: &'static [QuantumSetting],
}

const fn range(label: &'static str, id: u16, width: ByteWidth, min: u32, max: u32) -> QuantumSetting {
    QuantumSetting {
        label,
        id,
        width,
        kind: SettingKind::Range { min, max },
    }
}

const fn flags(
    label: &'static str,
    id: u16,
    width: ByteWidth,
    options: &'static [(&'static str, u8)],
) -> QuantumSetting {
    QuantumSetting {
        label,
        id,
        width,
        kind: SettingKind::Flags(options),
    }
}

/// Static settings catalog, grouped for presentation
pub static CATALOG: &[QuantumPage] = &[
    QuantumPage {
        label: "Magic",
        settings: &[flags(
            "Magic",
            21,
            2,
            &[
                ("Swap Control CapsLock", 0),
                ("CapsLock to Control", 1),
                ("Swap LAlt LGUI", 2),
                ("Swap RAlt RGUI", 3),
                ("No GUI", 4),
                ("Swap Grave Esc", 5),
                ("Swap Backslash Backspace", 6),
                ("Swap LCTL LGUI", 8),
                ("Swap RCtl RGUI", 9),
            ],
        )],
    },
    QuantumPage {
        label: "Grave Escape",
        settings: &[flags(
            "Grave Escape Override",
            1,
            1,
            &[
                ("Send Esc if Alt is pressed", 0),
                ("Send Esc if Ctrl is pressed", 1),
                ("Send Esc if GUI is pressed", 2),
                ("Send Esc if Shift is pressed", 3),
            ],
        )],
    },
    QuantumPage {
        label: "Tap-Hold",
        settings: &[
            range("Tapping term [ms]", 7, 2, 0, 0xFFFF),
            flags(
                "Tapping options",
                8,
                1,
                &[
                    ("Permissive hold", 0),
                    ("Ignore Mod Tap interrupt", 1),
                    ("Tapping force hold", 2),
                    ("Retro tapping", 3),
                ],
            ),
            range("Tap code delay [ms]", 18, 2, 0, 500),
            range("Tap hold Caps delay [ms]", 19, 2, 0, 500),
            range("Tapping toggle", 20, 1, 0, 99),
        ],
    },
    QuantumPage {
        label: "Auto Shift",
        settings: &[
            flags(
                "Auto Shift option",
                3,
                1,
                &[
                    ("Enable", 0),
                    ("Enable for modifiers", 1),
                    ("No Auto Shift Special", 2),
                    ("No Auto Shift Numeric", 3),
                    ("No Auto Shift Alpha", 4),
                    ("Enable keyrepeat", 5),
                    ("Disable keyrepeat when timeout is exceeded", 6),
                ],
            ),
            range("Auto Shift timeout", 4, 1, 0, 255),
        ],
    },
    QuantumPage {
        label: "Combo",
        settings: &[range("Combo term [ms]", 2, 2, 0, 500)],
    },
    QuantumPage {
        label: "One Shot Keys",
        settings: &[
            range("Tap toggle count", 5, 1, 0, 50),
            range("One shot key timeout [ms]", 6, 2, 0, 65535),
        ],
    },
    QuantumPage {
        label: "Mouse Keys",
        settings: &[
            range("Mouse key delay [ms]", 9, 2, 0, 500),
            range("Mouse key interval [ms]", 10, 2, 0, 500),
            range("Mouse key move delta", 11, 2, 0, 500),
            range("Mouse key max speed", 12, 2, 0, 500),
            range("Mouse key time to max [ms]", 13, 2, 0, 500),
            range("Mouse key wheel delay [ms]", 14, 2, 0, 500),
            range("Mouse key wheel interval [ms]", 15, 2, 0, 500),
            range("Mouse key wheel max speed", 16, 2, 0, 500),
            range("Mouse key wheel time to max [ms]", 17, 2, 0, 500),
        ],
    },
];

/// Iterate every catalog setting
pub fn all_settings() -> impl Iterator<Item = &'static QuantumSetting> {
    CATALOG.iter().flat_map(|page| page.settings.iter())
}

/// Find a setting by id
pub fn find_setting(id: u16) -> Option<&'static QuantumSetting> {
    all_settings().find(|s| s.id == id)
}

/// Keep the low `width` bytes of a word
pub fn mask_to_width(raw: u32, width: ByteWidth) -> u32 {
    match width {
        1 => raw & 0xFF,
        2 => raw & 0xFFFF,
        _ => raw,
    }
}

/// `[0xFE, 0x09, after_lo, after_hi]`, asking for supported ids above `after`
pub fn query_request(after: u16) -> Vec<u8> {
    vial_report(vial::QMK_SETTINGS_QUERY, &after.to_le_bytes())
}

/// Supported ids from one query response, and whether the list ended
pub fn parse_query_response(response: &[u8]) -> (Vec<u16>, bool) {
    let mut ids = Vec::new();
    for pair in response.chunks_exact(2) {
        let id = u16::from_le_bytes([pair[0], pair[1]]);
        if id == 0xFFFF {
            return (ids, true);
        }
        ids.push(id);
    }
    (ids, false)
}

/// `[0xFE, 0x0A, id_lo, id_hi]`
pub fn get_request(id: u16) -> Vec<u8> {
    vial_report(vial::QMK_SETTINGS_GET, &id.to_le_bytes())
}

/// Raw value of a get response, or `None` on a nonzero status
pub fn parse_get_response(response: &[u8]) -> Option<u32> {
    match response {
        [0, a, b, c, d, ..] => Some(u32::from_le_bytes([*a, *b, *c, *d])),
        _ => None,
    }
}

/// `[0xFE, 0x0B, id_lo, id_hi, value (LE, width bytes)]`
pub fn set_request(id: u16, value: u32, width: ByteWidth) -> Vec<u8> {
    let mut payload = id.to_le_bytes().to_vec();
    let width = usize::from(width.clamp(1, 4));
    payload.extend_from_slice(&value.to_le_bytes()[..width]);
    vial_report(vial::QMK_SETTINGS_SET, &payload)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_catalog_ids_are_unique() {
        let mut seen = HashSet::new();
        for setting in all_settings() {
            assert!(seen.insert(setting.id), "duplicate id {}", setting.id);
        }
        assert_eq!(seen.len(), 21);
    }

    #[test]
    fn test_catalog_widths() {
        assert_eq!(find_setting(21).map(|s| s.width), Some(2));
        assert_eq!(find_setting(7).map(|s| s.width), Some(2));
        assert_eq!(find_setting(4).map(|s| s.width), Some(1));
        assert!(find_setting(99).is_none());
    }

    #[test]
    fn test_mask_to_width() {
        assert_eq!(mask_to_width(0xAABBCCDD, 1), 0xDD);
        assert_eq!(mask_to_width(0xAABBCCDD, 2), 0xCCDD);
        assert_eq!(mask_to_width(0xAABBCCDD, 4), 0xAABBCCDD);
    }

    #[test]
    fn test_accepts() {
        let combo_term = find_setting(2).unwrap();
        assert!(combo_term.accepts(500));
        assert!(!combo_term.accepts(501));

        let magic = find_setting(21).unwrap();
        assert!(magic.accepts(0b11_0000_0001));
        // Bit 7 is not a Magic option
        assert!(!magic.accepts(1 << 7));
    }

    #[test]
    fn test_query_response_terminator() {
        let response = [1, 0, 2, 0, 7, 0, 0xFF, 0xFF, 9, 0];
        assert_eq!(parse_query_response(&response), (vec![1, 2, 7], true));
        let (ids, done) = parse_query_response(&[3, 0, 4, 0]);
        assert_eq!(ids, vec![3, 4]);
        assert!(!done);
    }

    #[test]
    fn test_get_response() {
        assert_eq!(parse_get_response(&[0, 0xC8, 0, 0, 0, 0]), Some(200));
        assert_eq!(parse_get_response(&[1, 0xC8, 0, 0, 0]), None);
        assert_eq!(parse_get_response(&[0, 1]), None);
    }

    #[test]
    fn test_requests() {
        assert_eq!(get_request(21), vec![0xFE, 0x0A, 21, 0]);
        assert_eq!(set_request(7, 200, 2), vec![0xFE, 0x0B, 7, 0, 200, 0]);
        assert_eq!(query_request(0x0100), vec![0xFE, 0x09, 0x00, 0x01]);
    }
}
