// CLI definitions using clap

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use vial_driver::DriverConfig;

#[derive(Parser)]
#[command(name = "vialctl")]
#[command(author, version, about = "VIA/Vial keyboard configuration tool")]
#[command(propagate_version = true)]
pub struct Cli {
    /// Config file (default: ~/.config/vialctl/config.toml)
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Log filter, e.g. "debug" or "vial_transport=trace" (overrides RUST_LOG)
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Vendor id of the keyboard (hex, e.g. 3434 or 0x3434)
    #[arg(long, global = true, value_parser = parse_hex_u16)]
    pub vid: Option<u16>,

    /// Product id of the keyboard (hex)
    #[arg(long, global = true, value_parser = parse_hex_u16)]
    pub pid: Option<u16>,

    /// Command response timeout in milliseconds
    #[arg(long, global = true)]
    pub timeout_ms: Option<u64>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

impl Cli {
    /// Apply command-line overrides on top of the file settings
    pub fn apply(&self, config: &mut DriverConfig) {
        if let Some(vid) = self.vid {
            config.device.vid = Some(vid);
        }
        if let Some(pid) = self.pid {
            config.device.pid = Some(pid);
        }
        if let Some(ms) = self.timeout_ms {
            config.timeouts.command_ms = ms;
        }
    }
}

#[derive(Subcommand)]
pub enum Commands {
    // === Utility Commands ===
    /// List connected VIA/Vial keyboards
    #[command(visible_alias = "ls")]
    List,

    // === Query Commands ===
    /// Show protocol versions, keyboard id and table sizes
    #[command(visible_aliases = ["version", "i"])]
    Info,

    // === Keymap Commands ===
    /// Show the keymap
    #[command(visible_alias = "km")]
    Keymap {
        /// Only this layer (default: all layers)
        #[arg(short, long)]
        layer: Option<u8>,
    },

    /// Assign a keycode to one key
    #[command(visible_alias = "sk")]
    SetKey {
        layer: u8,
        row: u8,
        col: u8,
        /// Keycode name (KC_A, LCTL(KC_C), MO(1)) or number (0x04)
        key: String,
    },

    // === Macro Commands ===
    /// Show one macro
    Macro {
        /// Macro slot index
        index: u8,
    },

    /// Replace a macro with literal text
    SetMacro {
        index: u8,
        text: String,
    },

    // === Dynamic Entry Commands ===
    /// Show tap-dance entries
    #[command(visible_alias = "td")]
    Tapdance,

    /// Show combo entries
    Combo,

    /// Show key-override entries
    #[command(visible_alias = "ko")]
    Override,

    // === QMK Settings ===
    /// Show QMK settings supported by the firmware
    #[command(visible_alias = "qmk")]
    QmkSettings,

    /// Change one QMK setting
    SetQmk {
        /// Setting id
        id: u16,
        /// New value (decimal or 0x-prefixed hex)
        #[arg(value_parser = parse_number_u32)]
        value: u32,
    },

    // === Backup Commands ===
    /// Save the decoded configuration to a JSON file
    Backup { file: PathBuf },

    /// Restore a configuration saved with `backup`
    Restore { file: PathBuf },

    /// Reset the keyboard EEPROM to firmware defaults
    ResetEeprom,
}

/// Parse a hex number with or without `0x`
pub fn parse_hex_u16(s: &str) -> Result<u16, String> {
    let digits = s
        .strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s);
    u16::from_str_radix(digits, 16).map_err(|e| format!("invalid hex id '{s}': {e}"))
}

/// Parse a decimal number, or hex with a `0x` prefix
pub fn parse_number_u32(s: &str) -> Result<u32, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => s.parse(),
    };
    parsed.map_err(|e| format!("invalid number '{s}': {e}"))
}
