//! High-level VIA/Vial keyboard interface
//!
//! This crate provides the codecs and the client API for configuring a
//! Vial-enabled QMK keyboard on top of any transport from `vial-transport`:
//!
//! - keycodes ([`keycode`]) with composite mod-tap/layer-tap decoding
//! - macro action streams ([`macros`])
//! - tap-dance, combo and key-override records ([`dynamic`])
//! - QMK settings ([`quantum`])
//! - paged buffer transfers ([`paged`])
//! - the [`VialKeyboard`] facade and configuration snapshots

pub mod client;
pub mod definition;
pub mod dynamic;
pub mod error;
pub mod keycode;
pub mod macros;
pub mod paged;
pub mod quantum;
pub mod settings;
pub mod snapshot;

pub use client::VialKeyboard;
pub use definition::{KeyboardDefinition, Matrix};
pub use dynamic::{Combo, DynamicEntry, DynamicEntryCounts, KeyOverride, OverrideOptions, TapDance};
pub use error::KeyboardError;
pub use keycode::{combine, decode, CustomKeycode, Keycode, KeycodeConverter, KeycodeKind, ModifierBits};
pub use macros::MacroAction;
pub use settings::{
    EncoderAssignment, EncoderDirection, KeyPosition, UnlockPoll, UnlockStatus, VialKeyboardId,
};
pub use snapshot::{ComboConfig, KeyboardSnapshot, OverrideConfig, TapDanceConfig};

// Re-export transport types consumers need to open a keyboard
pub use vial_transport::{
    ChannelConfig, DeviceDiscovery, DiscoveredDevice, HidDiscovery, Transport, TransportDeviceInfo,
    TransportError, TransportType,
};
