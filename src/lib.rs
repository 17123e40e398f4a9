//! VIA/Vial keyboard driver
//!
//! Shared pieces of the `vialctl` binary: the settings file and device
//! selection. The protocol itself lives in `vial-transport` and
//! `vial-keyboard`.

pub mod config;
pub mod device;

pub use config::{DeviceSelector, DriverConfig, Timeouts};
pub use device::{list_devices, open_keyboard, pick_device};
