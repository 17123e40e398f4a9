//! Transport abstraction layer for VIA/Vial keyboard communication
//!
//! This crate provides a unified interface for exchanging fixed-size reports
//! with a programmable keyboard across different transport backends:
//!
//! - Raw HID (USB, usage page 0xFF60)
//! - Nordic UART Service tunnel (Bluetooth LE, 20-byte chunks)
//! - Mock (in-memory, for tests and simulations)
//!
//! On top of the transports sits [`CommandChannel`], which turns the
//! untagged report stream into request/response exchanges and batches.

pub mod ble_nus;
pub mod channel;
pub mod error;
pub mod mock;
pub mod protocol;
pub mod types;

mod callbacks;
mod discovery;
mod hid_raw;

pub use ble_nus::{chunk_for_mtu, GattLink, NusTransport};
pub use callbacks::CallbackSlots;
pub use channel::{ChannelConfig, CommandChannel};
pub use discovery::{DeviceDiscovery, HidDiscovery};
pub use error::TransportError;
pub use hid_raw::HidRawTransport;
pub use mock::MockTransport;
pub use types::{DiscoveredDevice, TransportDeviceInfo, TransportType};

use async_trait::async_trait;
use std::sync::Arc;

/// Callback invoked with every inbound report, in arrival order
pub type ReceiveCallback = Arc<dyn Fn(&[u8]) + Send + Sync>;

/// Callback invoked once when the connection closes or drops
pub type CloseCallback = Arc<dyn Fn() + Send + Sync>;

/// The core transport trait - all backends implement this
///
/// A transport is connection-oriented and message-based. It carries no
/// request/response tagging: inbound reports are delivered to the receive
/// callback in the order the device produced them, and implementations must
/// never reorder or duplicate them.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Get device information
    fn device_info(&self) -> &TransportDeviceInfo;

    /// Check if the connection is still open
    fn is_connected(&self) -> bool;

    /// Maximum report payload accepted by [`Transport::write`]
    fn report_size(&self) -> usize {
        protocol::REPORT_SIZE
    }

    /// Write one report to the device
    ///
    /// # Arguments
    /// * `report` - Report payload (discriminator first), at most `report_size()` bytes.
    ///   Shorter reports are zero-padded by the transport.
    async fn write(&self, report: &[u8]) -> Result<(), TransportError>;

    /// Close the connection
    ///
    /// Fires the close callback if the connection was open.
    async fn close(&self) -> Result<(), TransportError>;

    /// Install or clear the inbound report callback
    fn set_receive_callback(&self, callback: Option<ReceiveCallback>);

    /// Install or clear the close/disconnect callback
    fn set_close_callback(&self, callback: Option<CloseCallback>);
}

/// Type alias for a boxed transport
pub type BoxedTransport = Arc<dyn Transport>;
