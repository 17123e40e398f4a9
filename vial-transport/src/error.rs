//! Transport error types

use thiserror::Error;

/// Errors that can occur during transport and command-channel operations
#[derive(Error, Debug)]
pub enum TransportError {
    // Common errors
    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    #[error("Device disconnected")]
    Disconnected,

    #[error("Command timed out waiting for a response")]
    Timeout,

    #[error("Batch incomplete: expected {expected} responses, received {received}")]
    BatchIncomplete { expected: usize, received: usize },

    #[error("Report too large: {len} bytes exceeds report size {max}")]
    ReportTooLarge { len: usize, max: usize },

    // HID-specific errors
    #[error("HID error: {0}")]
    HidError(String),

    #[error("HID permission denied: {0}")]
    HidPermissionDenied(String),

    // BLE-specific
    #[error("BLE link error: {0}")]
    LinkError(String),

    // Generic
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<hidapi::HidError> for TransportError {
    fn from(e: hidapi::HidError) -> Self {
        let msg = e.to_string();
        if msg.contains("Permission denied") || msg.contains("EPERM") {
            TransportError::HidPermissionDenied(msg)
        } else {
            TransportError::HidError(msg)
        }
    }
}
