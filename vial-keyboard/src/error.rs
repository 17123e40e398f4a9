//! Keyboard client error types

use thiserror::Error;
use vial_transport::TransportError;

/// Errors from keyboard operations
#[derive(Error, Debug)]
pub enum KeyboardError {
    /// Transport layer error
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Invalid parameter value
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Feature not supported by this device
    #[error("Feature not supported: {0}")]
    NotSupported(String),

    /// Device returned unexpected response
    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),

    /// Keyboard definition could not be decompressed or parsed
    #[error("Invalid keyboard definition: {0}")]
    Definition(String),
}

impl KeyboardError {
    /// Whether the underlying cause is a closed or failed connection
    pub fn is_connection_lost(&self) -> bool {
        matches!(
            self,
            KeyboardError::Transport(
                TransportError::Disconnected
                    | TransportError::HidError(_)
                    | TransportError::LinkError(_)
            )
        )
    }
}
