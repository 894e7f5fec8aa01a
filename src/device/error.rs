//! Device-level error types.

use thiserror::Error;

/// Errors raised by a device backend or handle.
#[derive(Debug, Error)]
pub enum DeviceError {
    /// The resource could not be opened.
    #[error("failed to open resource '{resource}': {reason}")]
    Open { resource: String, reason: String },

    /// Attribute name is not known to the device.
    #[error("attribute not found: {0}")]
    AttributeNotFound(String),

    /// Lock could not be acquired or released.
    #[error("lock error: {0}")]
    Lock(String),

    /// Low-level I/O failure.
    #[error("device I/O error: {0}")]
    Io(String),

    /// Operation exceeded the connection timeout.
    #[error("device timeout elapsed")]
    Timeout,

    /// Payload could not be encoded for the wire.
    #[error("encoding error: {0}")]
    Encoding(String),

    /// Handle was already closed.
    #[error("device handle is closed")]
    Closed,
}
