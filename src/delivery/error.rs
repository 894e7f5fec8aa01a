//! Delivery error types.

use thiserror::Error;

/// Errors raised while delivering a block.
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// Request could not be sent or the connection failed.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Aggregator answered with something other than 201.
    #[error("aggregator rejected block with HTTP {status}: {body}")]
    Rejected { status: u16, body: String },

    /// Acknowledgement body was not in the expected format.
    #[error("unexpected acknowledgement format: {0}")]
    ServerFormat(String),

    /// Delivery settings are unusable.
    #[error("invalid delivery target: {0}")]
    InvalidTarget(String),
}
