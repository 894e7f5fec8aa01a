//! Delivery Layer
//!
//! Relays staged readings to the remote aggregator in bounded blocks and
//! deletes exactly the blocks the aggregator acknowledged with HTTP 201.
//! Anything else leaves the block staged for the next cycle, so a block may
//! be delivered more than once but is never dropped by delivery.
//!
//! # Components
//!
//! - [`DeliveryDispatcher`]: Entry point of the `send` trigger
//! - [`DeliveryPayload`]: Wire format of one block
//! - [`DeliveryConfig`]: Endpoint, credentials and batching

mod dispatcher;
mod error;
mod payload;

pub use dispatcher::{
    DEFAULT_BATCH_LIMIT, DEFAULT_DELIVERY_TIMEOUT, DeliveryConfig, DeliveryDispatcher,
    DispatchSummary,
};
pub use error::DeliveryError;
pub use payload::{DATE_FORMAT, DeliveryEntry, DeliveryPayload};
