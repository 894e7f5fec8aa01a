//! Device Capability Layer
//!
//! Abstract handle over a physical instrument. The wire-level driver lives
//! behind [`DeviceBackend`]; the rest of the crate only talks to
//! [`DeviceHandle`].
//!
//! # Components
//!
//! - [`DeviceBackend`] / [`DeviceHandle`]: Capability traits a driver implements
//! - [`BackendRegistry`]: Resolves an instrument's backend identifier
//! - [`DeviceGate`]: Per-resource mutex so one device is never driven twice at once
//! - [`sim`]: In-process simulated backend

mod attribute;
mod error;
mod gate;
mod registry;
pub mod sim;
mod traits;

pub use attribute::{AttributeSetting, AttributeValue};
pub use error::DeviceError;
pub use gate::DeviceGate;
pub use registry::BackendRegistry;
pub use traits::{DeviceBackend, DeviceHandle, LockMode, OpenOptions};
