//! Trigger Layer
//!
//! Periodic scheduling of the three entry points (`collect`, `send`,
//! `clean`). Each registered trigger is single-flight: a firing that arrives
//! while the previous run of the same trigger is still going is skipped.
//!
//! # Components
//!
//! - [`Trigger`]: Entry point with a name and a [`Schedule`]
//! - [`TriggerRegistry`]: Scheduler lifecycle and graceful shutdown
//! - [`CollectTrigger`] / [`SendTrigger`] / [`CleanTrigger`]: Entry point adapters

mod jobs;
mod registry;
mod traits;

pub use jobs::{CleanTrigger, CollectTrigger, SendTrigger};
pub use registry::{DEFAULT_SHUTDOWN_TIMEOUT, JobInfo, TriggerRegistry};
pub use traits::{MIN_INTERVAL, Schedule, Trigger, TriggerError};
