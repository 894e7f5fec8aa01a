//! Command Executor
//!
//! Runs one [`Command`](crate::instrument::Command) against an open device
//! handle and reports an [`Outcome`]. The executor owns the per-command
//! protocol: attribute overrides are set and read back, the requested lock is
//! taken, the method runs, and the lock is always released.
//!
//! # Components
//!
//! - [`CommandExecutor`]: Per-command protocol driver
//! - [`Method`] / [`MethodOp`]: Enum-keyed method registry
//! - [`Outcome`] / [`OutcomeState`]: Result classification

mod codec;
mod command;
mod method;
mod outcome;

pub use codec::{decode_hex, encode_hex};
pub use command::{AttributeVerifyError, CommandExecutor, apply_attributes};
pub use method::{Method, MethodOp};
pub use outcome::{Outcome, OutcomeState};
