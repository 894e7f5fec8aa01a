//! Collection Layer
//!
//! Turns instrument configuration into staged readings.
//!
//! # Components
//!
//! - [`TaskRunner`]: Whole-task retry state machine for one task
//! - [`CollectionScheduler`]: Entry point of the `collect` trigger

mod runner;
mod scheduler;

pub use runner::{AttemptFailure, TaskReport, TaskRunner, TaskStatus};
pub use scheduler::{CollectionScheduler, CollectionSummary};
