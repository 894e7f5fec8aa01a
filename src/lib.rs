//! instrelay - Instrument Reading Relay
//!
//! This crate collects readings from laboratory and industrial instruments,
//! stages them in a local SQLite database and relays them to a remote
//! aggregator with at-least-once delivery. It can be used as a library or run
//! as a standalone binary with the `instrelay` executable.
//!
//! # Architecture
//!
//! - **Device**: Backend and handle traits, plus a simulated backend
//! - **Executor**: One command against an open device, with lock discipline
//! - **Collection**: Task retries and the per-cycle scheduler
//! - **Storage**: SQLite staging store
//! - **Delivery**: Batched HTTP relay, deleting only acknowledged blocks
//! - **Reaper**: Age-based retention of staged readings
//! - **Trigger**: Interval and cron triggers with single-flight firing
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use instrelay::{BackendRegistry, CollectionScheduler, StorageBuilder, TaskRunner};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = Arc::new(StorageBuilder::new("sqlite::memory:").build().await?);
//!     let runner = TaskRunner::new(Arc::new(BackendRegistry::with_builtin()), store);
//!     let summary = CollectionScheduler::new(Arc::new(runner), instruments).collect().await;
//!     println!("{} tasks succeeded", summary.succeeded);
//!     Ok(())
//! }
//! ```

pub mod collection;
pub mod config;
pub mod delivery;
pub mod device;
pub mod executor;
pub mod instrument;
pub mod reaper;
pub mod storage;
pub mod trigger;

pub use collection::{CollectionScheduler, CollectionSummary, TaskReport, TaskRunner, TaskStatus};
pub use config::{AppConfig, ConfigError};
pub use delivery::{DeliveryConfig, DeliveryDispatcher, DeliveryError, DispatchSummary};
pub use device::{BackendRegistry, DeviceBackend, DeviceError, DeviceHandle, LockMode};
pub use executor::{CommandExecutor, Method, Outcome, OutcomeState};
pub use instrument::{Command, Instrument, Task};
pub use reaper::{RetentionConfig, RetentionReaper};
pub use storage::{SqliteStagingStore, StagingStore, StorageBuilder, StorageError};
pub use trigger::{Schedule, Trigger, TriggerRegistry};
