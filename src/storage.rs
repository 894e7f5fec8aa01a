//! Storage Layer
//!
//! SQLite-backed staging area for readings awaiting delivery. Collection
//! appends, delivery and retention delete; nothing else mutates a staged
//! reading.
//!
//! # Components
//!
//! - [`StagingStore`]: Access contract used by collection, delivery and retention
//! - [`SqliteStagingStore`]: sqlx implementation of the contract
//! - [`StorageBuilder`]: Connects the pool and initializes the schema

mod builder;
pub mod db;
mod error;
mod schema;
mod staging;
mod types;

pub use builder::StorageBuilder;
pub use error::StorageError;
pub use staging::{SqliteStagingStore, StagingStore};
pub use types::{NewReading, StagedReading};
