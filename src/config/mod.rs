//! Configuration module for instrelay.
//!
//! Provides YAML-based configuration loading and validation for:
//! - Staging database
//! - Device open timeout
//! - Collection, delivery and retention triggers
//! - Instrument definitions, inline or from an include directory

mod app;
mod instruments;
mod validation;

pub use app::{AppConfig, CollectionConfig, DatabaseConfig, DevicesConfig};
pub use instruments::InstrumentsConfig;
pub use validation::{ConfigError, expand_env_vars};

// Re-export constants
pub use app::{
    DEFAULT_CLEAN_INTERVAL, DEFAULT_COLLECT_INTERVAL, DEFAULT_CONFIG_PATH, DEFAULT_DATABASE_URL,
    DEFAULT_SEND_INTERVAL,
};
