//! Application configuration structures.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::delivery::DeliveryConfig;
use crate::device::OpenOptions;
use crate::instrument::Instrument;
use crate::reaper::RetentionConfig;
use crate::trigger::Schedule;

use super::instruments::InstrumentsConfig;
use super::validation::{ConfigError, expand_env_vars};

// =============================================================================
// Constants
// =============================================================================

/// Default configuration file path.
pub const DEFAULT_CONFIG_PATH: &str = "configs/config.yaml";

/// Default staging database URL.
pub const DEFAULT_DATABASE_URL: &str = "sqlite:data/instrelay.db?mode=rwc";

/// Default collection interval (1 minute).
pub const DEFAULT_COLLECT_INTERVAL: Duration = Duration::from_secs(60);

/// Default delivery interval (5 minutes).
pub const DEFAULT_SEND_INTERVAL: Duration = Duration::from_secs(300);

/// Default retention interval (1 hour).
pub const DEFAULT_CLEAN_INTERVAL: Duration = Duration::from_secs(3600);

/// Default database pool size.
pub const DEFAULT_MAX_CONNECTIONS: u32 = 5;

fn default_database_url() -> String {
    DEFAULT_DATABASE_URL.to_string()
}

fn default_max_connections() -> u32 {
    DEFAULT_MAX_CONNECTIONS
}

fn default_open_timeout() -> Duration {
    OpenOptions::default().timeout
}

fn default_concurrency() -> usize {
    1
}

// =============================================================================
// Database Configuration
// =============================================================================

/// Staging database configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// sqlx SQLite URL (default: `sqlite:data/instrelay.db?mode=rwc`).
    #[serde(default = "default_database_url")]
    pub url: String,

    /// Connection pool size (default: 5).
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_DATABASE_URL.to_string(),
            max_connections: DEFAULT_MAX_CONNECTIONS,
        }
    }
}

// =============================================================================
// Device Configuration
// =============================================================================

/// Settings applied to every opened device.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DevicesConfig {
    /// Connection-level timeout (default: 30s).
    #[serde(default = "default_open_timeout", with = "humantime_serde")]
    pub open_timeout: Duration,
}

impl Default for DevicesConfig {
    fn default() -> Self {
        Self {
            open_timeout: default_open_timeout(),
        }
    }
}

impl DevicesConfig {
    pub fn open_options(&self) -> OpenOptions {
        OpenOptions {
            timeout: self.open_timeout,
        }
    }
}

// =============================================================================
// Collection Configuration
// =============================================================================

/// Collection trigger settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionConfig {
    /// Trigger interval (mutually exclusive with cron).
    #[serde(default, with = "humantime_serde")]
    pub interval: Option<Duration>,

    /// Trigger cron expression (mutually exclusive with interval).
    #[serde(default)]
    pub cron: Option<String>,

    /// Instruments collected in parallel (default: 1).
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

impl Default for CollectionConfig {
    fn default() -> Self {
        Self {
            interval: None,
            cron: None,
            concurrency: default_concurrency(),
        }
    }
}

// =============================================================================
// Application Configuration
// =============================================================================

/// Top-level application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub devices: DevicesConfig,

    #[serde(default)]
    pub collection: CollectionConfig,

    #[serde(default)]
    pub delivery: DeliveryConfig,

    #[serde(default)]
    pub retention: RetentionConfig,

    /// Inline instrument definitions.
    #[serde(default)]
    pub instruments: Vec<Instrument>,

    /// Path to a directory with additional instrument config files.
    #[serde(default)]
    pub instrument_path: Option<String>,
}

impl AppConfig {
    /// Parse configuration from YAML text.
    ///
    /// Expands `${VAR}` references in the delivery URL and credentials.
    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        let mut config: Self = serde_yaml::from_str(content)?;
        config.expand_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a YAML file.
    ///
    /// # Errors
    /// Returns `ConfigError` if the file cannot be read, parsed, or validated.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml(&content)
    }

    /// Load configuration including the `instrument_path` directory.
    ///
    /// If `instrument_path` is specified, scans the directory for YAML files
    /// and appends their instruments after the inline ones.
    pub fn load_with_instrument_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let mut config = Self::load(path)?;

        if let Some(ref instrument_dir) = config.instrument_path {
            let additional = InstrumentsConfig::load_from_dir(instrument_dir)?;
            config.instruments = InstrumentsConfig {
                instruments: std::mem::take(&mut config.instruments),
            }
            .merge(additional)
            .instruments;
        }

        config.validate()?;
        Ok(config)
    }

    fn expand_env(&mut self) -> Result<(), ConfigError> {
        self.delivery.url = expand_env_vars(&self.delivery.url)?;
        self.delivery.username = expand_env_vars(&self.delivery.username)?;
        self.delivery.password = expand_env_vars(&self.delivery.password)?;
        Ok(())
    }

    /// Validate configuration values.
    ///
    /// The delivery endpoint is only checked when one is configured, so a
    /// collection-only deployment may leave it empty.
    ///
    /// # Errors
    /// Returns `ConfigError::ValidationError` if any field is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.database.url.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "database url cannot be empty".to_string(),
            ));
        }
        if self.database.max_connections == 0 {
            return Err(ConfigError::ValidationError(
                "database max_connections must be positive".to_string(),
            ));
        }
        if self.devices.open_timeout.is_zero() {
            return Err(ConfigError::ValidationError(
                "devices open_timeout must be positive".to_string(),
            ));
        }
        if self.collection.concurrency == 0 {
            return Err(ConfigError::ValidationError(
                "collection concurrency must be positive".to_string(),
            ));
        }

        if self.delivery.batch_limit == 0 {
            return Err(ConfigError::ValidationError(
                "delivery batch_limit must be greater than 0".to_string(),
            ));
        }
        if !self.delivery.url.is_empty() {
            self.delivery.validate().map_err(ConfigError::ValidationError)?;
        }

        self.collect_schedule()?;
        self.send_schedule()?;
        self.clean_schedule()?;

        InstrumentsConfig {
            instruments: self.instruments.clone(),
        }
        .validate()
    }

    /// Schedule of the `collect` trigger.
    pub fn collect_schedule(&self) -> Result<Schedule, ConfigError> {
        resolve_schedule(
            "collection",
            self.collection.interval,
            self.collection.cron.as_deref(),
            DEFAULT_COLLECT_INTERVAL,
        )
    }

    /// Schedule of the `send` trigger.
    pub fn send_schedule(&self) -> Result<Schedule, ConfigError> {
        resolve_schedule(
            "delivery",
            self.delivery.interval,
            self.delivery.cron.as_deref(),
            DEFAULT_SEND_INTERVAL,
        )
    }

    /// Schedule of the `clean` trigger.
    pub fn clean_schedule(&self) -> Result<Schedule, ConfigError> {
        resolve_schedule(
            "retention",
            self.retention.interval,
            self.retention.cron.as_deref(),
            DEFAULT_CLEAN_INTERVAL,
        )
    }
}

fn resolve_schedule(
    section: &str,
    interval: Option<Duration>,
    cron: Option<&str>,
    default: Duration,
) -> Result<Schedule, ConfigError> {
    Schedule::resolve(interval, cron, default)
        .map_err(|e| ConfigError::ValidationError(format!("{section}: {e}")))
}
