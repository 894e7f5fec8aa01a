//! Retention reaper: entry point of the `clean` trigger.
//!
//! Deletes staged readings older than the retention window whether or not
//! they were delivered. Retention bounds the staging table; once a reading
//! outlives the window it is lost even if the aggregator never received it.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::storage::{StagingStore, StorageError};

/// Default retention window in minutes (one day).
pub const DEFAULT_RETENTION_MINUTES: u64 = 1440;

fn default_interval_minutes() -> u64 {
    DEFAULT_RETENTION_MINUTES
}

/// Retention window and trigger settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetentionConfig {
    /// Age in minutes after which a staged reading is deleted (default: 1440).
    #[serde(default = "default_interval_minutes")]
    pub interval_minutes: u64,
    /// Trigger interval (mutually exclusive with cron).
    #[serde(default, with = "humantime_serde")]
    pub interval: Option<Duration>,
    /// Trigger cron expression (mutually exclusive with interval).
    #[serde(default)]
    pub cron: Option<String>,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            interval_minutes: DEFAULT_RETENTION_MINUTES,
            interval: None,
            cron: None,
        }
    }
}

/// Purges readings past their retention window.
#[derive(Clone)]
pub struct RetentionReaper {
    store: Arc<dyn StagingStore>,
    interval_minutes: u64,
}

impl std::fmt::Debug for RetentionReaper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetentionReaper")
            .field("interval_minutes", &self.interval_minutes)
            .finish_non_exhaustive()
    }
}

impl RetentionReaper {
    pub fn new(store: Arc<dyn StagingStore>, interval_minutes: u64) -> Self {
        Self {
            store,
            interval_minutes,
        }
    }

    pub fn interval_minutes(&self) -> u64 {
        self.interval_minutes
    }

    /// Delete readings older than the retention window. Returns rows deleted.
    pub async fn try_clean(&self) -> Result<u64, StorageError> {
        let minutes = i64::try_from(self.interval_minutes).unwrap_or(i64::MAX);
        let window = chrono::Duration::try_minutes(minutes).unwrap_or(chrono::Duration::MAX);
        let cutoff = Utc::now()
            .checked_sub_signed(window)
            .unwrap_or(chrono::DateTime::<Utc>::MIN_UTC);
        self.store.delete_older_than(cutoff).await
    }

    /// Run one retention cycle. Failures are logged and reported as zero.
    pub async fn clean(&self) -> u64 {
        match self.try_clean().await {
            Ok(deleted) => {
                info!(
                    deleted,
                    interval_minutes = self.interval_minutes,
                    "Retention cycle finished"
                );
                deleted
            }
            Err(e) => {
                error!(error = %e, "Retention cycle failed");
                0
            }
        }
    }
}
