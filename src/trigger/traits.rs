//! Core trigger traits and types.

use std::time::Duration;

use thiserror::Error;

/// Minimum allowed interval (1 second).
pub const MIN_INTERVAL: Duration = Duration::from_secs(1);

/// Errors that can occur while scheduling triggers.
#[derive(Debug, Error)]
pub enum TriggerError {
    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),

    /// Scheduler error.
    #[error("scheduler error: {0}")]
    Scheduler(String),
}

/// Schedule for trigger execution.
///
/// Supports both fixed interval and cron-based scheduling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Schedule {
    /// Fixed interval between firings.
    ///
    /// Interval is clamped to a minimum of 1 second.
    Interval(Duration),

    /// Cron expression for scheduled execution.
    ///
    /// Uses `sec min hour day month weekday` (6-field).
    /// Example: `"0 */5 * * * *"` = every 5 minutes at second 0
    Cron(String),
}

impl Schedule {
    /// Create an interval schedule.
    ///
    /// Interval is clamped to a minimum of 1 second.
    pub fn interval(duration: Duration) -> Self {
        if duration < MIN_INTERVAL {
            tracing::warn!(min_interval = ?MIN_INTERVAL,
                "Interval duration is less than minimum allowed. Using minimum duration."
            );
            Self::Interval(MIN_INTERVAL)
        } else {
            Self::Interval(duration)
        }
    }

    /// Create a cron schedule with immediate validation.
    ///
    /// # Errors
    /// Returns `TriggerError::Config` if the cron expression is invalid.
    pub fn cron(expr: impl AsRef<str>) -> Result<Self, TriggerError> {
        use std::str::FromStr;

        let expr = expr.as_ref();
        cron::Schedule::from_str(expr)
            .map_err(|e| TriggerError::Config(format!("invalid cron expression: {e}")))?;

        Ok(Self::Cron(expr.to_string()))
    }

    /// Build a schedule from optional `interval` / `cron` config fields.
    ///
    /// Falls back to `default` when neither is set.
    ///
    /// # Errors
    /// Returns `TriggerError::Config` if both are set or the cron is invalid.
    pub fn resolve(
        interval: Option<Duration>,
        cron: Option<&str>,
        default: Duration,
    ) -> Result<Self, TriggerError> {
        match (interval, cron) {
            (Some(_), Some(_)) => Err(TriggerError::Config(
                "interval and cron are mutually exclusive".to_string(),
            )),
            (None, Some(expr)) => Self::cron(expr),
            (Some(d), None) => Ok(Self::interval(d)),
            (None, None) => Ok(Self::interval(default)),
        }
    }
}

impl std::fmt::Display for Schedule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Interval(d) => write!(f, "every {}", humantime::format_duration(*d)),
            Self::Cron(expr) => write!(f, "cron: {}", expr),
        }
    }
}

/// A scheduled entry point.
///
/// `fire` runs one full cycle and reports its own failures through logs;
/// nothing it does is fatal to the scheduler.
#[async_trait::async_trait]
pub trait Trigger: Send + Sync + 'static {
    /// Unique name of the entry point (e.g. `collect`).
    fn name(&self) -> &str;

    /// Execution schedule (interval or cron).
    fn schedule(&self) -> &Schedule;

    /// Run one cycle.
    async fn fire(&self);
}
