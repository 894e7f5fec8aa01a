//! Delivery dispatcher: entry point of the `send` trigger.

use std::sync::Arc;
use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use super::{DeliveryError, DeliveryPayload};
use crate::storage::{StagedReading, StagingStore};

/// Default number of readings per POST.
pub const DEFAULT_BATCH_LIMIT: usize = 50;

/// Default request timeout.
pub const DEFAULT_DELIVERY_TIMEOUT: Duration = Duration::from_secs(30);

/// Longest rejected response body kept in an error.
const MAX_ERROR_BODY: usize = 256;

fn default_batch_limit() -> usize {
    DEFAULT_BATCH_LIMIT
}

fn default_timeout() -> Duration {
    DEFAULT_DELIVERY_TIMEOUT
}

/// Aggregator endpoint, credentials and batching.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryConfig {
    /// Endpoint receiving one POST per block.
    #[serde(default)]
    pub url: String,
    /// Basic auth user.
    #[serde(default)]
    pub username: String,
    /// Basic auth password.
    #[serde(default)]
    pub password: String,
    /// Maximum readings per block (default: 50).
    #[serde(default = "default_batch_limit")]
    pub batch_limit: usize,
    /// `idApp` of every entry.
    #[serde(default)]
    pub app_id: String,
    /// `idCountry` of every entry.
    #[serde(default)]
    pub country_id: String,
    /// Request timeout (default: 30s).
    #[serde(default = "default_timeout", with = "humantime_serde")]
    pub timeout: Duration,
    /// Trigger interval (mutually exclusive with cron).
    #[serde(default, with = "humantime_serde")]
    pub interval: Option<Duration>,
    /// Trigger cron expression (mutually exclusive with interval).
    #[serde(default)]
    pub cron: Option<String>,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            username: String::new(),
            password: String::new(),
            batch_limit: DEFAULT_BATCH_LIMIT,
            app_id: String::new(),
            country_id: String::new(),
            timeout: DEFAULT_DELIVERY_TIMEOUT,
            interval: None,
            cron: None,
        }
    }
}

impl DeliveryConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    pub fn with_credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.username = username.into();
        self.password = password.into();
        self
    }

    pub fn with_batch_limit(mut self, limit: usize) -> Self {
        self.batch_limit = limit;
        self
    }

    pub fn with_identity(mut self, app_id: impl Into<String>, country_id: impl Into<String>) -> Self {
        self.app_id = app_id.into();
        self.country_id = country_id.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Check the endpoint and batch limit.
    pub fn validate(&self) -> Result<(), String> {
        if self.url.trim().is_empty() {
            return Err("delivery url is not set".to_string());
        }
        let parsed = url::Url::parse(&self.url)
            .map_err(|e| format!("invalid delivery url '{}': {}", self.url, e))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(format!("delivery url must be http(s), got '{}'", parsed.scheme()));
        }
        if self.batch_limit == 0 {
            return Err("delivery batch_limit must be greater than 0".to_string());
        }
        Ok(())
    }
}

/// Aggregate counts of one delivery cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DispatchSummary {
    /// Readings staged when the cycle started.
    pub staged_at_start: u64,
    pub instruments: usize,
    pub blocks_sent: usize,
    pub blocks_failed: usize,
    pub deleted: u64,
}

/// Sends staged readings and deletes acknowledged blocks.
pub struct DeliveryDispatcher {
    client: Client,
    config: DeliveryConfig,
    store: Arc<dyn StagingStore>,
}

impl std::fmt::Debug for DeliveryDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeliveryDispatcher")
            .field("url", &self.config.url)
            .field("batch_limit", &self.config.batch_limit)
            .finish_non_exhaustive()
    }
}

impl DeliveryDispatcher {
    /// Create a dispatcher.
    ///
    /// # Errors
    ///
    /// Returns `DeliveryError::InvalidTarget` if the config does not validate,
    /// or `DeliveryError::Transport` if the HTTP client cannot be built.
    pub fn new(config: DeliveryConfig, store: Arc<dyn StagingStore>) -> Result<Self, DeliveryError> {
        config.validate().map_err(DeliveryError::InvalidTarget)?;

        let client = Client::builder().timeout(config.timeout).build()?;

        Ok(Self {
            client,
            config,
            store,
        })
    }

    pub fn config(&self) -> &DeliveryConfig {
        &self.config
    }

    /// Run one delivery cycle.
    ///
    /// Never fails: a block that is not acknowledged stays staged and is
    /// retried on the next cycle.
    pub async fn dispatch(&self) -> DispatchSummary {
        let mut summary = DispatchSummary::default();

        summary.staged_at_start = match self.store.count().await {
            Ok(count) => count,
            Err(e) => {
                error!(error = %e, "Failed to count staged readings");
                return summary;
            }
        };
        info!(staged = summary.staged_at_start, "Starting delivery cycle");

        let instrument_ids = match self.store.instrument_ids().await {
            Ok(ids) => ids,
            Err(e) => {
                error!(error = %e, "Failed to list instruments with staged readings");
                return summary;
            }
        };
        if instrument_ids.is_empty() {
            info!("No staged readings to send, skipping cycle");
            return summary;
        }

        for instrument_id in &instrument_ids {
            summary.instruments += 1;
            self.dispatch_instrument(instrument_id, &mut summary).await;
        }

        info!(
            instruments = summary.instruments,
            blocks_sent = summary.blocks_sent,
            blocks_failed = summary.blocks_failed,
            deleted = summary.deleted,
            "Delivery cycle finished"
        );
        if summary.deleted != summary.staged_at_start {
            warn!(
                staged = summary.staged_at_start,
                deleted = summary.deleted,
                "Deleted count differs from staged count at cycle start"
            );
        }
        summary
    }

    async fn dispatch_instrument(&self, instrument_id: &str, summary: &mut DispatchSummary) {
        let snapshot = match self.store.list_for_instrument(instrument_id).await {
            Ok(readings) => readings,
            Err(e) => {
                error!(instrument = %instrument_id, error = %e, "Failed to read staged readings");
                return;
            }
        };

        for (index, block) in snapshot.chunks(self.config.batch_limit).enumerate() {
            let block_no = index + 1;
            if let Err(e) = self.send_block(block).await {
                summary.blocks_failed += 1;
                warn!(
                    instrument = %instrument_id,
                    block = block_no,
                    records = block.len(),
                    error = %e,
                    "Block not acknowledged, keeping it staged"
                );
                continue;
            }

            summary.blocks_sent += 1;
            let ids: Vec<i64> = block.iter().map(|r| r.id).collect();
            match self.store.delete_ids(&ids).await {
                Ok(deleted) => {
                    summary.deleted += deleted;
                    debug!(
                        instrument = %instrument_id,
                        block = block_no,
                        deleted,
                        "Block acknowledged and deleted"
                    );
                }
                Err(e) => error!(
                    instrument = %instrument_id,
                    block = block_no,
                    error = %e,
                    "Block acknowledged but delete failed, it will be sent again"
                ),
            }
        }
    }

    /// POST one block. `Ok` means the aggregator answered 201.
    async fn send_block(&self, block: &[StagedReading]) -> Result<(), DeliveryError> {
        let Some(payload) =
            DeliveryPayload::from_block(block, &self.config.app_id, &self.config.country_id)
        else {
            return Ok(());
        };

        let response = self
            .client
            .post(&self.config.url)
            .basic_auth(&self.config.username, Some(&self.config.password))
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        if status != StatusCode::CREATED {
            let mut body = response.text().await.unwrap_or_default();
            if body.len() > MAX_ERROR_BODY {
                let cut = (0..=MAX_ERROR_BODY)
                    .rev()
                    .find(|i| body.is_char_boundary(*i))
                    .unwrap_or(0);
                body.truncate(cut);
            }
            return Err(DeliveryError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        match response.bytes().await {
            Ok(body) => {
                if let Err(e) = check_ack_body(&body) {
                    warn!(instrument = %payload.instrument_name, error = %e, "Acknowledged with unexpected body");
                }
            }
            Err(e) => warn!(instrument = %payload.instrument_name, error = %e, "Failed to read acknowledgement body"),
        }
        Ok(())
    }
}

/// An acknowledgement body must be empty or JSON.
fn check_ack_body(body: &[u8]) -> Result<(), DeliveryError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(());
    }
    serde_json::from_slice::<serde_json::Value>(body)
        .map(|_| ())
        .map_err(|e| DeliveryError::ServerFormat(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::StorageBuilder;

    async fn store() -> Arc<dyn StagingStore> {
        Arc::new(StorageBuilder::new("sqlite::memory:").build().await.unwrap())
    }

    #[test]
    fn test_config_defaults_from_yaml() {
        let config: DeliveryConfig =
            serde_yaml::from_str("url: http://localhost:8080/createlist\ninterval: 10m\n").unwrap();
        assert_eq!(config.batch_limit, DEFAULT_BATCH_LIMIT);
        assert_eq!(config.timeout, DEFAULT_DELIVERY_TIMEOUT);
        assert_eq!(config.interval, Some(Duration::from_secs(600)));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        assert!(DeliveryConfig::default().validate().is_err());
        assert!(DeliveryConfig::new("ftp://host/x").validate().is_err());
        assert!(DeliveryConfig::new("not a url").validate().is_err());
        assert!(
            DeliveryConfig::new("http://host/x")
                .with_batch_limit(0)
                .validate()
                .is_err()
        );
    }

    #[tokio::test]
    async fn test_new_rejects_invalid_target() {
        let result = DeliveryDispatcher::new(DeliveryConfig::default(), store().await);
        assert!(matches!(result, Err(DeliveryError::InvalidTarget(_))));
    }

    #[tokio::test]
    async fn test_empty_store_is_noop() {
        let dispatcher =
            DeliveryDispatcher::new(DeliveryConfig::new("http://127.0.0.1:9/none"), store().await)
                .unwrap();
        let summary = dispatcher.dispatch().await;
        assert_eq!(summary, DispatchSummary::default());
    }

    #[tokio::test]
    async fn test_store_failure_ends_cycle_quietly() {
        let store = Arc::new(StorageBuilder::new("sqlite::memory:").build().await.unwrap());
        store.close().await;

        let dispatcher =
            DeliveryDispatcher::new(DeliveryConfig::new("http://127.0.0.1:9/none"), store).unwrap();
        assert_eq!(dispatcher.dispatch().await, DispatchSummary::default());
    }

    #[test]
    fn test_check_ack_body() {
        assert!(check_ack_body(b"").is_ok());
        assert!(check_ack_body(b"  \n").is_ok());
        assert!(check_ack_body(br#"{"created": 15}"#).is_ok());
        assert!(matches!(
            check_ack_body(b"<html>ok</html>"),
            Err(DeliveryError::ServerFormat(_))
        ));
    }
}
