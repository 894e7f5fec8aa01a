//! Staged reading types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A reading about to be staged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewReading {
    pub instrument_id: String,
    pub parameter: String,
    pub user: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl NewReading {
    /// Create a reading timestamped now.
    pub fn new(
        instrument_id: impl Into<String>,
        parameter: impl Into<String>,
        user: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            instrument_id: instrument_id.into(),
            parameter: parameter.into(),
            user: user.into(),
            content: content.into(),
            created_at: Utc::now(),
        }
    }

    /// Override the creation timestamp.
    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }
}

/// A reading held in the staging store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StagedReading {
    pub id: i64,
    pub instrument_id: String,
    pub parameter: String,
    pub user: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}
