//! Storage builder.
//!
//! Connects the SQLite pool, makes sure the database directory exists and
//! initializes the schema before handing out a [`SqliteStagingStore`].

use std::path::PathBuf;

use crate::storage::db::{DEFAULT_MAX_CONNECTIONS, SqlitePool, is_memory_url};
use crate::storage::schema::init_schema;
use crate::storage::{SqliteStagingStore, StorageError};

/// Builder for constructing the storage layer.
#[derive(Debug, Clone)]
pub struct StorageBuilder {
    url: String,
    max_connections: u32,
}

impl StorageBuilder {
    /// Create a new storage builder for a sqlx SQLite URL.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            max_connections: DEFAULT_MAX_CONNECTIONS,
        }
    }

    /// Set the connection pool size. Ignored for in-memory databases.
    pub fn max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }

    /// Build the storage layer.
    pub async fn build(self) -> Result<SqliteStagingStore, StorageError> {
        if let Some(parent) = database_path(&self.url).and_then(|p| p.parent().map(PathBuf::from))
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            std::fs::create_dir_all(&parent).map_err(|e| {
                StorageError::Internal(format!(
                    "Failed to create database directory '{}': {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        let pool = SqlitePool::connect_with(&self.url, self.max_connections).await?;
        init_schema(pool.inner()).await?;

        tracing::debug!(url = %self.url, "Staging store ready");
        Ok(SqliteStagingStore::new(pool))
    }
}

/// Filesystem path of a SQLite URL, `None` for in-memory databases.
fn database_path(url: &str) -> Option<PathBuf> {
    if is_memory_url(url) {
        return None;
    }
    let rest = url
        .strip_prefix("sqlite://")
        .or_else(|| url.strip_prefix("sqlite:"))
        .unwrap_or(url);
    let path = rest.split('?').next().unwrap_or_default();
    if path.is_empty() {
        None
    } else {
        Some(PathBuf::from(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{NewReading, StagingStore};
    use tempfile::tempdir;

    #[test]
    fn test_database_path() {
        assert_eq!(
            database_path("sqlite:data/instrelay.db?mode=rwc"),
            Some(PathBuf::from("data/instrelay.db"))
        );
        assert_eq!(
            database_path("sqlite:///tmp/x.db"),
            Some(PathBuf::from("/tmp/x.db"))
        );
        assert_eq!(database_path("sqlite::memory:"), None);
    }

    #[tokio::test]
    async fn test_build_creates_directory_and_persists() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("nested").join("staging.db");
        let url = format!("sqlite:{}?mode=rwc", db_path.display());

        {
            let store = StorageBuilder::new(&url).build().await.unwrap();
            store
                .insert(NewReading::new("thermo-1", "temperature", "lab", "21.5"))
                .await
                .unwrap();
            store.close().await;
        }

        assert!(db_path.exists());
        let store = StorageBuilder::new(&url).build().await.unwrap();
        assert_eq!(store.count().await.unwrap(), 1);
        store.close().await;
    }
}
