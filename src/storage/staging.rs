//! Staging store contract and its SQLite implementation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{QueryBuilder, Sqlite};

use crate::storage::StorageError;
use crate::storage::db::SqlitePool;
use crate::storage::types::{NewReading, StagedReading};

/// Maximum ids bound into one `DELETE ... IN (...)` statement.
const DELETE_CHUNK_SIZE: usize = 500;

/// Append/delete store of readings pending delivery.
///
/// Deleting ids that no longer exist affects zero rows and is not an error;
/// delivery and retention may race on the same records.
#[async_trait]
pub trait StagingStore: Send + Sync {
    /// Stage a reading and return its id.
    async fn insert(&self, reading: NewReading) -> Result<i64, StorageError>;

    /// Number of staged readings.
    async fn count(&self) -> Result<u64, StorageError>;

    /// Distinct instrument ids with staged readings, in order of first staging.
    async fn instrument_ids(&self) -> Result<Vec<String>, StorageError>;

    /// All staged readings of one instrument, oldest first.
    async fn list_for_instrument(
        &self,
        instrument_id: &str,
    ) -> Result<Vec<StagedReading>, StorageError>;

    /// Delete the given ids. Returns the number of rows actually deleted.
    async fn delete_ids(&self, ids: &[i64]) -> Result<u64, StorageError>;

    /// Delete readings created strictly before `cutoff`. Returns rows deleted.
    async fn delete_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64, StorageError>;
}

#[derive(sqlx::FromRow)]
struct ReadingRow {
    id: i64,
    instrument_id: String,
    parameter_name: String,
    user_label: String,
    content: String,
    created_at: i64,
}

impl TryFrom<ReadingRow> for StagedReading {
    type Error = StorageError;

    fn try_from(row: ReadingRow) -> Result<Self, Self::Error> {
        let created_at = DateTime::from_timestamp_millis(row.created_at).ok_or_else(|| {
            StorageError::InvalidData(format!(
                "staged reading {} has out-of-range timestamp {}",
                row.id, row.created_at
            ))
        })?;
        Ok(Self {
            id: row.id,
            instrument_id: row.instrument_id,
            parameter: row.parameter_name,
            user: row.user_label,
            content: row.content,
            created_at,
        })
    }
}

/// [`StagingStore`] backed by a SQLite pool.
#[derive(Debug, Clone)]
pub struct SqliteStagingStore {
    pool: SqlitePool,
}

impl SqliteStagingStore {
    /// Wrap a pool whose schema is already initialized.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl StagingStore for SqliteStagingStore {
    async fn insert(&self, reading: NewReading) -> Result<i64, StorageError> {
        let result = sqlx::query(
            "INSERT INTO staged_readings (instrument_id, parameter_name, user_label, content, created_at)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&reading.instrument_id)
        .bind(&reading.parameter)
        .bind(&reading.user)
        .bind(&reading.content)
        .bind(reading.created_at.timestamp_millis())
        .execute(self.pool.inner())
        .await?;

        Ok(result.last_insert_rowid())
    }

    async fn count(&self) -> Result<u64, StorageError> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM staged_readings")
            .fetch_one(self.pool.inner())
            .await?;
        Ok(count.max(0) as u64)
    }

    async fn instrument_ids(&self) -> Result<Vec<String>, StorageError> {
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT instrument_id FROM staged_readings GROUP BY instrument_id ORDER BY MIN(id)",
        )
        .fetch_all(self.pool.inner())
        .await?;
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    async fn list_for_instrument(
        &self,
        instrument_id: &str,
    ) -> Result<Vec<StagedReading>, StorageError> {
        let rows: Vec<ReadingRow> = sqlx::query_as(
            "SELECT id, instrument_id, parameter_name, user_label, content, created_at
             FROM staged_readings WHERE instrument_id = ? ORDER BY id",
        )
        .bind(instrument_id)
        .fetch_all(self.pool.inner())
        .await?;

        rows.into_iter().map(StagedReading::try_from).collect()
    }

    async fn delete_ids(&self, ids: &[i64]) -> Result<u64, StorageError> {
        let mut deleted = 0;
        for chunk in ids.chunks(DELETE_CHUNK_SIZE) {
            let mut builder: QueryBuilder<Sqlite> =
                QueryBuilder::new("DELETE FROM staged_readings WHERE id IN (");
            let mut separated = builder.separated(", ");
            for id in chunk {
                separated.push_bind(*id);
            }
            separated.push_unseparated(")");

            deleted += builder
                .build()
                .execute(self.pool.inner())
                .await?
                .rows_affected();
        }
        Ok(deleted)
    }

    async fn delete_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64, StorageError> {
        let result = sqlx::query("DELETE FROM staged_readings WHERE created_at < ?")
            .bind(cutoff.timestamp_millis())
            .execute(self.pool.inner())
            .await?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::StorageBuilder;
    use chrono::Duration;

    async fn memory_store() -> SqliteStagingStore {
        StorageBuilder::new("sqlite::memory:").build().await.unwrap()
    }

    fn reading(instrument: &str, content: &str) -> NewReading {
        NewReading::new(instrument, "temperature", "lab", content)
    }

    #[tokio::test]
    async fn test_insert_and_list_in_staging_order() {
        let store = memory_store().await;
        store.insert(reading("a", "1")).await.unwrap();
        store.insert(reading("b", "2")).await.unwrap();
        store.insert(reading("a", "3")).await.unwrap();

        assert_eq!(store.count().await.unwrap(), 3);
        assert_eq!(store.instrument_ids().await.unwrap(), vec!["a", "b"]);

        let listed = store.list_for_instrument("a").await.unwrap();
        let contents: Vec<_> = listed.iter().map(|r| r.content.as_str()).collect();
        assert_eq!(contents, vec!["1", "3"]);
        assert_eq!(listed[0].parameter, "temperature");
        assert_eq!(listed[0].user, "lab");
    }

    #[tokio::test]
    async fn test_timestamp_survives_storage_at_millisecond_precision() {
        let store = memory_store().await;
        let at = DateTime::from_timestamp_millis(1_700_000_000_123).unwrap();
        store
            .insert(reading("a", "x").with_created_at(at))
            .await
            .unwrap();

        let listed = store.list_for_instrument("a").await.unwrap();
        assert_eq!(listed[0].created_at, at);
    }

    #[tokio::test]
    async fn test_delete_ids_is_idempotent() {
        let store = memory_store().await;
        let first = store.insert(reading("a", "1")).await.unwrap();
        let second = store.insert(reading("a", "2")).await.unwrap();

        assert_eq!(store.delete_ids(&[first, second]).await.unwrap(), 2);
        assert_eq!(store.delete_ids(&[first, second]).await.unwrap(), 0);
        assert_eq!(store.delete_ids(&[]).await.unwrap(), 0);
        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_delete_ids_spans_chunks() {
        let store = memory_store().await;
        let mut ids = Vec::new();
        for i in 0..(DELETE_CHUNK_SIZE + 7) {
            ids.push(store.insert(reading("a", &i.to_string())).await.unwrap());
        }
        let keep = ids.pop().unwrap();

        assert_eq!(store.delete_ids(&ids).await.unwrap(), ids.len() as u64);
        let remaining = store.list_for_instrument("a").await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id, keep);
    }

    #[tokio::test]
    async fn test_delete_older_than() {
        let store = memory_store().await;
        let now = Utc::now();
        for minutes in [5, 15, 205] {
            store
                .insert(reading("a", &minutes.to_string()).with_created_at(now - Duration::minutes(minutes)))
                .await
                .unwrap();
        }

        let cutoff = now - Duration::minutes(10);
        assert_eq!(store.delete_older_than(cutoff).await.unwrap(), 2);
        assert_eq!(store.delete_older_than(cutoff).await.unwrap(), 0);

        let remaining = store.list_for_instrument("a").await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].content, "5");
    }
}
