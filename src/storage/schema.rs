//! Database schema definitions.

use sqlx::sqlite::SqlitePool as SqlxPool;

use crate::storage::StorageError;

/// SQL statement for creating the staged_readings table.
///
/// `created_at` is Unix milliseconds (UTC). There is no foreign key to any
/// configuration table; a staged reading is a detached fact.
pub const STAGED_READINGS_TABLE_DDL: &str = r#"
CREATE TABLE IF NOT EXISTS staged_readings (
    id             INTEGER PRIMARY KEY AUTOINCREMENT,
    instrument_id  TEXT NOT NULL,
    parameter_name TEXT NOT NULL,
    user_label     TEXT NOT NULL DEFAULT '',
    content        TEXT NOT NULL,
    created_at     INTEGER NOT NULL
);
"#;

/// Indexes for per-instrument snapshots and age-based purges.
pub const STAGED_READINGS_INDEXES_DDL: &str = r#"
CREATE INDEX IF NOT EXISTS idx_staged_readings_instrument ON staged_readings (instrument_id, id);
CREATE INDEX IF NOT EXISTS idx_staged_readings_created_at ON staged_readings (created_at);
"#;

/// Initialize the database schema.
///
/// Creates the staging table and its indexes if they don't exist.
pub async fn init_schema(pool: &SqlxPool) -> Result<(), StorageError> {
    sqlx::raw_sql(STAGED_READINGS_TABLE_DDL).execute(pool).await?;
    sqlx::raw_sql(STAGED_READINGS_INDEXES_DDL).execute(pool).await?;

    tracing::info!("Database schema initialized");
    Ok(())
}
