//! Persistent granule metadata store.
//!
//! One SQLite file per collection type records every granule key the
//! pipeline has accepted, together with the provider-reported markers used
//! for change detection on the next run.
//!
//! # Usage
//!
//! ```rust,ignore
//! use granary_store::{GranuleStore, Result};
//!
//! let store = GranuleStore::open("~/.granary/granules_static.sqlite3").await?;
//!
//! let new = store.insert_new(&discovered).await?;
//! let removed = store.delete_by_keys(&keys).await?;
//! ```

mod error;
mod types;

pub use error::{Result, StoreError};
pub use types::{GranuleMap, GranuleMeta, StoredGranule};

use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use std::path::Path;
use tracing::info;

/// SQLite-backed store of previously discovered granules.
///
/// All access to the granule table goes through this type. Policy SQL lives
/// here; policy selection lives in the reconciler.
#[derive(Clone)]
pub struct GranuleStore {
    pool: SqlitePool,
}

impl GranuleStore {
    /// Open or create a store at the given path.
    ///
    /// Creates the table if it doesn't exist.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let url = format!("sqlite:{}?mode=rwc", path.display());

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&url)
            .await?;

        let store = Self { pool };
        store.ensure_schema().await?;

        info!(path = %path.display(), "Granule store opened");

        Ok(store)
    }

    /// Open an in-memory store (for testing).
    pub async fn open_in_memory() -> Result<Self> {
        // Single connection: each sqlite::memory: connection is its own database.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;

        let store = Self { pool };
        store.ensure_schema().await?;
        Ok(store)
    }

    /// Get the underlying connection pool (escape hatch for complex queries).
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Close the store connection.
    pub async fn close(self) {
        self.pool.close().await;
    }

    /// Current time as milliseconds since Unix epoch.
    pub fn now_millis() -> i64 {
        chrono::Utc::now().timestamp_millis()
    }

    async fn ensure_schema(&self) -> Result<()> {
        sqlx::query("PRAGMA journal_mode=WAL")
            .execute(&self.pool)
            .await?;
        sqlx::query("PRAGMA synchronous=NORMAL")
            .execute(&self.pool)
            .await?;

        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS granules (
                key TEXT PRIMARY KEY,
                etag TEXT,
                last_modified INTEGER,
                size INTEGER,
                first_seen_at INTEGER NOT NULL,
                last_seen_at INTEGER NOT NULL
            )"#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    // ========================================================================
    // Row Operations
    // ========================================================================

    /// Get a granule by key.
    pub async fn get(&self, key: &str) -> Result<Option<StoredGranule>> {
        let row = sqlx::query(
            "SELECT key, etag, last_modified, size, first_seen_at, last_seen_at FROM granules WHERE key = ?",
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|row| row_to_granule(&row)))
    }

    /// Insert or update a single granule's markers.
    pub async fn upsert(&self, key: &str, meta: &GranuleMeta) -> Result<()> {
        let now = Self::now_millis();

        sqlx::query(
            r#"
            INSERT INTO granules (key, etag, last_modified, size, first_seen_at, last_seen_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(key) DO UPDATE SET
                etag = excluded.etag,
                last_modified = excluded.last_modified,
                size = excluded.size,
                last_seen_at = excluded.last_seen_at
            "#,
        )
        .bind(key)
        .bind(&meta.etag)
        .bind(meta.last_modified)
        .bind(meta.size)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Delete granules by key. Returns the number of rows actually removed.
    pub async fn delete_by_keys(&self, keys: &[String]) -> Result<u64> {
        if keys.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await?;
        let mut deleted = 0u64;

        for key in keys {
            let result = sqlx::query("DELETE FROM granules WHERE key = ?")
                .bind(key)
                .execute(&mut *tx)
                .await?;
            deleted += result.rows_affected();
        }

        tx.commit().await?;
        Ok(deleted)
    }

    /// All stored granules keyed by location.
    pub async fn list_all(&self) -> Result<GranuleMap> {
        let rows = sqlx::query(
            "SELECT key, etag, last_modified, size, first_seen_at, last_seen_at FROM granules ORDER BY key",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut map = GranuleMap::new();
        for row in &rows {
            let granule = row_to_granule(row);
            map.insert(granule.key, granule.meta);
        }
        Ok(map)
    }

    /// Number of stored granules.
    pub async fn count(&self) -> Result<u64> {
        let row = sqlx::query("SELECT COUNT(*) as n FROM granules")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get::<i64, _>("n") as u64)
    }

    // ========================================================================
    // Policy Bulk Operations
    // ========================================================================

    /// Insert only keys not already present. Returns the newly inserted
    /// subset of `granules`.
    pub async fn insert_new(&self, granules: &GranuleMap) -> Result<GranuleMap> {
        let now = Self::now_millis();
        let mut tx = self.pool.begin().await?;
        let mut inserted = GranuleMap::new();

        for (key, meta) in granules {
            let result = sqlx::query(
                r#"
                INSERT INTO granules (key, etag, last_modified, size, first_seen_at, last_seen_at)
                VALUES (?, ?, ?, ?, ?, ?)
                ON CONFLICT(key) DO NOTHING
                "#,
            )
            .bind(key)
            .bind(&meta.etag)
            .bind(meta.last_modified)
            .bind(meta.size)
            .bind(now)
            .bind(now)
            .execute(&mut *tx)
            .await?;

            if result.rows_affected() > 0 {
                inserted.insert(key.clone(), meta.clone());
            }
        }

        tx.commit().await?;
        Ok(inserted)
    }

    /// Insert or overwrite every key's markers. Existing rows keep their
    /// first_seen_at.
    pub async fn replace_all(&self, granules: &GranuleMap) -> Result<()> {
        let now = Self::now_millis();
        let mut tx = self.pool.begin().await?;

        for (key, meta) in granules {
            sqlx::query(
                r#"
                INSERT INTO granules (key, etag, last_modified, size, first_seen_at, last_seen_at)
                VALUES (?, ?, ?, ?, ?, ?)
                ON CONFLICT(key) DO UPDATE SET
                    etag = excluded.etag,
                    last_modified = excluded.last_modified,
                    size = excluded.size,
                    last_seen_at = excluded.last_seen_at
                "#,
            )
            .bind(key)
            .bind(&meta.etag)
            .bind(meta.last_modified)
            .bind(meta.size)
            .bind(now)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    /// Insert every key, failing on the first one already present.
    ///
    /// The transaction rolls back on failure, leaving the store exactly as
    /// it was before the call.
    pub async fn insert_strict(&self, granules: &GranuleMap) -> Result<()> {
        let now = Self::now_millis();
        let mut tx = self.pool.begin().await?;

        for (key, meta) in granules {
            let exists = sqlx::query("SELECT 1 FROM granules WHERE key = ?")
                .bind(key)
                .fetch_optional(&mut *tx)
                .await?;
            if exists.is_some() {
                // Dropping the transaction rolls it back.
                return Err(StoreError::DuplicateKey(key.clone()));
            }

            sqlx::query(
                r#"
                INSERT INTO granules (key, etag, last_modified, size, first_seen_at, last_seen_at)
                VALUES (?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(key)
            .bind(&meta.etag)
            .bind(meta.last_modified)
            .bind(meta.size)
            .bind(now)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }
}

fn row_to_granule(row: &sqlx::sqlite::SqliteRow) -> StoredGranule {
    StoredGranule {
        key: row.get("key"),
        meta: GranuleMeta {
            etag: row.get("etag"),
            last_modified: row.get("last_modified"),
            size: row.get("size"),
        },
        first_seen_at: row.get("first_seen_at"),
        last_seen_at: row.get("last_seen_at"),
    }
}
