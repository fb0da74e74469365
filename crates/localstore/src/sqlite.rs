//! SQLite-backed KV backend.

use crate::error::StoreResult;
use crate::keyspace::KeySpace;
use bytes::Bytes;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// SQLite-backed KV store: one table per keyspace.
pub struct SqliteStore {
    pool: Pool<Sqlite>,
}

impl SqliteStore {
    /// Open (creating if missing) the store at `path`.
    pub async fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref();

        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let opts = SqliteConnectOptions::from_str(&format!("sqlite:{}?mode=rwc", path.display()))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
            // Prevent transient "database is locked" errors under concurrent access.
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            // SQLite permits limited write concurrency; a single connection is
            // the store's writer lock.
            .max_connections(1)
            .connect_with(opts)
            .await?;

        let store = Self { pool };
        store.migrate().await?;
        tracing::debug!(path = %path.display(), "opened local store");
        Ok(store)
    }

    async fn migrate(&self) -> StoreResult<()> {
        for ks in KeySpace::ALL {
            sqlx::query(&format!(
                "CREATE TABLE IF NOT EXISTS {} (key BLOB PRIMARY KEY, value BLOB NOT NULL)",
                ks.name()
            ))
            .execute(&self.pool)
            .await?;
        }
        Ok(())
    }

    pub async fn get(&self, ks: KeySpace, key: &[u8]) -> StoreResult<Option<Bytes>> {
        let row: Option<Vec<u8>> =
            sqlx::query_scalar(&format!("SELECT value FROM {} WHERE key = ?1", ks.name()))
                .bind(key)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(Bytes::from))
    }

    pub async fn has(&self, ks: KeySpace, key: &[u8]) -> StoreResult<bool> {
        let row: Option<i64> =
            sqlx::query_scalar(&format!("SELECT 1 FROM {} WHERE key = ?1", ks.name()))
                .bind(key)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.is_some())
    }

    pub async fn put(&self, ks: KeySpace, key: &[u8], value: &[u8]) -> StoreResult<()> {
        sqlx::query(&format!(
            "INSERT INTO {} (key, value) VALUES (?1, ?2) \
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            ks.name()
        ))
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn clear_keyspace(&self, ks: KeySpace) -> StoreResult<()> {
        sqlx::query(&format!("DELETE FROM {}", ks.name()))
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Reclaim space after clears. SQLite vacuums the whole file, so the
    /// keyspace argument only gates whether there is anything to do.
    pub async fn compact_keyspace(&self, _ks: KeySpace) -> StoreResult<()> {
        sqlx::query("VACUUM").execute(&self.pool).await?;
        Ok(())
    }

    /// Apply a batch of puts in one transaction. Rolls back on any error.
    pub async fn apply_batch(&self, puts: &[(KeySpace, Vec<u8>, Vec<u8>)]) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;
        for (ks, key, value) in puts {
            sqlx::query(&format!(
                "INSERT INTO {} (key, value) VALUES (?1, ?2) \
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value",
                ks.name()
            ))
            .bind(key.as_slice())
            .bind(value.as_slice())
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    /// Close the store. Idempotent; later operations fail.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}
