// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! SQLite-backed cold store.
//!
//! One table, keyed by the raw key bytes:
//!
//! ```sql
//! CREATE TABLE cold_records (
//!   key        BLOB PRIMARY KEY,   -- host key, verbatim
//!   value      BLOB NOT NULL,      -- encoded record, possibly zstd-compressed
//!   compressed INTEGER NOT NULL    -- 1 if `value` is a zstd frame
//! ) WITHOUT ROWID
//! ```
//!
//! SQLite compares BLOBs with `memcmp`, so `ORDER BY key` is bytewise key
//! order and keyset pagination (`WHERE key > ?`) gives a stable scan.
//!
//! The database runs in WAL mode with `synchronous = NORMAL`: commits are
//! durable against process crashes but not fsync'd per write. The memory
//! budget is split between the page cache and the WAL auto-checkpoint size.

use std::borrow::Cow;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteRow,
    SqliteSynchronous,
};
use sqlx::Row;
use tracing::{debug, info, warn};

use super::traits::{BatchOp, BatchWriteResult, ColdStore, StorageError, StoreInfo};
use crate::compression;
use crate::config::{ColdTierConfig, MemoryBudget};
use crate::resilience::retry::{retry, RetryConfig};

/// Database file name inside the configured directory.
pub const DB_FILE_NAME: &str = "cold_tier.db";

/// Page size assumed when translating byte budgets into page counts.
const ASSUMED_PAGE_SIZE: usize = 4096;

pub struct SqliteStore {
    pool: SqlitePool,
    db_path: PathBuf,
    budget: MemoryBudget,
    compression: bool,
}

fn backend_err(e: sqlx::Error) -> StorageError {
    match e {
        sqlx::Error::PoolClosed => StorageError::Unavailable("sqlite pool is closed".into()),
        sqlx::Error::PoolTimedOut => StorageError::Unavailable("timed out acquiring a sqlite connection".into()),
        other => StorageError::Backend(other.to_string()),
    }
}

impl SqliteStore {
    /// Open (creating if needed) the store under `config.path`.
    ///
    /// Retries with the startup preset so a briefly locked database file
    /// doesn't abort startup, but a bad path still fails within seconds.
    pub async fn open(config: &ColdTierConfig) -> Result<Self, StorageError> {
        let dir = PathBuf::from(&config.path);
        tokio::fs::create_dir_all(&dir).await.map_err(|e| {
            StorageError::Unavailable(format!("cannot create {}: {}", dir.display(), e))
        })?;
        let db_path = dir.join(DB_FILE_NAME);
        let budget = config.memory_budget();

        // Negative cache_size is in KiB.
        let cache_kib = (budget.read_cache_bytes / 1024).max(1);
        let checkpoint_pages = (budget.write_buffer_bytes / ASSUMED_PAGE_SIZE).max(1000);

        let options = SqliteConnectOptions::new()
            .filename(&db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(if config.sync_writes {
                SqliteSynchronous::Full
            } else {
                SqliteSynchronous::Normal
            })
            .busy_timeout(Duration::from_secs(5))
            .pragma("cache_size", format!("-{cache_kib}"))
            .pragma("wal_autocheckpoint", checkpoint_pages.to_string())
            .pragma("temp_store", "MEMORY");

        let max_connections = config.max_connections;
        let options = &options;
        let pool = retry("sqlite_open", &RetryConfig::startup(), || async move {
            SqlitePoolOptions::new()
                .max_connections(max_connections)
                .acquire_timeout(Duration::from_secs(10))
                .connect_with(options.clone())
                .await
                .map_err(|e| StorageError::Unavailable(format!("cannot open sqlite store: {e}")))
        })
        .await?;

        let store = Self {
            pool,
            db_path,
            budget,
            compression: config.compression,
        };
        store.init_schema().await?;

        info!(
            path = %store.db_path.display(),
            cache_kib,
            checkpoint_pages,
            compression = store.compression,
            "SQLite cold store opened"
        );
        Ok(store)
    }

    async fn init_schema(&self) -> Result<(), StorageError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS cold_records (
                key BLOB PRIMARY KEY,
                value BLOB NOT NULL,
                compressed INTEGER NOT NULL DEFAULT 0
            ) WITHOUT ROWID
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(format!("Failed to create cold_records: {}", e)))?;
        Ok(())
    }

    /// Path of the database file.
    #[must_use]
    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    fn ensure_open(&self) -> Result<(), StorageError> {
        if self.pool.is_closed() {
            Err(StorageError::Unavailable("sqlite store is closed".into()))
        } else {
            Ok(())
        }
    }

    fn pack<'v>(&self, value: &'v [u8]) -> Result<(Cow<'v, [u8]>, bool), StorageError> {
        if !self.compression {
            return Ok((Cow::Borrowed(value), false));
        }
        match compression::maybe_compress(value) {
            Ok(Some(packed)) => Ok((Cow::Owned(packed), true)),
            Ok(None) => Ok((Cow::Borrowed(value), false)),
            Err(e) => Err(StorageError::Backend(e.to_string())),
        }
    }

    fn raw_value(row: &SqliteRow) -> Result<(Vec<u8>, bool), StorageError> {
        let value: Vec<u8> = row.try_get("value").map_err(backend_err)?;
        let compressed: i64 = row.try_get("compressed").map_err(backend_err)?;
        Ok((value, compressed != 0))
    }

    fn unpack(value: Vec<u8>, compressed: bool) -> Result<Vec<u8>, StorageError> {
        if compressed {
            compression::decompress_bytes(&value).map_err(|e| StorageError::Corrupted(e.to_string()))
        } else {
            Ok(value)
        }
    }

    async fn pragma_u64(&self, pragma: &str) -> Result<u64, StorageError> {
        let row = sqlx::query(pragma)
            .fetch_one(&self.pool)
            .await
            .map_err(backend_err)?;
        let value: i64 = row.try_get(0).map_err(backend_err)?;
        Ok(value.max(0) as u64)
    }

    async fn file_sizes(&self) -> (usize, u64) {
        let base = self.db_path.display().to_string();
        let mut files = 0;
        let mut bytes = 0;
        for path in [base.clone(), format!("{base}-wal"), format!("{base}-shm")] {
            if let Ok(meta) = tokio::fs::metadata(&path).await {
                files += 1;
                bytes += meta.len();
            }
        }
        (files, bytes)
    }
}

const UPSERT: &str = "INSERT INTO cold_records (key, value, compressed) VALUES (?, ?, ?) \
     ON CONFLICT(key) DO UPDATE SET value = excluded.value, compressed = excluded.compressed";

#[async_trait]
impl ColdStore for SqliteStore {
    async fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError> {
        self.ensure_open()?;
        let row = sqlx::query("SELECT value, compressed FROM cold_records WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(backend_err)?;
        match row {
            Some(row) => {
                let (value, compressed) = Self::raw_value(&row)?;
                Self::unpack(value, compressed).map(Some)
            }
            None => Ok(None),
        }
    }

    async fn put(&self, key: &[u8], value: &[u8]) -> Result<(), StorageError> {
        self.ensure_open()?;
        let (packed, compressed) = self.pack(value)?;
        sqlx::query(UPSERT)
            .bind(key)
            .bind(packed.as_ref())
            .bind(compressed as i64)
            .execute(&self.pool)
            .await
            .map_err(backend_err)?;
        Ok(())
    }

    async fn contains(&self, key: &[u8]) -> Result<bool, StorageError> {
        self.ensure_open()?;
        let row = sqlx::query("SELECT 1 FROM cold_records WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(backend_err)?;
        Ok(row.is_some())
    }

    async fn delete(&self, key: &[u8]) -> Result<bool, StorageError> {
        self.ensure_open()?;
        let result = sqlx::query("DELETE FROM cold_records WHERE key = ?")
            .bind(key)
            .execute(&self.pool)
            .await
            .map_err(backend_err)?;
        Ok(result.rows_affected() > 0)
    }

    async fn write_batch(&self, ops: &[BatchOp]) -> Result<BatchWriteResult, StorageError> {
        self.ensure_open()?;
        if ops.is_empty() {
            return Ok(BatchWriteResult::default());
        }

        let mut tx = self.pool.begin().await.map_err(backend_err)?;
        let mut result = BatchWriteResult::default();

        for op in ops {
            match op {
                BatchOp::Put { key, value } => {
                    let (packed, compressed) = self.pack(value)?;
                    sqlx::query(UPSERT)
                        .bind(key.as_slice())
                        .bind(packed.as_ref())
                        .bind(compressed as i64)
                        .execute(&mut *tx)
                        .await
                        .map_err(backend_err)?;
                    result.written += 1;
                }
                BatchOp::Delete { key } => {
                    let done = sqlx::query("DELETE FROM cold_records WHERE key = ?")
                        .bind(key.as_slice())
                        .execute(&mut *tx)
                        .await
                        .map_err(backend_err)?;
                    result.deleted += done.rows_affected() as usize;
                }
            }
        }

        tx.commit().await.map_err(backend_err)?;
        debug!(ops = ops.len(), written = result.written, deleted = result.deleted, "Batch committed");
        Ok(result)
    }

    async fn scan(
        &self,
        after: Option<&[u8]>,
        limit: usize,
    ) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StorageError> {
        self.ensure_open()?;
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = match after {
            Some(cursor) => {
                sqlx::query(
                    "SELECT key, value, compressed FROM cold_records WHERE key > ? ORDER BY key LIMIT ?",
                )
                .bind(cursor)
                .bind(limit)
                .fetch_all(&self.pool)
                .await
            }
            None => {
                sqlx::query("SELECT key, value, compressed FROM cold_records ORDER BY key LIMIT ?")
                    .bind(limit)
                    .fetch_all(&self.pool)
                    .await
            }
        }
        .map_err(backend_err)?;

        let mut page = Vec::with_capacity(rows.len());
        for row in &rows {
            let key: Vec<u8> = row.try_get("key").map_err(backend_err)?;
            let (raw, compressed) = Self::raw_value(row)?;
            // Hand back the stored bytes so record validation rejects the row.
            let value = if compressed {
                match compression::decompress_bytes(&raw) {
                    Ok(value) => value,
                    Err(e) => {
                        warn!(bytes = raw.len(), error = %e, "Compressed row failed to unpack during scan");
                        raw
                    }
                }
            } else {
                raw
            };
            page.push((key, value));
        }
        Ok(page)
    }

    async fn count(&self) -> Result<u64, StorageError> {
        self.ensure_open()?;
        let row = sqlx::query("SELECT COUNT(*) AS cnt FROM cold_records")
            .fetch_one(&self.pool)
            .await
            .map_err(backend_err)?;
        let count: i64 = row.try_get("cnt").map_err(backend_err)?;
        Ok(count as u64)
    }

    async fn flush(&self) -> Result<(), StorageError> {
        self.ensure_open()?;
        sqlx::query("PRAGMA wal_checkpoint(TRUNCATE)")
            .execute(&self.pool)
            .await
            .map_err(backend_err)?;
        Ok(())
    }

    async fn info(&self) -> Result<StoreInfo, StorageError> {
        self.ensure_open()?;
        let records = self.count().await?;
        let page_size = self.pragma_u64("PRAGMA page_size").await?;
        let page_count = self.pragma_u64("PRAGMA page_count").await?;
        let freelist_pages = self.pragma_u64("PRAGMA freelist_count").await?;
        let (file_count, disk_bytes) = self.file_sizes().await;

        Ok(StoreInfo {
            backend: "sqlite",
            records,
            disk_bytes,
            file_count,
            page_size,
            page_count,
            freelist_pages,
            cache_bytes: self.budget.read_cache_bytes,
            write_buffer_bytes: self.budget.write_buffer_bytes,
        })
    }

    async fn close(&self) -> Result<(), StorageError> {
        if self.pool.is_closed() {
            return Ok(());
        }
        self.pool.close().await;
        info!(path = %self.db_path.display(), "SQLite cold store closed");
        Ok(())
    }
}
