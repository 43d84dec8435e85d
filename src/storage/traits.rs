use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    #[error("Store unavailable: {0}")]
    Unavailable(String),
    #[error("Storage backend error: {0}")]
    Backend(String),
    /// The stored bytes exist but cannot be turned back into a value.
    #[error("Stored value is unreadable: {0}")]
    Corrupted(String),
}

/// A single buffered mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOp {
    Put { key: Vec<u8>, value: Vec<u8> },
    Delete { key: Vec<u8> },
}

impl BatchOp {
    #[must_use]
    pub fn key(&self) -> &[u8] {
        match self {
            Self::Put { key, .. } | Self::Delete { key } => key,
        }
    }

    /// Bytes this op carries, for write-buffer accounting.
    #[must_use]
    pub fn size_bytes(&self) -> usize {
        match self {
            Self::Put { key, value } => key.len() + value.len(),
            Self::Delete { key } => key.len(),
        }
    }
}

/// Outcome of an atomic batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchWriteResult {
    /// Put operations applied
    pub written: usize,
    /// Delete operations that actually removed a record
    pub deleted: usize,
}

/// Store introspection for the info command.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StoreInfo {
    pub backend: &'static str,
    pub records: u64,
    /// Bytes held in the store's own files or memory
    pub disk_bytes: u64,
    pub file_count: usize,
    pub page_size: u64,
    pub page_count: u64,
    pub freelist_pages: u64,
    pub cache_bytes: usize,
    pub write_buffer_bytes: usize,
}

/// Embedded, key-ordered persistent store behind the cold tier.
///
/// Implementations must be safe for concurrent use and must fail with
/// [`StorageError::Unavailable`] once closed.
#[async_trait]
pub trait ColdStore: Send + Sync {
    async fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError>;
    async fn put(&self, key: &[u8], value: &[u8]) -> Result<(), StorageError>;

    /// Whether a record exists, without reading its value.
    async fn contains(&self, key: &[u8]) -> Result<bool, StorageError>;

    /// Remove a key, reporting whether a record was actually there.
    async fn delete(&self, key: &[u8]) -> Result<bool, StorageError>;

    /// Apply all ops together. Ops are applied in order.
    async fn write_batch(&self, ops: &[BatchOp]) -> Result<BatchWriteResult, StorageError>;

    /// One page of records with keys strictly greater than `after`, in key order.
    ///
    /// A row whose value cannot be unpacked is still returned, with the raw
    /// stored bytes, so one bad row never fails the page.
    async fn scan(
        &self,
        after: Option<&[u8]>,
        limit: usize,
    ) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StorageError>;

    /// Number of records currently stored.
    async fn count(&self) -> Result<u64, StorageError>;

    /// Push buffered data to durable storage.
    async fn flush(&self) -> Result<(), StorageError>;

    async fn info(&self) -> Result<StoreInfo, StorageError>;

    /// Release the store. Every later call fails with `Unavailable`.
    async fn close(&self) -> Result<(), StorageError>;
}
