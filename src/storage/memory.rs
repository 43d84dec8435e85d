use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::RwLock;

use super::traits::{BatchOp, BatchWriteResult, ColdStore, StorageError, StoreInfo};

/// Ordered in-process store. Nothing survives a restart.
pub struct InMemoryStore {
    data: RwLock<BTreeMap<Vec<u8>, Vec<u8>>>,
    open: AtomicBool,
}

impl InMemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            data: RwLock::new(BTreeMap::new()),
            open: AtomicBool::new(true),
        }
    }

    /// Get current record count
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    /// Check if empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.read().is_empty()
    }

    /// Clear all records
    pub fn clear(&self) {
        self.data.write().clear();
    }

    fn ensure_open(&self) -> Result<(), StorageError> {
        if self.open.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(StorageError::Unavailable("memory store is closed".into()))
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ColdStore for InMemoryStore {
    async fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError> {
        self.ensure_open()?;
        Ok(self.data.read().get(key).cloned())
    }

    async fn put(&self, key: &[u8], value: &[u8]) -> Result<(), StorageError> {
        self.ensure_open()?;
        self.data.write().insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    async fn contains(&self, key: &[u8]) -> Result<bool, StorageError> {
        self.ensure_open()?;
        Ok(self.data.read().contains_key(key))
    }

    async fn delete(&self, key: &[u8]) -> Result<bool, StorageError> {
        self.ensure_open()?;
        Ok(self.data.write().remove(key).is_some())
    }

    async fn write_batch(&self, ops: &[BatchOp]) -> Result<BatchWriteResult, StorageError> {
        self.ensure_open()?;
        let mut data = self.data.write();
        let mut result = BatchWriteResult::default();
        for op in ops {
            match op {
                BatchOp::Put { key, value } => {
                    data.insert(key.clone(), value.clone());
                    result.written += 1;
                }
                BatchOp::Delete { key } => {
                    if data.remove(key.as_slice()).is_some() {
                        result.deleted += 1;
                    }
                }
            }
        }
        Ok(result)
    }

    async fn scan(
        &self,
        after: Option<&[u8]>,
        limit: usize,
    ) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StorageError> {
        self.ensure_open()?;
        let lower = match after {
            Some(key) => Bound::Excluded(key),
            None => Bound::Unbounded,
        };
        let data = self.data.read();
        Ok(data
            .range::<[u8], _>((lower, Bound::Unbounded))
            .take(limit)
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }

    async fn count(&self) -> Result<u64, StorageError> {
        self.ensure_open()?;
        Ok(self.data.read().len() as u64)
    }

    async fn flush(&self) -> Result<(), StorageError> {
        self.ensure_open()
    }

    async fn info(&self) -> Result<StoreInfo, StorageError> {
        self.ensure_open()?;
        let data = self.data.read();
        let bytes: usize = data.iter().map(|(k, v)| k.len() + v.len()).sum();
        Ok(StoreInfo {
            backend: "memory",
            records: data.len() as u64,
            disk_bytes: bytes as u64,
            ..Default::default()
        })
    }

    async fn close(&self) -> Result<(), StorageError> {
        self.open.store(false, Ordering::Release);
        Ok(())
    }
}
