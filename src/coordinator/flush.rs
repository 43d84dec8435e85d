//! Write buffer flushing.
//!
//! A flushed batch is best-effort: if the store rejects it the ops are
//! logged and dropped, never re-queued. The host held the authoritative copy
//! when it evicted, so a lost write degrades to a later miss. Keys the
//! dropped batch had counted as new are taken back out of the active count.

use std::time::Instant;
use tracing::{debug, error};

use crate::batching::write_batcher::{FlushBatch, FlushReason};
use crate::storage::traits::{BatchWriteResult, StorageError};

use super::{ColdTier, ColdTierError};

impl ColdTier {
    /// Write everything in the buffer now. Returns the number of ops flushed.
    pub async fn flush(&self) -> Result<usize, ColdTierError> {
        Ok(self.drain(FlushReason::Manual).await?)
    }

    /// Take the whole buffer under the lock and commit it.
    pub(super) async fn drain(&self, reason: FlushReason) -> Result<usize, StorageError> {
        let mut batcher = self.batcher.lock().await;
        match batcher.force_flush_with_reason(reason) {
            Some(batch) => {
                let ops = batch.ops.len();
                self.commit_batch(batch).await?;
                Ok(ops)
            }
            None => Ok(0),
        }
    }

    /// Commit one batch. Callers hold the batcher lock so batches land in order.
    pub(super) async fn commit_batch(&self, batch: FlushBatch) -> Result<BatchWriteResult, StorageError> {
        let start = Instant::now();
        let ops = batch.ops.len();
        let reason = batch.reason.as_str();

        match self.store.write_batch(&batch.ops).await {
            Ok(result) => {
                crate::metrics::record_batch_flush(reason, ops, batch.total_bytes);
                crate::metrics::record_latency("flush", start.elapsed());
                crate::metrics::set_pending_writes(0);
                debug!(ops, bytes = batch.total_bytes, reason, "Write buffer flushed");
                Ok(result)
            }
            Err(e) => {
                // Dropped new keys never reached the store.
                self.stats.record_removed(batch.new_keys as u64);
                crate::metrics::record_error("flush", "write_batch");
                crate::metrics::record_batch_dropped(ops);
                crate::metrics::set_pending_writes(0);
                error!(ops, bytes = batch.total_bytes, reason, error = %e, "Write buffer flush failed; buffered writes dropped");
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crate::config::ColdTierConfig;
    use crate::coordinator::ColdTier;
    use crate::host::InMemoryHost;
    use crate::storage::memory::InMemoryStore;
    use crate::storage::traits::ColdStore;

    #[tokio::test]
    async fn test_flush_empty_buffer_is_noop() {
        let tier = ColdTier::new(
            ColdTierConfig::default(),
            Arc::new(InMemoryStore::new()),
            Arc::new(InMemoryHost::new()),
        )
        .unwrap();
        assert_eq!(tier.flush().await.unwrap(), 0);
        assert_eq!(tier.flush().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_flush_failure_clears_buffer() {
        let store = Arc::new(InMemoryStore::new());
        let host = Arc::new(InMemoryHost::new());
        let tier = ColdTier::new(ColdTierConfig::default(), store.clone(), host.clone()).unwrap();

        host.insert(b"k".to_vec(), b"v".to_vec(), None);
        tier.on_eviction(b"k").await;
        assert_eq!(tier.pending_writes().await, 1);

        store.close().await.unwrap();
        assert!(tier.flush().await.is_err());
        assert_eq!(tier.pending_writes().await, 0);
        assert_eq!(tier.stats().records_stored, 0);
    }
}
