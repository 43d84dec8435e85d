// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Miss hook and restore command.
//!
//! Both paths share one protocol:
//!
//! 1. point lookup (after flushing the key if its eviction is still buffered)
//! 2. decode, reporting corruption without touching the record
//! 3. expired records are deleted and reported as expired
//! 4. reinstate into the host with the remaining TTL
//! 5. delete from the cold tier only after the host accepted the key
//!
//! If the host rejects the reinstatement the record stays, so a later miss
//! can retry. Duplicate concurrent restores of one key are tolerated: only
//! the caller whose delete actually removes the record updates the counters.

use tracing::{debug, warn};

use crate::batching::write_batcher::FlushReason;
use crate::record::{CodecError, Record};
use crate::storage::traits::StorageError;

use super::{display_key, ColdTier, ColdTierError, RestoreOutcome};

impl ColdTier {
    /// Explicit restore command. Every failure is reported to the caller.
    pub async fn restore(&self, key: &[u8]) -> Result<RestoreOutcome, ColdTierError> {
        self.restore_key(key, "restore").await
    }

    /// Host callback fired on a lookup miss. Best-effort: never fails.
    pub async fn on_miss(&self, key: &[u8]) {
        match self.restore_key(key, "miss").await {
            Ok(RestoreOutcome::Restored { ttl_ms }) => {
                debug!(key = %display_key(key), ttl_ms, "Restored key on miss");
            }
            Ok(RestoreOutcome::NotFound) => {}
            Err(ColdTierError::KeyExpired) => {
                debug!(key = %display_key(key), "Missed key had expired in the cold tier");
            }
            Err(e) => {
                crate::metrics::record_error("miss", "hook");
                warn!(key = %display_key(key), error = %e, "Miss hook failed; key not restored");
            }
        }
    }

    async fn restore_key(&self, key: &[u8], source: &'static str) -> Result<RestoreOutcome, ColdTierError> {
        let _timer = crate::metrics::LatencyTimer::new(source);

        self.flush_if_pending(key).await?;

        let stored = match self.store.get(key).await {
            Ok(Some(stored)) => stored,
            Ok(None) => {
                crate::metrics::record_restore("not_found");
                return Ok(RestoreOutcome::NotFound);
            }
            Err(StorageError::Corrupted(reason)) => {
                return Err(corrupted(key, source, CodecError::Unreadable(reason)));
            }
            Err(e) => return Err(e.into()),
        };

        let record = Record::decode(&stored).map_err(|e| corrupted(key, source, e))?;

        let now = self.clock.now_ms();
        if record.is_expired_at(now) {
            if self.store.delete(key).await? {
                self.stats.record_expired(1);
                self.stats.record_removed(1);
                crate::metrics::record_expired("restore", 1);
            }
            crate::metrics::record_restore("expired");
            debug!(key = %display_key(key), expiry_ms = record.expiry_ms, now_ms = now, "Cold-tier record expired; deleted");
            return Err(ColdTierError::KeyExpired);
        }

        let ttl_ms = record.remaining_ttl_ms(now);
        if let Err(e) = self.host.reinstate(key, &record.payload, ttl_ms).await {
            crate::metrics::record_restore("reinstate_failed");
            warn!(key = %display_key(key), error = %e, "Host rejected reinstatement; record kept for retry");
            return Err(ColdTierError::ReinstateFailed(e.to_string()));
        }

        // The host now owns the key. A failed delete only leaves a stale copy
        // that the next miss or sweep will deal with.
        match self.store.delete(key).await {
            Ok(true) => {
                self.stats.record_restore(stored.len());
                self.stats.record_removed(1);
                crate::metrics::record_bytes_read(stored.len());
            }
            Ok(false) => {
                debug!(key = %display_key(key), "Record already removed by a concurrent restore");
            }
            Err(e) => {
                crate::metrics::record_error(source, "delete");
                warn!(key = %display_key(key), error = %e, "Restored key but could not delete cold-tier copy");
            }
        }

        crate::metrics::record_restore("restored");
        debug!(key = %display_key(key), ttl_ms, bytes = stored.len(), "Key reinstated into host");
        Ok(RestoreOutcome::Restored { ttl_ms })
    }

    /// Read-your-writes: commit the buffer if this key's eviction is still in it.
    async fn flush_if_pending(&self, key: &[u8]) -> Result<(), ColdTierError> {
        let mut batcher = self.batcher.lock().await;
        if !batcher.contains(key) {
            return Ok(());
        }
        if let Some(batch) = batcher.force_flush_with_reason(FlushReason::ReadThrough) {
            self.commit_batch(batch).await?;
        }
        Ok(())
    }
}

fn corrupted(key: &[u8], source: &'static str, error: CodecError) -> ColdTierError {
    crate::metrics::record_restore("corrupted");
    crate::metrics::record_corruption(source);
    warn!(key = %display_key(key), error = %error, "Corrupted cold-tier record left in place");
    ColdTierError::CorruptedData {
        key: display_key(key).into_owned(),
        source: error,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::clock::ManualClock;
    use crate::config::ColdTierConfig;
    use crate::host::InMemoryHost;
    use crate::storage::memory::InMemoryStore;
    use crate::storage::traits::ColdStore;

    const NOW: i64 = 1_700_000_000_000;

    fn fixture() -> (Arc<ManualClock>, Arc<InMemoryStore>, Arc<InMemoryHost>, ColdTier) {
        let clock = Arc::new(ManualClock::new(NOW));
        let store = Arc::new(InMemoryStore::new());
        let host = Arc::new(InMemoryHost::with_clock(clock.clone()));
        let tier = ColdTier::with_clock(ColdTierConfig::default(), store.clone(), host.clone(), clock.clone()).unwrap();
        (clock, store, host, tier)
    }

    #[tokio::test]
    async fn test_restore_reads_buffered_eviction() {
        let (_clock, store, host, tier) = fixture();
        host.insert(b"k".to_vec(), b"v".to_vec(), Some(1000));
        tier.on_eviction(b"k").await;
        host.remove(b"k");

        // Default threshold is 10, so the write is still buffered
        assert!(store.is_empty());
        assert_eq!(tier.restore(b"k").await.unwrap(), RestoreOutcome::Restored { ttl_ms: 1000 });
        assert_eq!(host.get(b"k"), Some(b"v".to_vec()));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_restore_clamps_ttl_to_one_ms() {
        let (_clock, store, host, tier) = fixture();
        let record = Record::new(NOW + 1, b"v".to_vec()).encode().unwrap();
        store.put(b"k", &record).await.unwrap();

        assert_eq!(tier.restore(b"k").await.unwrap(), RestoreOutcome::Restored { ttl_ms: 1 });
        assert_eq!(host.ttl_ms(b"k"), Some(1));
    }

    #[tokio::test]
    async fn test_corrupted_record_is_kept() {
        let (_clock, store, _host, tier) = fixture();
        store.put(b"bad", &[0u8; 5]).await.unwrap();

        assert!(matches!(
            tier.restore(b"bad").await,
            Err(ColdTierError::CorruptedData { .. })
        ));
        tier.on_miss(b"bad").await;
        assert!(store.get(b"bad").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_second_restore_reports_not_found() {
        let (_clock, store, _host, tier) = fixture();
        let record = Record::new(0, b"v".to_vec()).encode().unwrap();
        store.put(b"k", &record).await.unwrap();

        assert!(matches!(tier.restore(b"k").await.unwrap(), RestoreOutcome::Restored { ttl_ms: 0 }));
        assert_eq!(tier.restore(b"k").await.unwrap(), RestoreOutcome::NotFound);
    }
}
