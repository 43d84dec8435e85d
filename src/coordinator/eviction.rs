// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Eviction hook: persist a key the host is about to drop.

use tracing::{debug, warn};

use crate::batching::write_batcher::FlushReason;
use crate::host::KeyTtl;
use crate::record::{self, CodecError, Record};
use crate::storage::traits::BatchOp;

use super::{display_key, ColdTier, ColdTierError};

/// What [`ColdTier::evict`] did with a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvictOutcome {
    /// Record buffered with this absolute expiry (0 = none)
    Stored { expiry_ms: i64 },
    /// Host had nothing to dump; nothing written
    Skipped,
}

impl ColdTier {
    /// Host callback fired just before `key` is evicted.
    ///
    /// Never fails from the host's point of view: every problem is logged
    /// and the host proceeds with the eviction.
    pub async fn on_eviction(&self, key: &[u8]) {
        if let Err(e) = self.evict(key).await {
            crate::metrics::record_error("evict", "hook");
            warn!(key = %display_key(key), error = %e, "Eviction hook failed; key not persisted");
        }
    }

    /// Dump `key` from the host, stamp its absolute expiry and buffer the record.
    pub async fn evict(&self, key: &[u8]) -> Result<EvictOutcome, ColdTierError> {
        let _timer = crate::metrics::LatencyTimer::new("evict");

        // The key can vanish between the eviction decision and this call.
        let payload = match self.host.dump(key).await {
            Ok(Some(payload)) => payload,
            Ok(None) => {
                crate::metrics::record_eviction_skipped("key_gone");
                debug!(key = %display_key(key), "Evicted key already gone from host; nothing to store");
                return Ok(EvictOutcome::Skipped);
            }
            Err(e) => {
                crate::metrics::record_eviction_skipped("dump_failed");
                debug!(key = %display_key(key), error = %e, "Host could not dump evicted key; nothing to store");
                return Ok(EvictOutcome::Skipped);
            }
        };

        let ttl = self.host.ttl(key).await.unwrap_or_else(|e| {
            warn!(key = %display_key(key), error = %e, "TTL query failed; storing without expiry");
            KeyTtl::NoExpiry
        });
        let expiry_ms = record::absolute_expiry(ttl, self.clock.now_ms());

        let encoded = Record::new(expiry_ms, payload).encode().map_err(|e| match e {
            CodecError::PayloadTooLarge(len) => {
                crate::metrics::record_eviction_skipped("too_large");
                ColdTierError::PayloadTooLarge(len)
            }
            other => ColdTierError::CorruptedData {
                key: display_key(key).into_owned(),
                source: other,
            },
        })?;
        let bytes = encoded.len();

        let mut batcher = self.batcher.lock().await;

        // A buffered put was already counted when it was pushed.
        let is_new = !batcher.contains(key) && !self.store.contains(key).await?;

        let threshold = batcher.push_tracked(
            BatchOp::Put {
                key: key.to_vec(),
                value: encoded,
            },
            is_new,
        );

        self.stats.record_write(bytes);
        if is_new {
            self.stats.record_new_key();
        }
        crate::metrics::record_eviction(bytes);
        crate::metrics::set_pending_writes(batcher.len());
        debug!(key = %display_key(key), expiry_ms, bytes, is_new, "Evicted key buffered");

        if let Some(reason) = threshold {
            if let Some(batch) = batcher.force_flush_with_reason(reason) {
                // Failure already logged; the host proceeds either way.
                let _ = self.commit_batch(batch).await;
            }
        }
        drop(batcher);

        Ok(EvictOutcome::Stored { expiry_ms })
    }

    /// Drain on the way out so buffered evictions are not lost.
    pub(super) async fn drain_for_shutdown(&self) {
        if let Err(e) = self.drain(FlushReason::Shutdown).await {
            warn!(error = %e, "Shutdown flush failed");
        }
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

    fn fixture() -> (Arc<InMemoryStore>, Arc<InMemoryHost>, ColdTier) {
        let clock = Arc::new(ManualClock::new(NOW));
        let store = Arc::new(InMemoryStore::new());
        let host = Arc::new(InMemoryHost::with_clock(clock.clone()));
        let config = ColdTierConfig {
            batch_flush_count: 1,
            ..Default::default()
        };
        let tier = ColdTier::with_clock(config, store.clone(), host.clone(), clock).unwrap();
        (store, host, tier)
    }

    #[tokio::test]
    async fn test_evict_stamps_absolute_expiry() {
        let (store, host, tier) = fixture();
        host.insert(b"u:42".to_vec(), vec![1, 2, 3], Some(5000));

        let outcome = tier.evict(b"u:42").await.unwrap();
        assert_eq!(outcome, EvictOutcome::Stored { expiry_ms: NOW + 5000 });

        let stored = store.get(b"u:42").await.unwrap().unwrap();
        let record = Record::decode(&stored).unwrap();
        assert_eq!(record.expiry_ms, NOW + 5000);
        assert_eq!(record.payload, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_evict_missing_key_is_skipped() {
        let (store, _host, tier) = fixture();
        assert_eq!(tier.evict(b"ghost").await.unwrap(), EvictOutcome::Skipped);
        assert!(store.is_empty());
        assert_eq!(tier.stats().keys_written, 0);
    }

    #[tokio::test]
    async fn test_re_eviction_counts_key_once() {
        let (store, host, tier) = fixture();
        host.insert(b"k".to_vec(), b"one".to_vec(), None);
        tier.evict(b"k").await.unwrap();
        host.insert(b"k".to_vec(), b"two".to_vec(), None);
        tier.evict(b"k").await.unwrap();

        let stats = tier.stats();
        assert_eq!(stats.keys_written, 2);
        assert_eq!(stats.records_stored, 1);
        let record = Record::decode(&store.get(b"k").await.unwrap().unwrap()).unwrap();
        assert_eq!(record.payload, b"two".to_vec());
    }

    #[tokio::test]
    async fn test_hook_swallows_store_errors() {
        let (store, host, tier) = fixture();
        host.insert(b"k".to_vec(), b"v".to_vec(), None);
        store.close().await.unwrap();

        tier.on_eviction(b"k").await;
        assert!(matches!(tier.evict(b"k").await, Err(ColdTierError::StoreUnavailable(_))));
    }
}
