//! Tier lifecycle: start and shutdown.

use std::time::{Duration, Instant};

use tracing::{info, warn};

use crate::sweeper::SweeperHandle;

use super::{ColdTier, ColdTierError, TierState};

impl ColdTier {
    /// Start the tier.
    ///
    /// Startup flow:
    /// 1. Seed the active-record count from the store (expired records included;
    ///    they are subtracted as sweeps or restores remove them)
    /// 2. Spawn the background sweeper unless the interval is 0
    /// 3. Running
    ///
    /// Calling `start` on a tier that is not freshly created is a no-op.
    #[tracing::instrument(skip(self))]
    pub async fn start(&self) -> Result<(), ColdTierError> {
        if self.state() != TierState::Created {
            warn!(state = %self.state(), "start() called on a tier that is not in Created state");
            return Ok(());
        }
        let started = Instant::now();

        let records = self.store.count().await?;
        self.stats.set_records_stored(records);

        let interval_secs = self.config.cleanup_interval_secs;
        if interval_secs > 0 {
            let handle = SweeperHandle::spawn(self.sweeper.clone(), Duration::from_secs(interval_secs));
            *self.sweeper_handle.lock().await = Some(handle);
        } else {
            info!("Background expiry sweeping disabled");
        }

        self.set_state(TierState::Running);
        crate::metrics::record_latency("startup", started.elapsed());
        info!(
            records,
            path = %self.config.path,
            cleanup_interval_secs = interval_secs,
            "Cold tier started"
        );
        Ok(())
    }

    /// Stop the sweeper, flush the write buffer and close the store.
    ///
    /// Never fails; problems are logged. Idempotent.
    pub async fn shutdown(&self) {
        if matches!(self.state(), TierState::ShuttingDown | TierState::Stopped) {
            return;
        }
        let started = Instant::now();
        info!("Initiating cold tier shutdown...");
        self.set_state(TierState::ShuttingDown);

        // Join the task before touching the store so no pass races the close.
        let handle = self.sweeper_handle.lock().await.take();
        if let Some(handle) = handle {
            handle.stop().await;
        }

        self.drain_for_shutdown().await;

        if let Err(e) = self.store.flush().await {
            warn!(error = %e, "Store flush failed during shutdown");
        }
        if let Err(e) = self.store.close().await {
            warn!(error = %e, "Store close failed during shutdown");
        }

        self.set_state(TierState::Stopped);
        crate::metrics::record_latency("shutdown", started.elapsed());
        info!(stats = ?self.stats.snapshot(), "Cold tier shutdown complete");
    }

    fn set_state(&self, state: TierState) {
        let _ = self.state.send(state);
        crate::metrics::set_tier_state(&state.to_string());
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crate::config::ColdTierConfig;
    use crate::coordinator::{ColdTier, ColdTierError, TierState};
    use crate::host::InMemoryHost;
    use crate::record::Record;
    use crate::storage::memory::InMemoryStore;
    use crate::storage::traits::ColdStore;

    #[tokio::test]
    async fn test_start_seeds_active_count() {
        let store = Arc::new(InMemoryStore::new());
        let live = Record::new(0, b"a".to_vec()).encode().unwrap();
        let expired = Record::new(1, b"b".to_vec()).encode().unwrap();
        store.put(b"a", &live).await.unwrap();
        store.put(b"b", &expired).await.unwrap();

        let tier = ColdTier::new(ColdTierConfig::default(), store, Arc::new(InMemoryHost::new())).unwrap();
        tier.start().await.unwrap();

        assert!(tier.is_running());
        assert_eq!(tier.stats().records_stored, 2);
        assert!(tier.info().await.unwrap().sweeper.is_some());
        tier.shutdown().await;
    }

    #[tokio::test]
    async fn test_shutdown_flushes_and_closes() {
        let store = Arc::new(InMemoryStore::new());
        let host = Arc::new(InMemoryHost::new());
        let config = ColdTierConfig {
            cleanup_interval_secs: 0,
            ..Default::default()
        };
        let tier = ColdTier::new(config, store.clone(), host.clone()).unwrap();
        tier.start().await.unwrap();
        assert!(tier.info().await.unwrap().sweeper.is_none());

        host.insert(b"k".to_vec(), b"v".to_vec(), None);
        tier.on_eviction(b"k").await;
        assert_eq!(tier.pending_writes().await, 1);

        tier.shutdown().await;
        assert_eq!(tier.state(), TierState::Stopped);
        assert_eq!(store.len(), 1);
        assert!(store.get(b"k").await.is_err());

        // Second shutdown is a no-op
        tier.shutdown().await;
        assert_eq!(tier.state(), TierState::Stopped);
    }

    #[tokio::test]
    async fn test_start_on_closed_store_fails() {
        let store = Arc::new(InMemoryStore::new());
        store.close().await.unwrap();
        let tier = ColdTier::new(ColdTierConfig::default(), store, Arc::new(InMemoryHost::new())).unwrap();

        assert!(matches!(tier.start().await, Err(ColdTierError::StoreUnavailable(_))));
        assert_eq!(tier.state(), TierState::Created);
    }
}
