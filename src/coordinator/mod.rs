// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Cold tier coordinator.
//!
//! [`ColdTier`] is the context object that ties the components together:
//! - the eviction hook, which persists a host key through the write buffer
//! - the miss hook and the explicit restore command
//! - the cleanup command and the background expiry sweeper
//! - stats and info reporting
//!
//! One instance is built at startup and shared by reference (usually in an
//! `Arc`) with every host thread that delivers events.
//!
//! # Lifecycle
//!
//! ```text
//! Created → Running → ShuttingDown → Stopped
//! ```
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use cold_tier::{ColdTier, ColdTierConfig, InMemoryHost, RestoreOutcome};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), cold_tier::ColdTierError> {
//! let host = Arc::new(InMemoryHost::new());
//! let config = ColdTierConfig::from_args(["path", "/var/lib/cold-tier"])?;
//! let tier = ColdTier::open(config, host.clone()).await?;
//! tier.start().await?;
//!
//! host.insert(b"user:1".to_vec(), b"alice".to_vec(), Some(60_000));
//! tier.on_eviction(b"user:1").await;
//! host.remove(b"user:1");
//!
//! assert!(matches!(tier.restore(b"user:1").await?, RestoreOutcome::Restored { .. }));
//! tier.shutdown().await;
//! # Ok(())
//! # }
//! ```

mod types;
mod lifecycle;
mod flush;
mod eviction;
mod restore;

pub use eviction::EvictOutcome;
pub use types::{ColdTierError, ConfigSummary, RestoreOutcome, TierInfo, TierState};

use std::borrow::Cow;
use std::sync::Arc;

use tokio::sync::{watch, Mutex};
use tracing::warn;

use crate::batching::write_batcher::{BatchConfig, FlushReason, WriteBatcher};
use crate::clock::{Clock, SystemClock};
use crate::config::ColdTierConfig;
use crate::host::HostStore;
use crate::resilience::retry::RetryConfig;
use crate::stats::{ColdTierStats, StatsSnapshot};
use crate::storage::sqlite::SqliteStore;
use crate::storage::traits::ColdStore;
use crate::sweeper::{CleanupReport, ExpirySweeper, SweeperHandle};

/// The cold tier.
///
/// `Send + Sync`; every entry point takes `&self`.
pub struct ColdTier {
    pub(super) config: ColdTierConfig,

    /// Embedded ordered store holding encoded records
    pub(super) store: Arc<dyn ColdStore>,

    /// Primary store we dump from and reinstate into
    pub(super) host: Arc<dyn HostStore>,

    pub(super) clock: Arc<dyn Clock>,

    /// Pending eviction writes
    pub(super) batcher: Mutex<WriteBatcher>,

    pub(super) stats: Arc<ColdTierStats>,

    /// Tier state (broadcast to watchers)
    pub(super) state: watch::Sender<TierState>,
    pub(super) state_rx: watch::Receiver<TierState>,

    /// Shared by the cleanup command and the background task
    pub(super) sweeper: Arc<ExpirySweeper>,

    /// Background task, present only while running with a nonzero interval
    pub(super) sweeper_handle: Mutex<Option<SweeperHandle>>,
}

impl ColdTier {
    /// Build a tier over an already-open store using the system clock.
    pub fn new(
        config: ColdTierConfig,
        store: Arc<dyn ColdStore>,
        host: Arc<dyn HostStore>,
    ) -> Result<Self, ColdTierError> {
        Self::with_clock(config, store, host, Arc::new(SystemClock))
    }

    pub fn with_clock(
        config: ColdTierConfig,
        store: Arc<dyn ColdStore>,
        host: Arc<dyn HostStore>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, ColdTierError> {
        config.validate()?;
        let (state_tx, state_rx) = watch::channel(TierState::Created);

        let batch_config = BatchConfig {
            flush_count: config.batch_flush_count,
            flush_bytes: config.batch_flush_bytes,
        };
        let stats = Arc::new(ColdTierStats::new());
        let sweeper = Arc::new(ExpirySweeper::new(
            store.clone(),
            stats.clone(),
            clock.clone(),
            config.sweep_page_size,
        ));

        Ok(Self {
            config,
            store,
            host,
            clock,
            batcher: Mutex::new(WriteBatcher::new(batch_config)),
            stats,
            state: state_tx,
            state_rx,
            sweeper,
            sweeper_handle: Mutex::new(None),
        })
    }

    /// Open the SQLite store under `config.path` and build a tier over it.
    pub async fn open(config: ColdTierConfig, host: Arc<dyn HostStore>) -> Result<Self, ColdTierError> {
        config.validate()?;
        let store = SqliteStore::open(&config).await?;
        Self::new(config, Arc::new(store), host)
    }

    /// Override the retry policy used for sweep delete batches.
    #[must_use]
    pub fn with_sweep_retry(mut self, retry: RetryConfig) -> Self {
        let sweeper = ExpirySweeper::new(
            self.store.clone(),
            self.stats.clone(),
            self.clock.clone(),
            self.config.sweep_page_size,
        )
        .with_retry(retry);
        self.sweeper = Arc::new(sweeper);
        self
    }

    /// Get current tier state.
    #[must_use]
    pub fn state(&self) -> TierState {
        *self.state_rx.borrow()
    }

    /// Get a receiver to watch state changes.
    #[must_use]
    pub fn state_receiver(&self) -> watch::Receiver<TierState> {
        self.state_rx.clone()
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.state() == TierState::Running
    }

    #[must_use]
    pub fn config(&self) -> &ColdTierConfig {
        &self.config
    }

    /// Current counters.
    #[must_use]
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Operations waiting in the write buffer.
    pub async fn pending_writes(&self) -> usize {
        self.batcher.lock().await.len()
    }

    /// Run one sweep now and report what it did.
    ///
    /// Buffered evictions are flushed first so the pass sees them. Safe to
    /// call while the background sweeper is running.
    pub async fn cleanup(&self) -> Result<CleanupReport, ColdTierError> {
        let _timer = crate::metrics::LatencyTimer::new("cleanup");
        if let Err(e) = self.drain(FlushReason::Manual).await {
            warn!(error = %e, "Pending writes lost before cleanup");
        }
        Ok(self.sweeper.sweep(None).await?)
    }

    /// Store and tier diagnostics.
    pub async fn info(&self) -> Result<TierInfo, ColdTierError> {
        let store = self.store.info().await?;
        let pending_writes = self.pending_writes().await;
        let sweeper = self.sweeper_handle.lock().await.as_ref().map(SweeperHandle::state);

        Ok(TierInfo {
            state: self.state(),
            stats: self.stats.snapshot(),
            config: ConfigSummary {
                path: self.config.path.clone(),
                max_memory_bytes: self.config.max_memory,
                cleanup_interval_seconds: self.config.cleanup_interval_secs,
                batch_flush_count: self.config.batch_flush_count,
                compression: self.config.compression,
            },
            store,
            pending_writes,
            sweeper,
        })
    }
}

/// Keys are opaque bytes; log them lossily.
pub(crate) fn display_key(key: &[u8]) -> Cow<'_, str> {
    String::from_utf8_lossy(key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::InMemoryHost;
    use crate::storage::memory::InMemoryStore;

    fn tier() -> ColdTier {
        ColdTier::new(
            ColdTierConfig::default(),
            Arc::new(InMemoryStore::new()),
            Arc::new(InMemoryHost::new()),
        )
        .unwrap()
    }

    #[test]
    fn test_tier_initial_state() {
        let tier = tier();
        assert_eq!(tier.state(), TierState::Created);
        assert!(!tier.is_running());
        assert_eq!(tier.stats(), StatsSnapshot::default());
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let config = ColdTierConfig {
            max_memory: 1024,
            ..Default::default()
        };
        let result = ColdTier::new(
            config,
            Arc::new(InMemoryStore::new()),
            Arc::new(InMemoryHost::new()),
        );
        assert!(matches!(result, Err(ColdTierError::Config(_))));
    }

    #[test]
    fn test_tier_state_display() {
        assert_eq!(format!("{}", TierState::Created), "Created");
        assert_eq!(format!("{}", TierState::ShuttingDown), "ShuttingDown");
    }

    #[tokio::test]
    async fn test_info_reports_config_and_store() {
        let tier = tier();
        let info = tier.info().await.unwrap();
        assert_eq!(info.state, TierState::Created);
        assert_eq!(info.config.max_memory_bytes, 256 * 1024 * 1024);
        assert_eq!(info.config.cleanup_interval_seconds, 300);
        assert_eq!(info.store.backend, "memory");
        assert_eq!(info.pending_writes, 0);
        assert!(info.sweeper.is_none());

        let json = serde_json::to_value(&info).unwrap();
        assert_eq!(json["config"]["path"], "./cold-tier-data");
    }
}
