// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Expiry sweeper.
//!
//! Walks the whole cold tier in key order, collects every record whose
//! absolute expiry has passed, and removes them in one atomic batch at the
//! end of the pass. Records that fail to decode are counted and left alone.
//!
//! # State machine
//!
//! ```text
//!            ┌──── interval elapsed ────┐
//!            ▼                          │
//! start → Idle ───────────────────→ Scanning
//!            │                          │
//!            └──── stop signal ─────────┴──→ Stopped
//! ```
//!
//! The stop signal is a `watch` channel observed both while sleeping and
//! between records during a scan, so shutdown never waits out an interval or
//! a full pass over a large tier.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::clock::Clock;
use crate::record;
use crate::resilience::retry::{retry, RetryConfig};
use crate::stats::ColdTierStats;
use crate::storage::scan::StoreScanner;
use crate::storage::traits::{BatchOp, ColdStore, StorageError};

/// Background sweeper state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SweeperState {
    /// Waiting for the next interval
    Idle,
    /// Pass in progress
    Scanning,
    /// Stop signal observed; the task has exited or is exiting
    Stopped,
}

impl std::fmt::Display for SweeperState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "Idle"),
            Self::Scanning => write!(f, "Scanning"),
            Self::Stopped => write!(f, "Stopped"),
        }
    }
}

/// Result of one sweep pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CleanupReport {
    /// Records examined
    pub scanned: u64,
    /// Records removed
    pub removed: u64,
    /// Records skipped because they failed to decode
    pub corrupted: u64,
    /// The pass was interrupted by a stop signal
    pub cancelled: bool,
}

pub struct ExpirySweeper {
    store: Arc<dyn ColdStore>,
    stats: Arc<ColdTierStats>,
    clock: Arc<dyn Clock>,
    page_size: usize,
    retry: RetryConfig,
}

impl ExpirySweeper {
    pub fn new(
        store: Arc<dyn ColdStore>,
        stats: Arc<ColdTierStats>,
        clock: Arc<dyn Clock>,
        page_size: usize,
    ) -> Self {
        Self {
            store,
            stats,
            clock,
            page_size,
            retry: RetryConfig::batch_write(),
        }
    }

    #[must_use]
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Run one full pass.
    ///
    /// `now` is read once at the start. If `cancel` flips to `true` mid-scan
    /// the pass stops early but still deletes what it has already found.
    pub async fn sweep(
        &self,
        cancel: Option<&watch::Receiver<bool>>,
    ) -> Result<CleanupReport, StorageError> {
        let started = Instant::now();
        let now = self.clock.now_ms();
        let mut report = CleanupReport::default();
        let mut doomed = Vec::new();

        let mut scanner = StoreScanner::new(self.store.as_ref(), self.page_size);
        while let Some((key, value)) = scanner.next().await? {
            if cancel.is_some_and(|rx| *rx.borrow()) {
                report.cancelled = true;
                break;
            }
            report.scanned += 1;

            match record::peek_expiry(&value) {
                Ok(expiry) if record::is_expired(expiry, now) => {
                    debug!(key = %String::from_utf8_lossy(&key), expiry_ms = expiry, now_ms = now, "Expired record queued for removal");
                    doomed.push(BatchOp::Delete { key });
                }
                Ok(_) => {}
                Err(e) => {
                    report.corrupted += 1;
                    crate::metrics::record_corruption("sweep");
                    warn!(key = %String::from_utf8_lossy(&key), error = %e, "Skipping corrupted record");
                }
            }
        }

        if !doomed.is_empty() {
            let store = &self.store;
            let ops = doomed.as_slice();
            let result = retry("sweep_delete", &self.retry, || async move {
                store.write_batch(ops).await
            })
            .await
            .inspect_err(|_| crate::metrics::record_error("sweep", "delete_batch"))?;
            report.removed = result.deleted as u64;
        }

        self.stats.record_expired(report.removed);
        self.stats.record_removed(report.removed);
        self.stats
            .record_cleanup(report.removed, self.clock.now_secs().max(0) as u64);
        crate::metrics::record_expired("sweep", report.removed);
        crate::metrics::record_sweep(report.scanned, report.removed, started.elapsed());

        info!(
            scanned = report.scanned,
            removed = report.removed,
            corrupted = report.corrupted,
            cancelled = report.cancelled,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Sweep completed"
        );
        Ok(report)
    }
}

/// Handle to the background sweep task.
pub struct SweeperHandle {
    stop_tx: watch::Sender<bool>,
    state_rx: watch::Receiver<SweeperState>,
    join: JoinHandle<()>,
}

impl SweeperHandle {
    /// Spawn the sweep loop on the current runtime. The first pass runs one
    /// `interval` after spawning.
    pub fn spawn(sweeper: Arc<ExpirySweeper>, interval: Duration) -> Self {
        let (stop_tx, stop_rx) = watch::channel(false);
        let (state_tx, state_rx) = watch::channel(SweeperState::Idle);
        let join = tokio::spawn(run_loop(sweeper, interval, stop_rx, state_tx));
        Self {
            stop_tx,
            state_rx,
            join,
        }
    }

    #[must_use]
    pub fn state(&self) -> SweeperState {
        *self.state_rx.borrow()
    }

    /// Watch state transitions.
    #[must_use]
    pub fn state_receiver(&self) -> watch::Receiver<SweeperState> {
        self.state_rx.clone()
    }

    /// Signal the task and wait for it to exit.
    pub async fn stop(self) {
        let _ = self.stop_tx.send(true);
        if let Err(e) = self.join.await {
            error!(error = %e, "Sweeper task ended abnormally");
        }
    }
}

async fn run_loop(
    sweeper: Arc<ExpirySweeper>,
    interval: Duration,
    mut stop_rx: watch::Receiver<bool>,
    state_tx: watch::Sender<SweeperState>,
) {
    info!(interval_secs = interval.as_secs(), "Expiry sweeper started");

    loop {
        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            changed = stop_rx.changed() => {
                // Err means the handle was dropped
                if changed.is_err() || *stop_rx.borrow() {
                    break;
                }
                continue;
            }
        }
        if *stop_rx.borrow() {
            break;
        }

        state_tx.send_replace(SweeperState::Scanning);
        if let Err(e) = sweeper.sweep(Some(&stop_rx)).await {
            warn!(error = %e, "Background sweep failed; will retry next interval");
        }
        state_tx.send_replace(SweeperState::Idle);
    }

    state_tx.send_replace(SweeperState::Stopped);
    info!("Expiry sweeper stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::record::Record;
    use crate::storage::memory::InMemoryStore;

    const NOW: i64 = 1_700_000_000_000;

    fn fixture() -> (Arc<InMemoryStore>, Arc<ColdTierStats>, Arc<ManualClock>, ExpirySweeper) {
        let store = Arc::new(InMemoryStore::new());
        let stats = Arc::new(ColdTierStats::new());
        let clock = Arc::new(ManualClock::new(NOW));
        let sweeper = ExpirySweeper::new(store.clone(), stats.clone(), clock.clone(), 7)
            .with_retry(RetryConfig::test());
        (store, stats, clock, sweeper)
    }

    async fn put_record(store: &InMemoryStore, key: &str, expiry_ms: i64) {
        let bytes = Record::new(expiry_ms, key.as_bytes().to_vec()).encode().unwrap();
        store.put(key.as_bytes(), &bytes).await.unwrap();
    }

    #[tokio::test]
    async fn test_sweep_removes_only_expired() {
        let (store, stats, _clock, sweeper) = fixture();
        put_record(&store, "past", NOW - 1).await;
        put_record(&store, "boundary", NOW).await;
        put_record(&store, "future", NOW + 1).await;
        put_record(&store, "forever", 0).await;
        stats.set_records_stored(4);

        let report = sweeper.sweep(None).await.unwrap();
        assert_eq!(report.scanned, 4);
        assert_eq!(report.removed, 2);
        assert!(!report.cancelled);

        assert!(store.get(b"past").await.unwrap().is_none());
        assert!(store.get(b"boundary").await.unwrap().is_none());
        assert!(store.get(b"future").await.unwrap().is_some());
        assert!(store.get(b"forever").await.unwrap().is_some());

        let snap = stats.snapshot();
        assert_eq!(snap.records_stored, 2);
        assert_eq!(snap.keys_expired, 2);
        assert_eq!(snap.keys_cleaned, 2);
        assert_eq!(snap.last_keys_cleaned, 2);
        assert_eq!(snap.last_cleanup_at, (NOW / 1000) as u64);
    }

    #[tokio::test]
    async fn test_sweep_skips_corrupted_records() {
        let (store, _stats, _clock, sweeper) = fixture();
        store.put(b"short", &[1, 2, 3]).await.unwrap();
        // Expired header but wrong declared length
        let mut bad = Record::new(NOW - 10, b"abc".to_vec()).encode().unwrap();
        bad.push(0);
        store.put(b"bad-len", &bad).await.unwrap();

        let report = sweeper.sweep(None).await.unwrap();
        assert_eq!(report.scanned, 2);
        assert_eq!(report.corrupted, 2);
        assert_eq!(report.removed, 0);
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn test_permanent_records_survive_any_elapsed_time() {
        let (store, _stats, clock, sweeper) = fixture();
        put_record(&store, "forever", 0).await;
        clock.advance(10 * 365 * 24 * 3600 * 1000);

        let report = sweeper.sweep(None).await.unwrap();
        assert_eq!(report.removed, 0);
        assert!(store.get(b"forever").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_cancelled_before_start_scans_nothing() {
        let (store, _stats, _clock, sweeper) = fixture();
        put_record(&store, "past", NOW - 1).await;

        let (_tx, rx) = watch::channel(true);
        let report = sweeper.sweep(Some(&rx)).await.unwrap();
        assert!(report.cancelled);
        assert_eq!(report.scanned, 0);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_second_pass_removes_nothing() {
        let (store, _stats, _clock, sweeper) = fixture();
        for i in 0..20 {
            put_record(&store, &format!("k{i:02}"), if i % 2 == 0 { NOW - 5 } else { 0 }).await;
        }

        assert_eq!(sweeper.sweep(None).await.unwrap().removed, 10);
        assert_eq!(sweeper.sweep(None).await.unwrap().removed, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_handle_runs_on_interval_and_stops_promptly() {
        let (store, stats, _clock, sweeper) = fixture();
        put_record(&store, "past", NOW - 1).await;

        let handle = SweeperHandle::spawn(Arc::new(sweeper), Duration::from_secs(3600));
        assert_eq!(handle.state(), SweeperState::Idle);

        tokio::time::sleep(Duration::from_secs(3601)).await;
        assert_eq!(stats.snapshot().keys_cleaned, 1);

        let mut state_rx = handle.state_receiver();
        handle.stop().await;
        assert_eq!(*state_rx.borrow_and_update(), SweeperState::Stopped);
    }
}
