//! Tier statistics.
//!
//! Every counter is an independent atomic, bumped from the eviction hook, the
//! restore path and the sweeper without any shared lock. Readers only see
//! each counter's own value; there is no cross-counter snapshot consistency.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

#[derive(Debug, Default)]
pub struct ColdTierStats {
    records_stored: AtomicU64,
    keys_written: AtomicU64,
    keys_restored: AtomicU64,
    keys_expired: AtomicU64,
    keys_cleaned: AtomicU64,
    last_keys_cleaned: AtomicU64,
    last_cleanup_at: AtomicU64,
    bytes_written: AtomicU64,
    bytes_read: AtomicU64,
}

/// Point-in-time copy of [`ColdTierStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    /// Records currently held in the cold tier
    pub records_stored: u64,
    pub keys_written: u64,
    pub keys_restored: u64,
    /// Expired records removed, whether by restore or sweep
    pub keys_expired: u64,
    /// Expired records removed by sweeps
    pub keys_cleaned: u64,
    pub last_keys_cleaned: u64,
    /// Unix seconds of the last completed sweep, 0 if none
    pub last_cleanup_at: u64,
    pub bytes_written: u64,
    pub bytes_read: u64,
}

impl ColdTierStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the active-record count from what the store already holds.
    pub fn set_records_stored(&self, count: u64) {
        self.records_stored.store(count, Ordering::Relaxed);
        crate::metrics::set_records_stored(count);
    }

    pub fn record_new_key(&self) {
        let now = self.records_stored.fetch_add(1, Ordering::Relaxed) + 1;
        crate::metrics::set_records_stored(now);
    }

    /// Drop the active count by `n`, saturating at zero.
    pub fn record_removed(&self, n: u64) {
        if n == 0 {
            return;
        }
        let prev = self
            .records_stored
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |v| Some(v.saturating_sub(n)))
            .unwrap_or(0);
        crate::metrics::set_records_stored(prev.saturating_sub(n));
    }

    pub fn record_write(&self, bytes: usize) {
        self.keys_written.fetch_add(1, Ordering::Relaxed);
        self.bytes_written.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub fn record_restore(&self, bytes: usize) {
        self.keys_restored.fetch_add(1, Ordering::Relaxed);
        self.bytes_read.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub fn record_expired(&self, n: u64) {
        self.keys_expired.fetch_add(n, Ordering::Relaxed);
    }

    /// A sweep finished having removed `removed` records at `at_secs`.
    pub fn record_cleanup(&self, removed: u64, at_secs: u64) {
        self.keys_cleaned.fetch_add(removed, Ordering::Relaxed);
        self.last_keys_cleaned.store(removed, Ordering::Relaxed);
        self.last_cleanup_at.store(at_secs, Ordering::Relaxed);
    }

    #[must_use]
    pub fn records_stored(&self) -> u64 {
        self.records_stored.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            records_stored: self.records_stored.load(Ordering::Relaxed),
            keys_written: self.keys_written.load(Ordering::Relaxed),
            keys_restored: self.keys_restored.load(Ordering::Relaxed),
            keys_expired: self.keys_expired.load(Ordering::Relaxed),
            keys_cleaned: self.keys_cleaned.load(Ordering::Relaxed),
            last_keys_cleaned: self.last_keys_cleaned.load(Ordering::Relaxed),
            last_cleanup_at: self.last_cleanup_at.load(Ordering::Relaxed),
            bytes_written: self.bytes_written.load(Ordering::Relaxed),
            bytes_read: self.bytes_read.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_counters_accumulate() {
        let stats = ColdTierStats::new();
        stats.record_new_key();
        stats.record_new_key();
        stats.record_write(100);
        stats.record_write(50);
        stats.record_restore(100);
        stats.record_removed(1);
        stats.record_expired(2);
        stats.record_cleanup(2, 1_700_000_000);

        let snap = stats.snapshot();
        assert_eq!(snap.records_stored, 1);
        assert_eq!(snap.keys_written, 2);
        assert_eq!(snap.bytes_written, 150);
        assert_eq!(snap.keys_restored, 1);
        assert_eq!(snap.bytes_read, 100);
        assert_eq!(snap.keys_expired, 2);
        assert_eq!(snap.keys_cleaned, 2);
        assert_eq!(snap.last_keys_cleaned, 2);
        assert_eq!(snap.last_cleanup_at, 1_700_000_000);
    }

    #[test]
    fn test_removal_saturates_at_zero() {
        let stats = ColdTierStats::new();
        stats.record_new_key();
        stats.record_removed(5);
        assert_eq!(stats.records_stored(), 0);
        stats.record_removed(1);
        assert_eq!(stats.records_stored(), 0);
    }

    #[test]
    fn test_last_cleaned_is_overwritten_not_summed() {
        let stats = ColdTierStats::new();
        stats.record_cleanup(30, 10);
        stats.record_cleanup(0, 20);
        let snap = stats.snapshot();
        assert_eq!(snap.keys_cleaned, 30);
        assert_eq!(snap.last_keys_cleaned, 0);
        assert_eq!(snap.last_cleanup_at, 20);
    }

    #[test]
    fn test_concurrent_increments() {
        let stats = Arc::new(ColdTierStats::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let stats = stats.clone();
                std::thread::spawn(move || {
                    for _ in 0..1000 {
                        stats.record_new_key();
                        stats.record_write(1);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        let snap = stats.snapshot();
        assert_eq!(snap.records_stored, 8000);
        assert_eq!(snap.keys_written, 8000);
    }

    #[test]
    fn test_snapshot_serializes() {
        let json = serde_json::to_value(ColdTierStats::new().snapshot()).unwrap();
        assert_eq!(json["records_stored"], 0);
        assert_eq!(json["last_cleanup_at"], 0);
    }
}
