// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Metrics instrumentation for the cold tier.
//!
//! Uses the `metrics` crate for backend-agnostic metrics collection.
//! The embedding process is responsible for choosing the exporter.
//!
//! # Metric Naming Convention
//! - `cold_tier_` prefix for all metrics
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Labels
//! - `operation`: evict, restore, sweep, flush
//! - `outcome`: restored, not_found, expired, corrupted, reinstate_failed
//! - `source`: restore, sweep
//! - `reason`: count, size, manual, read_through, shutdown

use metrics::{counter, gauge, histogram};
use std::time::{Duration, Instant};

// ═══════════════════════════════════════════════════════════════════════════
// TRAFFIC - Hook and command outcomes
// ═══════════════════════════════════════════════════════════════════════════

/// Record an eviction written to the cold tier
pub fn record_eviction(bytes: usize) {
    counter!("cold_tier_evictions_total").increment(1);
    counter!("cold_tier_bytes_written_total").increment(bytes as u64);
}

/// Record an eviction that was skipped (key gone, payload too large, ...)
pub fn record_eviction_skipped(reason: &str) {
    counter!(
        "cold_tier_evictions_skipped_total",
        "reason" => reason.to_string()
    )
    .increment(1);
}

/// Record the outcome of a restore attempt
pub fn record_restore(outcome: &str) {
    counter!(
        "cold_tier_restores_total",
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

/// Record bytes handed back to the host
pub fn record_bytes_read(bytes: usize) {
    counter!("cold_tier_bytes_read_total").increment(bytes as u64);
}

/// Record expired records removed
pub fn record_expired(source: &str, count: u64) {
    counter!(
        "cold_tier_expired_total",
        "source" => source.to_string()
    )
    .increment(count);
}

/// Record data corruption detection
pub fn record_corruption(source: &str) {
    counter!(
        "cold_tier_corruption_detected_total",
        "source" => source.to_string()
    )
    .increment(1);
}

// ═══════════════════════════════════════════════════════════════════════════
// ERROR TRACKING - Categorized error counters for alerting
// ═══════════════════════════════════════════════════════════════════════════

/// Record an error with category for alerting
pub fn record_error(operation: &str, error_type: &str) {
    counter!(
        "cold_tier_errors_total",
        "operation" => operation.to_string(),
        "error_type" => error_type.to_string()
    )
    .increment(1);
}

// ═══════════════════════════════════════════════════════════════════════════
// BATCH FLUSH - Write buffer metrics
// ═══════════════════════════════════════════════════════════════════════════

/// Record a batch flush
pub fn record_batch_flush(reason: &str, ops: usize, bytes: usize) {
    counter!(
        "cold_tier_batch_flushes_total",
        "reason" => reason.to_string()
    )
    .increment(1);
    histogram!("cold_tier_batch_size").record(ops as f64);
    histogram!("cold_tier_batch_bytes").record(bytes as f64);
}

/// Record ops lost to a failed flush
pub fn record_batch_dropped(ops: usize) {
    counter!("cold_tier_batch_dropped_ops_total").increment(ops as u64);
}

/// Set write buffer depth
pub fn set_pending_writes(count: usize) {
    gauge!("cold_tier_pending_writes").set(count as f64);
}

// ═══════════════════════════════════════════════════════════════════════════
// SWEEPER
// ═══════════════════════════════════════════════════════════════════════════

/// Record a completed sweep
pub fn record_sweep(scanned: u64, removed: u64, duration: Duration) {
    counter!("cold_tier_sweeps_total").increment(1);
    counter!("cold_tier_sweep_scanned_total").increment(scanned);
    histogram!("cold_tier_sweep_seconds").record(duration.as_secs_f64());
    histogram!("cold_tier_sweep_removed").record(removed as f64);
}

// ═══════════════════════════════════════════════════════════════════════════
// OCCUPANCY & LIFECYCLE
// ═══════════════════════════════════════════════════════════════════════════

/// Set number of records held in the cold tier
pub fn set_records_stored(count: u64) {
    gauge!("cold_tier_records").set(count as f64);
}

/// Track tier state transitions
pub fn set_tier_state(state: &str) {
    counter!(
        "cold_tier_state_transitions_total",
        "state" => state.to_string()
    )
    .increment(1);
}

/// Record operation latency
pub fn record_latency(operation: &str, duration: Duration) {
    histogram!(
        "cold_tier_operation_seconds",
        "operation" => operation.to_string()
    )
    .record(duration.as_secs_f64());
}

/// A timing guard that records latency on drop
pub struct LatencyTimer {
    operation: &'static str,
    start: Instant,
}

impl LatencyTimer {
    /// Start a new latency timer
    pub fn new(operation: &'static str) -> Self {
        Self {
            operation,
            start: Instant::now(),
        }
    }
}

impl Drop for LatencyTimer {
    fn drop(&mut self) {
        record_latency(self.operation, self.start.elapsed());
    }
}

/// Convenience macro for timing operations
#[macro_export]
macro_rules! time_operation {
    ($op:expr) => {
        $crate::metrics::LatencyTimer::new($op)
    };
}
