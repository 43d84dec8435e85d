// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Write buffer for eviction bursts.
//!
//! The [`WriteBatcher`] collects pending [`BatchOp`]s keyed by record key and
//! hands them out as one atomic batch when either the operation count or the
//! byte total crosses its threshold. A later op for a key replaces the
//! pending one in place, so a batch never carries two ops for the same key.
//!
//! Puts that raised the active-record count are marked as they are pushed,
//! and each [`FlushBatch`] says how many it carries, so a batch the store
//! rejects can be taken back out of the count.
//!
//! # Example
//!
//! ```
//! use cold_tier::{BatchConfig, BatchOp, FlushReason, WriteBatcher};
//!
//! let config = BatchConfig { flush_count: 2, flush_bytes: 1024 };
//! let mut batcher = WriteBatcher::new(config);
//!
//! let put = |k: &str| BatchOp::Put { key: k.as_bytes().to_vec(), value: vec![0; 16] };
//! assert_eq!(batcher.push(put("a")), None);
//! assert_eq!(batcher.push(put("a")), None); // superseded, still one op
//! assert_eq!(batcher.push(put("b")), Some(FlushReason::Count));
//!
//! let batch = batcher.force_flush_with_reason(FlushReason::Count).unwrap();
//! assert_eq!(batch.ops.len(), 2);
//! assert!(batcher.is_empty());
//! ```

use std::collections::HashMap;
use tracing::debug;

use crate::storage::traits::BatchOp;

/// Batch flush trigger reason
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushReason {
    /// Operation count threshold reached
    Count,
    /// Byte size threshold reached
    Size,
    /// Manual flush requested
    Manual,
    /// A restore needs to read a key that is still buffered
    ReadThrough,
    /// Shutdown flush
    Shutdown,
}

impl FlushReason {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Count => "count",
            Self::Size => "size",
            Self::Manual => "manual",
            Self::ReadThrough => "read_through",
            Self::Shutdown => "shutdown",
        }
    }
}

/// Configuration for write batching
#[derive(Debug, Clone)]
pub struct BatchConfig {
    /// Flush after this many pending operations
    pub flush_count: usize,
    /// Flush after this many pending bytes
    pub flush_bytes: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            flush_count: 10,
            flush_bytes: 4 * 1024 * 1024, // 4 MB
        }
    }
}

/// A batch of operations ready for flush
#[derive(Debug)]
pub struct FlushBatch {
    pub ops: Vec<BatchOp>,
    pub total_bytes: usize,
    pub reason: FlushReason,
    /// Puts in this batch that were counted as new records
    pub new_keys: usize,
}

/// Pending operations, one per key, in first-enqueue order.
pub struct WriteBatcher {
    config: BatchConfig,
    ops: Vec<BatchOp>,
    new_key: Vec<bool>,
    index: HashMap<Vec<u8>, usize>,
    total_bytes: usize,
}

impl WriteBatcher {
    pub fn new(config: BatchConfig) -> Self {
        Self {
            config,
            ops: Vec::new(),
            new_key: Vec::new(),
            index: HashMap::new(),
            total_bytes: 0,
        }
    }

    /// Add an op, replacing any pending op for the same key.
    /// Returns the flush reason if a threshold is now hit.
    pub fn push(&mut self, op: BatchOp) -> Option<FlushReason> {
        self.push_tracked(op, false)
    }

    /// [`push`](Self::push), marking whether the op created a new record.
    /// A superseded op keeps its mark.
    pub fn push_tracked(&mut self, op: BatchOp, new_key: bool) -> Option<FlushReason> {
        let size = op.size_bytes();
        match self.index.get(op.key()) {
            Some(&slot) => {
                self.total_bytes = self.total_bytes - self.ops[slot].size_bytes() + size;
                self.ops[slot] = op;
                self.new_key[slot] |= new_key;
            }
            None => {
                self.index.insert(op.key().to_vec(), self.ops.len());
                self.ops.push(op);
                self.new_key.push(new_key);
                self.total_bytes += size;
            }
        }
        self.threshold_hit()
    }

    fn threshold_hit(&self) -> Option<FlushReason> {
        // Check thresholds in priority order
        if self.ops.len() >= self.config.flush_count {
            Some(FlushReason::Count)
        } else if self.total_bytes >= self.config.flush_bytes {
            Some(FlushReason::Size)
        } else {
            None
        }
    }

    /// Force flush with a specific reason. `None` when nothing is pending.
    pub fn force_flush_with_reason(&mut self, reason: FlushReason) -> Option<FlushBatch> {
        if self.ops.is_empty() {
            return None;
        }
        Some(self.take(reason))
    }

    fn take(&mut self, reason: FlushReason) -> FlushBatch {
        // Capture bytes BEFORE the reset
        let total_bytes = self.total_bytes;
        let ops = std::mem::take(&mut self.ops);
        let new_keys = std::mem::take(&mut self.new_key).into_iter().filter(|n| *n).count();
        self.index.clear();
        self.total_bytes = 0;
        debug!(count = ops.len(), bytes = total_bytes, new_keys, reason = reason.as_str(), "Batch taken for flush");
        FlushBatch {
            ops,
            total_bytes,
            reason,
            new_keys,
        }
    }

    /// Whether an op for `key` is waiting in the buffer.
    #[must_use]
    pub fn contains(&self, key: &[u8]) -> bool {
        self.index.contains_key(key)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.ops.len()
    }
}
