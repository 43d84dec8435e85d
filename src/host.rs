// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Boundary to the primary in-memory store.
//!
//! The cold tier never interprets values. It asks the host to dump a key to
//! an opaque snapshot when the key is evicted, asks for the remaining TTL,
//! and hands the snapshot back via [`HostStore::reinstate`] on restore.
//!
//! [`InMemoryHost`] is a small reference host with real TTL behaviour, used
//! by tests and the demo.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use thiserror::Error;

use crate::clock::{Clock, SystemClock};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HostError {
    #[error("host rejected the operation: {0}")]
    Rejected(String),
    #[error("host unavailable: {0}")]
    Unavailable(String),
}

/// Remaining time-to-live as reported by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyTtl {
    /// Milliseconds until expiry.
    Remaining(i64),
    /// The key exists but never expires.
    NoExpiry,
    /// The host no longer holds the key.
    Missing,
}

impl KeyTtl {
    /// Interpret a PTTL-style reply: `-1` no expiry, `-2` missing.
    #[must_use]
    pub fn from_pttl(pttl: i64) -> Self {
        match pttl {
            -2 => Self::Missing,
            ms if ms < 0 => Self::NoExpiry,
            ms => Self::Remaining(ms),
        }
    }
}

#[async_trait]
pub trait HostStore: Send + Sync {
    /// Serialize the key's current value. `None` if the key is already gone.
    async fn dump(&self, key: &[u8]) -> Result<Option<Vec<u8>>, HostError>;

    /// Remaining TTL of the key.
    async fn ttl(&self, key: &[u8]) -> Result<KeyTtl, HostError>;

    /// Recreate the key from a snapshot, replacing whatever the host holds.
    /// A `ttl_ms` of 0 makes the key permanent.
    async fn reinstate(&self, key: &[u8], payload: &[u8], ttl_ms: i64) -> Result<(), HostError>;
}

#[derive(Debug, Clone)]
struct HostEntry {
    value: Vec<u8>,
    expires_at_ms: Option<i64>,
}

/// DashMap-backed host with lazy expiry.
///
/// Snapshots are the raw value bytes; "dumping" is a copy.
pub struct InMemoryHost {
    data: DashMap<Vec<u8>, HostEntry>,
    clock: Arc<dyn Clock>,
}

impl InMemoryHost {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            data: DashMap::new(),
            clock,
        }
    }

    /// Store a value with an optional TTL in milliseconds.
    pub fn insert(&self, key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>, ttl_ms: Option<i64>) {
        let expires_at_ms = ttl_ms.map(|ttl| self.clock.now_ms() + ttl);
        self.data.insert(
            key.into(),
            HostEntry {
                value: value.into(),
                expires_at_ms,
            },
        );
    }

    #[must_use]
    pub fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        self.live(key).map(|entry| entry.value)
    }

    /// Remaining TTL of a live key, `None` if missing or permanent.
    #[must_use]
    pub fn ttl_ms(&self, key: &[u8]) -> Option<i64> {
        self.live(key)
            .and_then(|entry| entry.expires_at_ms)
            .map(|at| at - self.clock.now_ms())
    }

    /// Drop a key, as the host does right after the eviction hook returns.
    pub fn remove(&self, key: &[u8]) -> bool {
        self.data.remove(key).is_some()
    }

    #[must_use]
    pub fn contains(&self, key: &[u8]) -> bool {
        self.live(key).is_some()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    fn live(&self, key: &[u8]) -> Option<HostEntry> {
        let now = self.clock.now_ms();
        let entry = self.data.get(key)?.clone();
        match entry.expires_at_ms {
            Some(at) if at <= now => {
                self.data.remove(key);
                None
            }
            _ => Some(entry),
        }
    }
}

impl Default for InMemoryHost {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HostStore for InMemoryHost {
    async fn dump(&self, key: &[u8]) -> Result<Option<Vec<u8>>, HostError> {
        Ok(self.get(key))
    }

    async fn ttl(&self, key: &[u8]) -> Result<KeyTtl, HostError> {
        Ok(match self.live(key) {
            None => KeyTtl::Missing,
            Some(HostEntry { expires_at_ms: None, .. }) => KeyTtl::NoExpiry,
            Some(HostEntry { expires_at_ms: Some(at), .. }) => {
                KeyTtl::Remaining(at - self.clock.now_ms())
            }
        })
    }

    async fn reinstate(&self, key: &[u8], payload: &[u8], ttl_ms: i64) -> Result<(), HostError> {
        if ttl_ms < 0 {
            return Err(HostError::Rejected(format!("invalid ttl {ttl_ms}")));
        }
        let ttl = (ttl_ms > 0).then_some(ttl_ms);
        self.insert(key.to_vec(), payload.to_vec(), ttl);
        Ok(())
    }
}
