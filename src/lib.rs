//! # Cold Tier
//!
//! A disk-backed eviction tier for an in-memory key-value host.
//!
//! Instead of discarding keys under memory pressure, the host hands them to
//! the cold tier, which persists them in an embedded ordered store together
//! with their absolute expiry. On a later lookup miss the key is transparently
//! reinstated into the host with its remaining TTL.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                         Host store                          │
//! │  • Owns the live keyspace                                  │
//! │  • Fires eviction and miss hooks                           │
//! └─────────────────────────────────────────────────────────────┘
//!          │ on_eviction(key)               ▲ reinstate(key, ttl)
//!          ▼                                │
//! ┌─────────────────────────────────────────────────────────────┐
//! │                         ColdTier                            │
//! │  • Dump + stamp absolute expiry → [expiry][len][payload]   │
//! │  • Write buffer, flushed by op count or byte size          │
//! │  • Restore: lookup, expiry check, reinstate, delete        │
//! │  • Background expiry sweeper + on-demand cleanup           │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 Embedded store (SQLite, WAL)                │
//! │  • Key-ordered, survives restarts                          │
//! │  • Optional zstd compression of record bytes               │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use cold_tier::{ColdTier, ColdTierConfig, ColdTierError, InMemoryHost, RestoreOutcome};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), ColdTierError> {
//!     let config = ColdTierConfig::from_args(["path", "./cold-tier-data", "cleanup_interval", "60"])?;
//!     let host = Arc::new(InMemoryHost::new());
//!
//!     let tier = ColdTier::open(config, host.clone()).await?;
//!     tier.start().await?;
//!
//!     host.insert(b"session:9".to_vec(), b"payload".to_vec(), Some(30_000));
//!     tier.on_eviction(b"session:9").await;
//!     host.remove(b"session:9");
//!
//!     match tier.restore(b"session:9").await {
//!         Ok(RestoreOutcome::Restored { ttl_ms }) => println!("back with {ttl_ms}ms left"),
//!         Ok(RestoreOutcome::NotFound) => println!("never stored"),
//!         Err(ColdTierError::KeyExpired) => println!("expired while cold"),
//!         Err(e) => return Err(e),
//!     }
//!
//!     tier.shutdown().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Modules
//!
//! - [`coordinator`]: [`ColdTier`], hooks, commands and lifecycle
//! - [`record`]: On-disk record codec and expiry arithmetic
//! - [`storage`]: Embedded store backends (SQLite, Memory)
//! - [`batching`]: Write buffer for evicted records
//! - [`sweeper`]: Background expiry sweeping
//! - [`host`]: The host-store boundary
//! - [`resilience`]: Retry logic

pub mod batching;
pub mod clock;
pub mod compression;
pub mod config;
pub mod coordinator;
pub mod host;
pub mod metrics;
pub mod record;
pub mod resilience;
pub mod stats;
pub mod storage;
pub mod sweeper;

pub use batching::write_batcher::{BatchConfig, FlushBatch, FlushReason, WriteBatcher};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{ColdTierConfig, ConfigError, MemoryBudget};
pub use coordinator::{
    ColdTier, ColdTierError, ConfigSummary, EvictOutcome, RestoreOutcome, TierInfo, TierState,
};
pub use host::{HostError, HostStore, InMemoryHost, KeyTtl};
pub use metrics::LatencyTimer;
pub use record::{CodecError, Record};
pub use resilience::retry::RetryConfig;
pub use stats::{ColdTierStats, StatsSnapshot};
pub use storage::traits::{BatchOp, BatchWriteResult, ColdStore, StorageError, StoreInfo};
pub use storage::{InMemoryStore, SqliteStore, StoreScanner};
pub use sweeper::{CleanupReport, ExpirySweeper, SweeperHandle, SweeperState};
