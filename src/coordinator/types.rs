//! Public types for the cold tier coordinator.

use serde::Serialize;
use thiserror::Error;

use crate::config::ConfigError;
use crate::record::CodecError;
use crate::stats::StatsSnapshot;
use crate::storage::traits::{StorageError, StoreInfo};
use crate::sweeper::SweeperState;

/// Tier lifecycle state.
///
/// Use [`super::ColdTier::state()`] to check current state or
/// [`super::ColdTier::state_receiver()`] to watch for changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TierState {
    /// Constructed, store open, not yet started
    Created,
    /// Hooks and commands are live
    Running,
    /// Stopping the sweeper and draining the write buffer
    ShuttingDown,
    /// Store closed
    Stopped,
}

impl std::fmt::Display for TierState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Created => write!(f, "Created"),
            Self::Running => write!(f, "Running"),
            Self::ShuttingDown => write!(f, "ShuttingDown"),
            Self::Stopped => write!(f, "Stopped"),
        }
    }
}

/// Errors surfaced by the explicit command paths.
#[derive(Error, Debug)]
pub enum ColdTierError {
    #[error("cold store unavailable: {0}")]
    StoreUnavailable(String),
    #[error("cold store error: {0}")]
    Backend(String),
    #[error("corrupted record for key '{key}': {source}")]
    CorruptedData {
        key: String,
        #[source]
        source: CodecError,
    },
    #[error("key has expired")]
    KeyExpired,
    #[error("host rejected reinstatement: {0}")]
    ReinstateFailed(String),
    #[error("payload of {0} bytes is too large to store")]
    PayloadTooLarge(usize),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl From<StorageError> for ColdTierError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::Unavailable(msg) => Self::StoreUnavailable(msg),
            StorageError::Backend(msg) | StorageError::Corrupted(msg) => Self::Backend(msg),
        }
    }
}

/// Non-error outcomes of a restore.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestoreOutcome {
    /// The host now holds the key with this TTL (0 = permanent)
    Restored { ttl_ms: i64 },
    /// Nothing stored for the key
    NotFound,
}

/// Configuration echoed back by [`super::ColdTier::info()`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfigSummary {
    pub path: String,
    pub max_memory_bytes: usize,
    pub cleanup_interval_seconds: u64,
    pub batch_flush_count: usize,
    pub compression: bool,
}

/// Diagnostics for the info command.
#[derive(Debug, Clone, Serialize)]
pub struct TierInfo {
    pub state: TierState,
    pub stats: StatsSnapshot,
    pub config: ConfigSummary,
    pub store: StoreInfo,
    pub pending_writes: usize,
    /// `None` when the sweeper is disabled or not started
    pub sweeper: Option<SweeperState>,
}
