//! Configuration for the cold tier.
//!
//! # Example
//!
//! ```
//! use cold_tier::ColdTierConfig;
//!
//! // Minimal config (uses defaults)
//! let config = ColdTierConfig::default();
//! assert_eq!(config.max_memory, 256 * 1024 * 1024); // 256 MB
//! assert_eq!(config.cleanup_interval_secs, 300);
//!
//! // Host-module style arguments
//! let config = ColdTierConfig::from_args([
//!     "path", "/var/lib/cold",
//!     "max-memory", "67108864",
//!     "cleanup-interval", "0",
//! ]).unwrap();
//! assert_eq!(config.path, "/var/lib/cold");
//! assert_eq!(config.cleanup_interval_secs, 0);
//! ```

use serde::Deserialize;
use thiserror::Error;

/// Smallest memory budget the store will accept.
pub const MIN_MEMORY_BYTES: usize = 20 * 1024 * 1024; // 20 MB

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required argument '{0}'")]
    Missing(&'static str),
    #[error("argument '{0}' has no value")]
    MissingValue(String),
    #[error("unknown argument '{0}'")]
    Unknown(String),
    #[error("invalid value for '{name}': {reason}")]
    Invalid { name: &'static str, reason: String },
}

/// Configuration for the cold tier.
///
/// All fields have defaults. `path` should always be set in production;
/// the fallback directory is relative to the working directory.
#[derive(Debug, Clone, Deserialize)]
pub struct ColdTierConfig {
    /// Directory holding the embedded store
    #[serde(default = "default_path")]
    pub path: String,

    /// Memory budget for the store (default: 256 MB, floor: 20 MB)
    #[serde(default = "default_max_memory")]
    pub max_memory: usize,

    /// Seconds between background sweeps (0 = sweeper disabled)
    #[serde(default = "default_cleanup_interval_secs")]
    pub cleanup_interval_secs: u64,

    /// Write buffer thresholds
    #[serde(default = "default_batch_flush_count")]
    pub batch_flush_count: usize,
    #[serde(default = "default_batch_flush_bytes")]
    pub batch_flush_bytes: usize,

    /// Keys fetched per page while sweeping
    #[serde(default = "default_sweep_page_size")]
    pub sweep_page_size: usize,

    /// zstd-compress large values on disk
    #[serde(default = "default_compression")]
    pub compression: bool,

    /// fsync on every commit instead of relying on the WAL
    #[serde(default)]
    pub sync_writes: bool,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_path() -> String { "./cold-tier-data".to_string() }
fn default_max_memory() -> usize { 256 * 1024 * 1024 } // 256 MB
fn default_cleanup_interval_secs() -> u64 { 300 }
fn default_batch_flush_count() -> usize { 10 }
fn default_batch_flush_bytes() -> usize { 4 * 1024 * 1024 } // 4 MB
fn default_sweep_page_size() -> usize { 1024 }
fn default_compression() -> bool { true }
fn default_max_connections() -> u32 { 4 }

impl Default for ColdTierConfig {
    fn default() -> Self {
        Self {
            path: default_path(),
            max_memory: default_max_memory(),
            cleanup_interval_secs: default_cleanup_interval_secs(),
            batch_flush_count: default_batch_flush_count(),
            batch_flush_bytes: default_batch_flush_bytes(),
            sweep_page_size: default_sweep_page_size(),
            compression: default_compression(),
            sync_writes: false,
            max_connections: default_max_connections(),
        }
    }
}

/// How the memory budget is divided inside the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct MemoryBudget {
    pub read_cache_bytes: usize,
    pub write_buffer_bytes: usize,
}

impl ColdTierConfig {
    /// Build a config from `name value` pairs as passed to a host module.
    ///
    /// Names are case-insensitive; `-` and `_` are interchangeable.
    /// `path` is required here, unlike the serde path.
    pub fn from_args<I, S>(args: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut config = Self::default();
        let mut saw_path = false;
        let mut iter = args.into_iter();

        while let Some(name) = iter.next() {
            let name = name.as_ref().to_ascii_lowercase().replace('_', "-");
            let value = iter
                .next()
                .ok_or_else(|| ConfigError::MissingValue(name.clone()))?;
            let value = value.as_ref();

            match name.as_str() {
                "path" => {
                    config.path = value.to_string();
                    saw_path = true;
                }
                "max-memory" => {
                    config.max_memory = value.parse().map_err(|_| ConfigError::Invalid {
                        name: "max-memory",
                        reason: format!("'{value}' is not a byte count"),
                    })?;
                }
                "cleanup-interval" => {
                    let secs: i64 = value.parse().map_err(|_| ConfigError::Invalid {
                        name: "cleanup-interval",
                        reason: format!("'{value}' is not a number of seconds"),
                    })?;
                    if secs < 0 {
                        return Err(ConfigError::Invalid {
                            name: "cleanup-interval",
                            reason: "must not be negative".into(),
                        });
                    }
                    config.cleanup_interval_secs = secs as u64;
                }
                _ => return Err(ConfigError::Unknown(name)),
            }
        }

        if !saw_path {
            return Err(ConfigError::Missing("path"));
        }
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.path.trim().is_empty() {
            return Err(ConfigError::Invalid {
                name: "path",
                reason: "must not be empty".into(),
            });
        }
        if self.max_memory < MIN_MEMORY_BYTES {
            return Err(ConfigError::Invalid {
                name: "max-memory",
                reason: format!("{} bytes is below the {} byte minimum", self.max_memory, MIN_MEMORY_BYTES),
            });
        }
        if self.batch_flush_count == 0 {
            return Err(ConfigError::Invalid {
                name: "batch_flush_count",
                reason: "must be at least 1".into(),
            });
        }
        if self.sweep_page_size == 0 {
            return Err(ConfigError::Invalid {
                name: "sweep_page_size",
                reason: "must be at least 1".into(),
            });
        }
        if self.max_connections == 0 {
            return Err(ConfigError::Invalid {
                name: "max_connections",
                reason: "must be at least 1".into(),
            });
        }
        Ok(())
    }

    /// Half the budget to the read cache, the rest to write buffering.
    #[must_use]
    pub fn memory_budget(&self) -> MemoryBudget {
        let read_cache_bytes = self.max_memory / 2;
        MemoryBudget {
            read_cache_bytes,
            write_buffer_bytes: self.max_memory - read_cache_bytes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ColdTierConfig::default();
        assert_eq!(config.path, "./cold-tier-data");
        assert_eq!(config.max_memory, 256 * 1024 * 1024);
        assert_eq!(config.cleanup_interval_secs, 300);
        assert_eq!(config.batch_flush_count, 10);
        assert!(config.compression);
        assert!(!config.sync_writes);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_deserialize_partial_json() {
        let config: ColdTierConfig =
            serde_json::from_str(r#"{"path": "/tmp/cold", "cleanup_interval_secs": 0}"#).unwrap();
        assert_eq!(config.path, "/tmp/cold");
        assert_eq!(config.cleanup_interval_secs, 0);
        assert_eq!(config.max_memory, 256 * 1024 * 1024);
    }

    #[test]
    fn test_from_args_aliases() {
        let config = ColdTierConfig::from_args([
            "PATH", "/data", "max_memory", "33554432", "Cleanup_Interval", "60",
        ])
        .unwrap();
        assert_eq!(config.path, "/data");
        assert_eq!(config.max_memory, 32 * 1024 * 1024);
        assert_eq!(config.cleanup_interval_secs, 60);
    }

    #[test]
    fn test_from_args_requires_path() {
        let err = ColdTierConfig::from_args(["max-memory", "33554432"]).unwrap_err();
        assert_eq!(err, ConfigError::Missing("path"));
    }

    #[test]
    fn test_from_args_rejects_bad_values() {
        assert!(matches!(
            ColdTierConfig::from_args(["path", "/d", "cleanup-interval", "-5"]),
            Err(ConfigError::Invalid { name: "cleanup-interval", .. })
        ));
        assert!(matches!(
            ColdTierConfig::from_args(["path", "/d", "max-memory", "1024"]),
            Err(ConfigError::Invalid { name: "max-memory", .. })
        ));
        assert!(matches!(
            ColdTierConfig::from_args(["path", "/d", "max-memory", "lots"]),
            Err(ConfigError::Invalid { name: "max-memory", .. })
        ));
        assert!(matches!(
            ColdTierConfig::from_args(["path", "/d", "colour", "blue"]),
            Err(ConfigError::Unknown(_))
        ));
        assert!(matches!(
            ColdTierConfig::from_args(["path"]),
            Err(ConfigError::MissingValue(_))
        ));
    }

    #[test]
    fn test_memory_budget_split() {
        let config = ColdTierConfig {
            max_memory: 21 * 1024 * 1024 + 1,
            ..Default::default()
        };
        let budget = config.memory_budget();
        assert_eq!(budget.read_cache_bytes + budget.write_buffer_bytes, config.max_memory);
        assert!(budget.write_buffer_bytes >= budget.read_cache_bytes);
    }
}
