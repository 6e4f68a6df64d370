//! Runtime configuration for slice caching and prefetching.
//!
//! Configuration can be loaded from a JSON file or constructed
//! programmatically. Missing fields fall back to their defaults.

use crate::cache::DEFAULT_CACHE_CAPACITY;
use crate::error::{Result, SliceError};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Default number of neighbors prefetched on each side of the current slice
pub const DEFAULT_PREFETCH_RANGE: usize = 2;

/// Default bound on how long stopping a worker may wait for it
pub const DEFAULT_STOP_TIMEOUT_MS: u64 = 1000;

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Slice cache settings.
    pub cache: CacheConfig,

    /// Prefetch settings.
    pub prefetch: PrefetchConfig,
}

/// Slice cache settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Maximum number of cached slices (0 disables caching).
    pub capacity: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CACHE_CAPACITY,
        }
    }
}

/// Prefetch settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PrefetchConfig {
    /// Neighbors to prefetch on each side of the current slice.
    pub range: usize,

    /// How long `stop_prefetching` waits for a worker before abandoning it.
    pub stop_timeout_ms: u64,
}

impl Default for PrefetchConfig {
    fn default() -> Self {
        Self {
            range: DEFAULT_PREFETCH_RANGE,
            stop_timeout_ms: DEFAULT_STOP_TIMEOUT_MS,
        }
    }
}

impl PrefetchConfig {
    pub fn stop_timeout(&self) -> Duration {
        Duration::from_millis(self.stop_timeout_ms)
    }
}

impl Config {
    /// Load configuration from a JSON file, falling back to defaults if the file is missing.
    pub fn load(path: &Path) -> Result<Self> {
        if path.exists() {
            let data = std::fs::read_to_string(path)?;
            let config: Config = serde_json::from_str(&data)?;
            config.validate()?;
            Ok(config)
        } else {
            tracing::warn!("Config file not found at {:?}, using defaults", path);
            Ok(Config::default())
        }
    }

    /// Reject settings the prefetcher cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.prefetch.stop_timeout_ms == 0 {
            return Err(SliceError::Configuration(
                "prefetch.stop_timeout_ms must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}
