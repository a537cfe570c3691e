//! Cache configuration.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Default disk budget (100 MB).
pub const DEFAULT_DISK_BUDGET: u64 = 100 * 1024 * 1024;

/// Default memory budget (50 MB).
pub const DEFAULT_MEMORY_BUDGET: usize = 50 * 1024 * 1024;

/// Run eviction after this many successful stores by default.
pub const DEFAULT_EVICTION_INTERVAL: u32 = 10;

/// Configuration for [`InstEncCache`](super::InstEncCache).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Directory holding the cache files. All files live directly under it.
    pub cache_dir: PathBuf,
    /// Byte budget for the disk tier.
    pub disk_budget: u64,
    /// Byte budget for the memory tier.
    pub memory_budget: usize,
    /// Run both eviction passes every Nth successful store.
    pub eviction_interval: u32,
    /// Application version mixed into every version digest.
    pub app_version: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            cache_dir: std::env::temp_dir().join("morphstore-cache"),
            disk_budget: DEFAULT_DISK_BUDGET,
            memory_budget: DEFAULT_MEMORY_BUDGET,
            eviction_interval: DEFAULT_EVICTION_INTERVAL,
            app_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

impl CacheConfig {
    /// Create a configuration with default budgets for the given directory.
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            ..Default::default()
        }
    }

    /// Set the disk byte budget.
    pub fn with_disk_budget(mut self, bytes: u64) -> Self {
        self.disk_budget = bytes;
        self
    }

    /// Set the memory byte budget.
    pub fn with_memory_budget(mut self, bytes: usize) -> Self {
        self.memory_budget = bytes;
        self
    }

    /// Set how many stores pass between eviction runs.
    ///
    /// Zero is treated as one.
    pub fn with_eviction_interval(mut self, interval: u32) -> Self {
        self.eviction_interval = interval;
        self
    }

    /// Set the application version mixed into version digests.
    pub fn with_app_version(mut self, version: impl Into<String>) -> Self {
        self.app_version = version.into();
        self
    }

    /// Load configuration from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(Error::FileNotFound(path.to_path_buf()));
        }
        let content = fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a JSON file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Check that the configuration is usable.
    pub fn validate(&self) -> Result<()> {
        if self.cache_dir.as_os_str().is_empty() {
            return Err(Error::Config("cache_dir must not be empty".to_string()));
        }
        Ok(())
    }

    pub(crate) fn effective_interval(&self) -> u64 {
        u64::from(self.eviction_interval.max(1))
    }
}
