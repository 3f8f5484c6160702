//! Cache configuration types and defaults
//!
//! This module contains the configuration structures for the memory and disk
//! tiers, including default values and cache root resolution.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::constants::cache;
use crate::errors::{CacheError, CacheResult};

/// Configuration for the two-tier image cache
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Root directory for cache files (OS-specific if None)
    pub cache_root: Option<PathBuf>,
    /// Decoded-byte budget of the memory tier
    pub memory_budget_bytes: usize,
    /// Maximum number of images in memory (0 = unlimited)
    pub memory_count_limit: usize,
    /// Prefix of cache file names
    pub file_prefix: String,
    /// Number of finished request states kept for inspection
    pub state_history: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            cache_root: None, // Will use OS-specific cache directory
            memory_budget_bytes: cache::DEFAULT_MEMORY_BUDGET_BYTES,
            memory_count_limit: cache::DEFAULT_MEMORY_COUNT_LIMIT,
            file_prefix: cache::FILE_PREFIX.to_string(),
            state_history: cache::REQUEST_STATE_HISTORY,
        }
    }
}

impl CacheConfig {
    /// Create a new cache configuration with custom cache root
    pub fn with_cache_root(cache_root: PathBuf) -> Self {
        Self {
            cache_root: Some(cache_root),
            ..Default::default()
        }
    }

    /// Set the memory budget in decoded bytes
    pub fn with_memory_budget(mut self, bytes: usize) -> Self {
        self.memory_budget_bytes = bytes;
        self
    }

    /// Set the maximum number of images held in memory
    pub fn with_memory_count_limit(mut self, limit: usize) -> Self {
        self.memory_count_limit = limit;
        self
    }

    /// Set the cache file name prefix
    pub fn with_file_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.file_prefix = prefix.into();
        self
    }

    /// Set how many finished request states are remembered
    pub fn with_state_history(mut self, entries: usize) -> Self {
        self.state_history = entries;
        self
    }

    /// Resolve the directory cache files live in
    ///
    /// Falls back to `<os cache dir>/image-cache` when no root is configured.
    pub fn resolve_cache_root(&self) -> CacheResult<PathBuf> {
        if let Some(root) = &self.cache_root {
            return Ok(root.clone());
        }

        dirs::cache_dir()
            .map(|dir| dir.join(cache::CACHE_DIR_NAME))
            .ok_or_else(|| CacheError::InvalidState {
                reason: "Could not determine OS cache directory".to_string(),
            })
    }
}
