//! Cache statistics and disk usage monitoring
//!
//! This module provides the combined statistics snapshot of both tiers and
//! the request pipeline, plus scanning of the cache directory.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::warn;

use crate::app::cache::disk::DiskStats;
use crate::app::cache::memory::MemoryStats;
use crate::app::cache::path::PathGenerator;
use crate::app::coordinator::RequestStats;

/// Cache statistics
#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    /// When the snapshot was taken
    pub collected_at: DateTime<Utc>,
    /// Cache root directory
    pub cache_root: PathBuf,
    /// Memory tier counters
    pub memory: MemoryStats,
    /// Disk tier counters
    pub disk: DiskStats,
    /// Number of cache files on disk
    pub cached_files_count: usize,
    /// Total size of cache files in bytes
    pub total_cache_size: u64,
    /// Request pipeline counters
    pub requests: RequestStats,
}

impl CacheStats {
    /// Create new cache statistics
    pub fn new(cache_root: PathBuf) -> Self {
        Self {
            collected_at: Utc::now(),
            cache_root,
            memory: MemoryStats::default(),
            disk: DiskStats::default(),
            cached_files_count: 0,
            total_cache_size: 0,
            requests: RequestStats::default(),
        }
    }

    /// Update disk usage statistics
    pub fn set_disk_usage(&mut self, cached_files_count: usize, total_cache_size: u64) {
        self.cached_files_count = cached_files_count;
        self.total_cache_size = total_cache_size;
    }

    /// Fraction of memory lookups that hit, if any lookups happened
    pub fn memory_hit_rate(&self) -> Option<f64> {
        let lookups = self.memory.hits + self.memory.misses;
        if lookups == 0 {
            return None;
        }
        Some(self.memory.hits as f64 / lookups as f64)
    }

    /// Format cache size in human-readable format
    pub fn format_cache_size(&self) -> String {
        format_bytes(self.total_cache_size)
    }

    /// Format memory usage in human-readable format
    pub fn format_memory_size(&self) -> String {
        format_bytes(self.memory.total_cost as u64)
    }
}

/// Directory scanner for cache statistics
pub struct DirectoryScanner;

impl DirectoryScanner {
    /// Count cache files and their total size without blocking the runtime
    pub async fn scan_cache_directory(paths: &PathGenerator) -> (usize, u64) {
        let paths = paths.clone();

        tokio::task::spawn_blocking(move || Self::scan_directory_sync(&paths))
            .await
            .unwrap_or_else(|e| {
                warn!("Failed to scan cache directory: {}", e);
                (0, 0)
            })
    }

    /// Count cache files directly under the root (blocking)
    pub fn scan_directory_sync(paths: &PathGenerator) -> (usize, u64) {
        let mut file_count = 0;
        let mut total_size = 0u64;

        if let Ok(entries) = std::fs::read_dir(paths.root()) {
            for entry in entries.flatten() {
                let path = entry.path();
                if !path.is_file() || !paths.is_cache_file(&path) {
                    continue;
                }

                file_count += 1;
                if let Ok(metadata) = entry.metadata() {
                    total_size += metadata.len();
                }
            }
        }

        (file_count, total_size)
    }
}

/// Format bytes in human-readable format
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    const THRESHOLD: u64 = 1024;

    if bytes == 0 {
        return "0 B".to_string();
    }

    let mut size = bytes as f64;
    let mut unit_index = 0;

    while size >= THRESHOLD as f64 && unit_index < UNITS.len() - 1 {
        size /= THRESHOLD as f64;
        unit_index += 1;
    }

    if unit_index == 0 {
        format!("{} {}", bytes, UNITS[unit_index])
    } else {
        format!("{:.2} {}", size, UNITS[unit_index])
    }
}
