//! Cache file path generation
//!
//! Every key maps to exactly one file directly under the cache root:
//! `{cache_root}/{prefix}{sha1(key)}`. Hashing the key keeps file names
//! filesystem-safe for arbitrary explicit keys (slashes, unicode, very long
//! strings) and makes the layout independent of any runtime state.

use std::path::{Path, PathBuf};

use crate::app::key::{sha1_hex, CacheKey};
use crate::constants::files;

/// Path generation utility for cache files
#[derive(Debug, Clone)]
pub struct PathGenerator {
    root: PathBuf,
    prefix: String,
}

impl PathGenerator {
    /// Create a generator for the given cache root and file prefix
    pub fn new(root: impl Into<PathBuf>, prefix: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            prefix: prefix.into(),
        }
    }

    /// Cache root directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// File name prefix
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// File name (no directory) for a key
    pub fn file_name(&self, key: &CacheKey) -> String {
        format!("{}{}", self.prefix, sha1_hex(key.as_str()))
    }

    /// Full path of the cache file for a key
    pub fn file_path(&self, key: &CacheKey) -> PathBuf {
        self.root.join(self.file_name(key))
    }

    /// Temporary path used while writing a key's file atomically
    pub fn temp_path(&self, key: &CacheKey) -> PathBuf {
        self.root
            .join(format!("{}{}", self.file_name(key), files::TEMP_FILE_SUFFIX))
    }

    /// Check if a path names a finished cache file owned by this generator
    ///
    /// Temp files and foreign files sharing the directory are excluded.
    pub fn is_cache_file(&self, path: &Path) -> bool {
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            return false;
        };

        match name.strip_prefix(self.prefix.as_str()) {
            Some(digest) => digest.len() == 40 && digest.chars().all(|c| c.is_ascii_hexdigit()),
            None => false,
        }
    }

    /// Check if a path names an interrupted atomic write
    pub fn is_temp_file(&self, path: &Path) -> bool {
        path.file_name()
            .and_then(|n| n.to_str())
            .map(|name| name.starts_with(&self.prefix) && name.ends_with(files::TEMP_FILE_SUFFIX))
            .unwrap_or(false)
    }
}
