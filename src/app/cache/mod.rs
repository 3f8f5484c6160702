//! Memory and disk tiers of the image cache
//!
//! # Key Features
//!
//! - **Bounded memory tier**: LRU eviction under a decoded-byte budget and an entry count
//! - **Ordered disk tier**: one background worker applies every write, removal and clear in order
//! - **Atomic operations**: Ensures file integrity with temp-file + rename pattern
//! - **Flat layout**: One file per key, named from the SHA-1 of the key
//! - **OS-specific cache directories**: Uses standard system cache locations
//!
//! # Module Organization
//!
//! - [`config`] - Configuration types and defaults
//! - [`memory`] - Bounded in-memory image map
//! - [`disk`] - Persistent payload store and its worker
//! - [`path`] - File path generation
//! - [`stats`] - Cache statistics and disk usage monitoring
//!
//! # Examples
//!
//! ```rust,no_run
//! use image_cache::app::cache::{DiskStore, MemoryCache};
//! use image_cache::app::key::CacheKey;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let disk = DiskStore::open("/tmp/image-cache", "img-").await?;
//! let key = CacheKey::explicit("avatar-42");
//!
//! disk.write(key.clone(), vec![0x89, b'P', b'N', b'G']);
//! disk.flush().await?;
//! assert!(disk.read(&key).is_some());
//!
//! let memory = MemoryCache::new(64 * 1024 * 1024, 100);
//! assert!(memory.get(&key).is_none());
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod disk;
pub mod memory;
pub mod path;
pub mod stats;


// Re-export main public API
pub use config::CacheConfig;
pub use disk::{DiskStats, DiskStore};
pub use memory::{MemoryCache, MemoryStats};
pub use path::PathGenerator;
pub use stats::{format_bytes, CacheStats};
