//! Memory tier: bounded map from key to decoded image
//!
//! Entries are kept in least-recently-used order and evicted while the total
//! decoded size exceeds the byte budget or the entry count exceeds the count
//! limit. An insertion never evicts the entry it just inserted, so a lookup
//! right after `set` always returns the image that was set.

use std::num::NonZeroUsize;

use lru::LruCache;
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, trace};

use crate::app::image::Image;
use crate::app::key::CacheKey;

#[derive(Debug)]
struct MemoryEntry {
    image: Image,
    cost: usize,
}

#[derive(Debug)]
struct MemoryState {
    entries: LruCache<CacheKey, MemoryEntry>,
    total_cost: usize,
    hits: u64,
    misses: u64,
    evictions: u64,
}

/// Point-in-time counters of the memory tier
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MemoryStats {
    /// Images currently held
    pub entries: usize,
    /// Decoded bytes currently held
    pub total_cost: usize,
    /// Lookups that found an image
    pub hits: u64,
    /// Lookups that found nothing
    pub misses: u64,
    /// Images dropped to stay within limits
    pub evictions: u64,
}

/// Bounded in-memory image cache with LRU eviction
#[derive(Debug)]
pub struct MemoryCache {
    state: Mutex<MemoryState>,
    budget_bytes: usize,
    count_limit: Option<NonZeroUsize>,
}

impl MemoryCache {
    /// Create a cache bounded by a decoded-byte budget and an entry count
    ///
    /// A `count_limit` of 0 disables the count bound.
    pub fn new(budget_bytes: usize, count_limit: usize) -> Self {
        Self {
            state: Mutex::new(MemoryState {
                entries: LruCache::unbounded(),
                total_cost: 0,
                hits: 0,
                misses: 0,
                evictions: 0,
            }),
            budget_bytes,
            count_limit: NonZeroUsize::new(count_limit),
        }
    }

    /// Look up an image, marking it most recently used
    pub fn get(&self, key: &CacheKey) -> Option<Image> {
        let mut state = self.state.lock();
        let found = state.entries.get(key).map(|entry| entry.image.clone());
        match found {
            Some(image) => {
                state.hits += 1;
                trace!("Memory hit: {}", key);
                Some(image)
            }
            None => {
                state.misses += 1;
                trace!("Memory miss: {}", key);
                None
            }
        }
    }

    /// Look up an image without touching recency or counters
    pub fn probe(&self, key: &CacheKey) -> Option<Image> {
        self.state
            .lock()
            .entries
            .peek(key)
            .map(|entry| entry.image.clone())
    }

    /// Store an image, evicting least recently used entries if over limits
    pub fn set(&self, key: CacheKey, image: Image) {
        let cost = image.byte_cost();
        let mut state = self.state.lock();

        if let Some(previous) = state.entries.put(key, MemoryEntry { image, cost }) {
            state.total_cost -= previous.cost;
        }
        state.total_cost += cost;

        // The newest entry sits at the front, so stopping at one entry keeps it
        while state.entries.len() > 1 && self.over_limits(&state) {
            match state.entries.pop_lru() {
                Some((evicted, entry)) => {
                    state.total_cost -= entry.cost;
                    state.evictions += 1;
                    debug!("Evicted {} ({} bytes) from memory", evicted, entry.cost);
                }
                None => break,
            }
        }
    }

    fn over_limits(&self, state: &MemoryState) -> bool {
        let over_count = self
            .count_limit
            .is_some_and(|limit| state.entries.len() > limit.get());
        over_count || state.total_cost > self.budget_bytes
    }

    /// Remove one entry; returns whether it was present
    pub fn remove(&self, key: &CacheKey) -> bool {
        let mut state = self.state.lock();
        match state.entries.pop(key) {
            Some(entry) => {
                state.total_cost -= entry.cost;
                true
            }
            None => false,
        }
    }

    /// Drop every entry
    pub fn purge(&self) -> usize {
        let mut state = self.state.lock();
        let dropped = state.entries.len();
        state.entries.clear();
        state.total_cost = 0;
        dropped
    }

    /// Check presence without affecting recency
    pub fn contains(&self, key: &CacheKey) -> bool {
        self.state.lock().entries.contains(key)
    }

    /// Number of images held
    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    /// True when no images are held
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Decoded bytes held
    pub fn total_cost(&self) -> usize {
        self.state.lock().total_cost
    }

    /// Snapshot of counters
    pub fn stats(&self) -> MemoryStats {
        let state = self.state.lock();
        MemoryStats {
            entries: state.entries.len(),
            total_cost: state.total_cost,
            hits: state.hits,
            misses: state.misses,
            evictions: state.evictions,
        }
    }
}
