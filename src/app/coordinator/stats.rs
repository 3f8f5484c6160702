//! Request pipeline counters
//!
//! Counters are updated lock-free from the request path and fetch tasks and
//! read as a [`RequestStats`] snapshot.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Live counters shared by the coordinator and its fetch tasks
#[derive(Debug, Default)]
pub struct RequestCounters {
    requests: AtomicU64,
    memory_hits: AtomicU64,
    disk_hits: AtomicU64,
    disk_misses: AtomicU64,
    corrupt_disk_entries: AtomicU64,
    fetches_started: AtomicU64,
    joined: AtomicU64,
    fetch_successes: AtomicU64,
    fetch_failures: AtomicU64,
    bytes_fetched: AtomicU64,
}

impl RequestCounters {
    pub(crate) fn record_request(&self) {
        self.requests.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_memory_hit(&self) {
        self.memory_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_disk_hit(&self) {
        self.disk_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_disk_miss(&self) {
        self.disk_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_corrupt_disk_entry(&self) {
        self.corrupt_disk_entries.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_fetch_started(&self) {
        self.fetches_started.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_joined(&self) {
        self.joined.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_fetch_success(&self, bytes: usize) {
        self.fetch_successes.fetch_add(1, Ordering::Relaxed);
        self.bytes_fetched.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_fetch_failure(&self) {
        self.fetch_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Take a consistent-enough snapshot for reporting
    pub fn snapshot(&self) -> RequestStats {
        RequestStats {
            requests: self.requests.load(Ordering::Relaxed),
            memory_hits: self.memory_hits.load(Ordering::Relaxed),
            disk_hits: self.disk_hits.load(Ordering::Relaxed),
            disk_misses: self.disk_misses.load(Ordering::Relaxed),
            corrupt_disk_entries: self.corrupt_disk_entries.load(Ordering::Relaxed),
            fetches_started: self.fetches_started.load(Ordering::Relaxed),
            joined: self.joined.load(Ordering::Relaxed),
            fetch_successes: self.fetch_successes.load(Ordering::Relaxed),
            fetch_failures: self.fetch_failures.load(Ordering::Relaxed),
            bytes_fetched: self.bytes_fetched.load(Ordering::Relaxed),
        }
    }
}

/// Aggregated request statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestStats {
    /// Requests made through the coordinator
    pub requests: u64,
    /// Requests answered from memory
    pub memory_hits: u64,
    /// Requests answered from disk
    pub disk_hits: u64,
    /// Requests that found nothing on disk
    pub disk_misses: u64,
    /// Disk payloads that failed to decode
    pub corrupt_disk_entries: u64,
    /// Network fetches issued
    pub fetches_started: u64,
    /// Requests that waited on a fetch already in flight
    pub joined: u64,
    /// Fetches that produced an image
    pub fetch_successes: u64,
    /// Fetches that failed (transport, status or decode)
    pub fetch_failures: u64,
    /// Payload bytes received from the network
    pub bytes_fetched: u64,
}

impl RequestStats {
    /// Fetches that have not finished yet
    pub fn fetches_in_flight(&self) -> u64 {
        self.fetches_started
            .saturating_sub(self.fetch_successes + self.fetch_failures)
    }

    /// Requests served without touching the network
    pub fn served_from_cache(&self) -> u64 {
        self.memory_hits + self.disk_hits
    }
}
