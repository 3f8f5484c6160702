//! Request orchestration: memory, then disk, then network
//!
//! This module coordinates a request across both cache tiers and the
//! transport. Concurrent requests for the same key share one network fetch,
//! and every one of them receives that fetch's outcome.
//!
//! # Key Features
//!
//! - **Synchronous fast path**: memory hits return without awaiting anything
//! - **Disk fallback**: payloads are read and decoded on a blocking thread; corrupt files fall through to the network
//! - **Request deduplication**: one fetch per key, results fanned out to all waiters
//! - **Detached fetches**: a caller dropping its future cancels nothing for other waiters
//! - **Cache population**: successful fetches fill memory before waiters are notified, then queue a disk write
//!
//! # Architecture
//!
//! - [`pending`] - In-flight registry, request states and completion guard
//! - [`callbacks`] - Callback form of a request
//! - [`stats`] - Request pipeline counters
//!
//! # Examples
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use image_cache::app::cache::{DiskStore, MemoryCache};
//! use image_cache::app::client::HttpFetcher;
//! use image_cache::app::coordinator::FetchCoordinator;
//! use image_cache::app::image::RasterCodec;
//! use url::Url;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let coordinator = FetchCoordinator::new(
//!     Arc::new(MemoryCache::new(64 * 1024 * 1024, 100)),
//!     Arc::new(DiskStore::open("/tmp/image-cache", "img-").await?),
//!     Arc::new(HttpFetcher::new()?),
//!     Arc::new(RasterCodec::new()),
//!     256,
//!     tokio::runtime::Handle::current(),
//! );
//!
//! let url = Url::parse("https://example.com/a.png")?;
//! let image = coordinator.request(&url, None).await?;
//! println!("{}x{}", image.width(), image.height());
//! # Ok(())
//! # }
//! ```

pub mod callbacks;
pub mod pending;
pub mod stats;

#[cfg(test)]
mod tests;

use std::sync::Arc;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use url::Url;

use crate::app::cache::{DiskStore, MemoryCache};
use crate::app::client::Fetcher;
use crate::app::image::{Image, ImageCodec};
use crate::app::key::{derive_key_for_url, CacheKey};
use crate::errors::RequestError;

pub use callbacks::Callbacks;
pub use pending::{CompletionGuard, Outcome, PendingRequests, Registration, RequestState};
pub use stats::{RequestCounters, RequestStats};

/// Coordinates lookups across memory, disk and network
#[derive(Debug)]
pub struct FetchCoordinator {
    memory: Arc<MemoryCache>,
    disk: Arc<DiskStore>,
    fetcher: Arc<dyn Fetcher>,
    codec: Arc<dyn ImageCodec>,
    pending: Arc<PendingRequests>,
    counters: Arc<RequestCounters>,
    runtime: Handle,
}

impl FetchCoordinator {
    /// Create a coordinator over the given tiers and collaborators
    ///
    /// Fetch tasks and callbacks are spawned on `runtime`.
    pub fn new(
        memory: Arc<MemoryCache>,
        disk: Arc<DiskStore>,
        fetcher: Arc<dyn Fetcher>,
        codec: Arc<dyn ImageCodec>,
        state_history: usize,
        runtime: Handle,
    ) -> Self {
        Self {
            memory,
            disk,
            fetcher,
            codec,
            pending: Arc::new(PendingRequests::new(state_history)),
            counters: Arc::new(RequestCounters::default()),
            runtime,
        }
    }

    /// Get an image for a URL, fetching it if neither tier has it
    ///
    /// A non-empty `key` replaces the URL-derived cache key.
    pub async fn request(&self, url: &Url, key: Option<&str>) -> Outcome {
        let key = derive_key_for_url(url, key);
        self.request_keyed(url, key).await
    }

    /// Get an image under an already derived key
    pub async fn request_keyed(&self, url: &Url, key: CacheKey) -> Outcome {
        self.counters.record_request();

        if let Some(image) = self.memory.get(&key) {
            self.counters.record_memory_hit();
            debug!("Memory hit for {}", key);
            return Ok(image);
        }

        if let Some(image) = self.load_from_disk(&key).await {
            self.memory.set(key.clone(), image.clone());
            return Ok(image);
        }

        let receiver = match self.pending.register(&key, || self.memory.probe(&key)) {
            Registration::Ready(image) => {
                debug!("Memory filled for {} while checking disk", key);
                return Ok(image);
            }
            Registration::Joined(receiver) => {
                self.counters.record_joined();
                debug!("Joining in-flight fetch for {}", key);
                receiver
            }
            Registration::Leader(receiver) => {
                self.counters.record_fetch_started();
                self.spawn_fetch(url.clone(), key.clone());
                receiver
            }
        };

        receiver
            .await
            .unwrap_or(Err(RequestError::Abandoned { key }))
    }

    /// Callback form of [`FetchCoordinator::request`]
    ///
    /// The callbacks run on a task of the coordinator's runtime.
    pub fn request_with(
        self: &Arc<Self>,
        url: Url,
        key: Option<String>,
        callbacks: Callbacks,
    ) -> JoinHandle<()> {
        let coordinator = Arc::clone(self);
        self.runtime.spawn(async move {
            let outcome = coordinator.request(&url, key.as_deref()).await;
            callbacks.deliver(outcome);
        })
    }

    /// Read and decode a key's disk payload off the async threads
    async fn load_from_disk(&self, key: &CacheKey) -> Option<Image> {
        let disk = self.disk.clone();
        let codec = self.codec.clone();
        let counters = self.counters.clone();
        let key = key.clone();

        tokio::task::spawn_blocking(move || read_and_decode(&disk, codec.as_ref(), &counters, &key))
            .await
            .unwrap_or_else(|e| {
                warn!("Disk lookup task failed: {}", e);
                None
            })
    }

    /// Synchronous disk read and decode; populates nothing
    pub fn decode_from_disk(&self, key: &CacheKey) -> Option<Image> {
        read_and_decode(&self.disk, self.codec.as_ref(), &self.counters, key)
    }

    fn spawn_fetch(&self, url: Url, key: CacheKey) {
        let task = FetchTask {
            guard: CompletionGuard::new(self.pending.clone(), key.clone()),
            url,
            key,
            fetcher: self.fetcher.clone(),
            codec: self.codec.clone(),
            memory: self.memory.clone(),
            disk: self.disk.clone(),
            counters: self.counters.clone(),
        };
        self.runtime.spawn(task.run());
    }

    /// Current state of requests for a key
    pub fn state(&self, key: &CacheKey) -> RequestState {
        self.pending.state(key)
    }

    /// Number of keys with a fetch in flight
    pub fn in_flight(&self) -> usize {
        self.pending.in_flight()
    }

    /// Counter snapshot
    pub fn stats(&self) -> RequestStats {
        self.counters.snapshot()
    }

    /// Runtime fetch tasks and callbacks are spawned on
    pub fn runtime(&self) -> &Handle {
        &self.runtime
    }
}

fn read_and_decode(
    disk: &DiskStore,
    codec: &dyn ImageCodec,
    counters: &RequestCounters,
    key: &CacheKey,
) -> Option<Image> {
    let Some(bytes) = disk.read(key) else {
        counters.record_disk_miss();
        return None;
    };

    match codec.decode(&bytes) {
        Ok(image) => {
            counters.record_disk_hit();
            debug!("Disk hit for {}", key);
            Some(image)
        }
        Err(e) => {
            // Treated as a miss; the next successful fetch overwrites it
            counters.record_corrupt_disk_entry();
            debug!("Ignoring undecodable disk entry for {}: {}", key, e);
            None
        }
    }
}

/// One network fetch and the fan-out of its outcome
struct FetchTask {
    guard: CompletionGuard,
    url: Url,
    key: CacheKey,
    fetcher: Arc<dyn Fetcher>,
    codec: Arc<dyn ImageCodec>,
    memory: Arc<MemoryCache>,
    disk: Arc<DiskStore>,
    counters: Arc<RequestCounters>,
}

impl FetchTask {
    async fn run(self) {
        let outcome = match self.fetch_and_decode().await {
            Ok((image, bytes)) => {
                self.counters.record_fetch_success(bytes.len());
                // Memory first so a request arriving after completion hits it
                self.memory.set(self.key.clone(), image.clone());
                self.disk.write(self.key.clone(), bytes);
                Ok(image)
            }
            Err(error) => {
                self.counters.record_fetch_failure();
                warn!("Request for {} failed: {}", self.url, error);
                Err(error)
            }
        };

        let delivered = self.guard.complete(outcome);
        debug!("Delivered outcome for {} to {} waiters", self.key, delivered);
    }

    async fn fetch_and_decode(&self) -> Result<(Image, Vec<u8>), RequestError> {
        debug!("Fetching {} for {}", self.url, self.key);

        let bytes = self
            .fetcher
            .fetch(&self.url)
            .await
            .map_err(|source| RequestError::Fetch {
                url: self.url.to_string(),
                key: self.key.clone(),
                source: Arc::new(source),
            })?;

        let codec = self.codec.clone();
        let (decoded, bytes) = tokio::task::spawn_blocking(move || {
            let decoded = codec.decode(&bytes);
            (decoded, bytes)
        })
        .await
        .map_err(|e| {
            warn!("Decode task failed: {}", e);
            RequestError::Abandoned {
                key: self.key.clone(),
            }
        })?;

        let image = decoded.map_err(|source| RequestError::Decode {
            url: self.url.to_string(),
            key: self.key.clone(),
            source: Arc::new(source),
        })?;

        Ok((image, bytes))
    }
}
