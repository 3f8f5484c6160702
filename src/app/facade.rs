//! Public entry point of the image cache
//!
//! [`ImageCache`] ties the memory tier, the disk tier and the request
//! coordinator together. It is an ordinary owned value: build one with
//! [`ImageCache::new`] or [`ImageCache::with_defaults`] and share it behind
//! an `Arc`. [`ImageCache::shared`] additionally offers one lazily built
//! process-wide instance.
//!
//! # Examples
//!
//! ```rust,no_run
//! use image_cache::app::{CacheConfig, ClientConfig, ImageCache};
//! use url::Url;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let cache = ImageCache::with_defaults(CacheConfig::default(), ClientConfig::default()).await?;
//! let url = Url::parse("https://example.com/a.png")?;
//!
//! // Fetches once, then served from memory
//! let image = cache.image_for_url(&url).await?;
//! assert!(cache.cached_image_for_url(&url).is_some());
//! println!("{}x{}", image.width(), image.height());
//! # Ok(())
//! # }
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::runtime::Handle;
use tokio::sync::OnceCell;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use url::Url;

use crate::app::cache::{CacheConfig, CacheStats, DiskStore, MemoryCache};
use crate::app::client::{ClientConfig, Fetcher, HttpFetcher};
use crate::app::coordinator::{Callbacks, FetchCoordinator, RequestState};
use crate::app::image::{Image, ImageCodec, RasterCodec};
use crate::app::key::{derive_key_for_url, CacheKey};
use crate::config::AppConfig;
use crate::errors::{AppError, RequestError, Result};

static SHARED: OnceCell<Arc<ImageCache>> = OnceCell::const_new();

/// Two-tier image cache with deduplicated network fetches
#[derive(Debug)]
pub struct ImageCache {
    config: CacheConfig,
    memory: Arc<MemoryCache>,
    disk: Arc<DiskStore>,
    codec: Arc<dyn ImageCodec>,
    coordinator: Arc<FetchCoordinator>,
}

impl ImageCache {
    /// Build a cache with the given transport and codec
    ///
    /// Must be called from within a tokio runtime; fetches and callbacks run
    /// on that runtime.
    ///
    /// # Errors
    ///
    /// Returns an error if the cache directory cannot be resolved or created
    pub async fn new(
        config: CacheConfig,
        fetcher: Arc<dyn Fetcher>,
        codec: Arc<dyn ImageCodec>,
    ) -> Result<Self> {
        let root = config.resolve_cache_root()?;
        let disk = Arc::new(DiskStore::open(root, config.file_prefix.clone()).await?);
        let memory = Arc::new(MemoryCache::new(
            config.memory_budget_bytes,
            config.memory_count_limit,
        ));

        let coordinator = Arc::new(FetchCoordinator::new(
            memory.clone(),
            disk.clone(),
            fetcher,
            codec.clone(),
            config.state_history,
            Handle::current(),
        ));

        info!(
            "Image cache ready at {} (memory budget {} bytes, {} entries)",
            disk.root().display(),
            config.memory_budget_bytes,
            config.memory_count_limit
        );

        Ok(Self {
            config,
            memory,
            disk,
            codec,
            coordinator,
        })
    }

    /// Build a cache with the default HTTP transport and raster codec
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client or the cache directory cannot be set up
    pub async fn with_defaults(config: CacheConfig, client: ClientConfig) -> Result<Self> {
        let fetcher = Arc::new(HttpFetcher::with_config(client)?);
        Self::new(config, fetcher, Arc::new(RasterCodec::new())).await
    }

    /// Process-wide instance, built on first use from the standard config
    ///
    /// # Errors
    ///
    /// Returns the construction error; a later call retries construction
    pub async fn shared() -> Result<Arc<ImageCache>> {
        SHARED
            .get_or_try_init(|| async {
                let app_config = AppConfig::load(None).await?;
                let (cache_config, client_config) = app_config.to_runtime_config();
                let cache = Self::with_defaults(cache_config, client_config).await?;
                Ok::<_, AppError>(Arc::new(cache))
            })
            .await
            .cloned()
    }

    /// Key used for a URL, honoring an explicit key when given
    pub fn key_for(&self, url: &Url, key: Option<&str>) -> CacheKey {
        derive_key_for_url(url, key)
    }

    // Lookups

    /// Memory-only lookup; never touches disk or network
    pub fn cached_image(&self, key: &str) -> Option<Image> {
        self.memory.get(&CacheKey::explicit(key))
    }

    /// Memory-only lookup by URL
    pub fn cached_image_for_url(&self, url: &Url) -> Option<Image> {
        self.memory.get(&CacheKey::from_url(url))
    }

    /// Synchronous disk read and decode, without populating memory
    ///
    /// Blocks on file I/O; call from a blocking context when on a runtime.
    pub fn image_from_disk(&self, key: &str) -> Option<Image> {
        self.coordinator.decode_from_disk(&CacheKey::explicit(key))
    }

    /// Disk read and decode that also populates memory on a hit
    pub async fn load_from_disk(&self, key: &str) -> Option<Image> {
        let key = CacheKey::explicit(key);
        if let Some(image) = self.memory.get(&key) {
            return Some(image);
        }

        let coordinator = self.coordinator.clone();
        let lookup = key.clone();
        let image = tokio::task::spawn_blocking(move || coordinator.decode_from_disk(&lookup))
            .await
            .unwrap_or_else(|e| {
                warn!("Disk lookup task failed: {}", e);
                None
            })?;

        self.memory.set(key, image.clone());
        Some(image)
    }

    // Mutations

    /// Store an image in memory and queue it for disk
    ///
    /// Encoding happens on the disk worker. If it fails the image stays
    /// memory-only and the failure is logged.
    pub fn set_image(&self, image: Image, key: &str) {
        self.store(image, CacheKey::explicit(key));
    }

    /// Store an image under the key derived from a URL
    pub fn set_image_for_url(&self, image: Image, url: &Url) {
        self.store(image, CacheKey::from_url(url));
    }

    fn store(&self, image: Image, key: CacheKey) {
        self.memory.set(key.clone(), image.clone());
        self.disk.write_image(key, image, self.codec.clone());
    }

    /// Remove an image from memory and queue its disk deletion
    pub fn remove_image(&self, key: &str) {
        self.evict(CacheKey::explicit(key));
    }

    /// Remove the image stored under the key derived from a URL
    pub fn remove_image_for_url(&self, url: &Url) {
        self.evict(CacheKey::from_url(url));
    }

    fn evict(&self, key: CacheKey) {
        self.memory.remove(&key);
        debug!("Removing {}", key);
        self.disk.remove(key);
    }

    // Fetching

    /// Get the image for a URL from memory, disk or network
    ///
    /// # Errors
    ///
    /// Returns `RequestError` when the fetch or the decode of its payload fails
    pub async fn image_for_url(&self, url: &Url) -> std::result::Result<Image, RequestError> {
        self.coordinator.request(url, None).await
    }

    /// Like [`ImageCache::image_for_url`], caching under `key` instead of the URL hash
    ///
    /// # Errors
    ///
    /// Returns `RequestError` when the fetch or the decode of its payload fails
    pub async fn image_for_url_with_key(
        &self,
        url: &Url,
        key: &str,
    ) -> std::result::Result<Image, RequestError> {
        self.coordinator.request(url, Some(key)).await
    }

    /// Callback form; the callbacks run on the cache's runtime
    pub fn image_for_url_then(
        &self,
        url: Url,
        key: Option<&str>,
        callbacks: Callbacks,
    ) -> JoinHandle<()> {
        self.coordinator.request_with(url, key.map(str::to_string), callbacks)
    }

    // Maintenance

    /// Drop every image from memory and queue removal of every disk file
    pub fn clear(&self) {
        let dropped = self.memory.purge();
        self.disk.clear();
        info!("Cleared cache ({} images dropped from memory)", dropped);
    }

    /// Drop every image from memory; disk is untouched
    pub fn purge_memory(&self) -> usize {
        let dropped = self.memory.purge();
        debug!("Purged {} images from memory", dropped);
        dropped
    }

    /// Wait until every queued disk operation has been applied
    ///
    /// # Errors
    ///
    /// Returns an error if the disk worker has stopped
    pub async fn flush(&self) -> Result<()> {
        self.disk.flush().await?;
        Ok(())
    }

    /// Snapshot of counters and disk usage
    pub async fn stats(&self) -> CacheStats {
        let mut stats = CacheStats::new(self.disk.root().to_path_buf());
        let (files, bytes) = self.disk.scan().await;
        stats.set_disk_usage(files, bytes);
        stats.memory = self.memory.stats();
        stats.disk = self.disk.stats();
        stats.requests = self.coordinator.stats();
        stats
    }

    /// Request state for a key
    pub fn request_state(&self, key: &str) -> RequestState {
        self.coordinator.state(&CacheKey::explicit(key))
    }

    /// Request state for a URL
    pub fn request_state_for_url(&self, url: &Url) -> RequestState {
        self.coordinator.state(&CacheKey::from_url(url))
    }

    /// Cache directory
    pub fn cache_root(&self) -> &Path {
        self.disk.root()
    }

    /// File that holds (or would hold) a key's payload
    pub fn disk_path(&self, key: &CacheKey) -> PathBuf {
        self.disk.path_for(key)
    }

    /// True when a disk file exists for the key
    pub fn is_on_disk(&self, key: &CacheKey) -> bool {
        self.disk.contains(key)
    }

    /// Configuration the cache was built with
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Runtime the cache spawns its tasks on
    pub fn runtime(&self) -> &Handle {
        self.coordinator.runtime()
    }
}
