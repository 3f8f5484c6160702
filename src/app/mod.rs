//! Core application logic for the image cache
//!
//! This module contains the cache tiers, the HTTP fetcher, request
//! deduplication and the [`ImageCache`] facade that ties them together.
//!
//! # Examples
//!
//! ```rust,no_run
//! use image_cache::app::{CacheConfig, ClientConfig, ImageCache};
//! use url::Url;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let cache = ImageCache::with_defaults(CacheConfig::default(), ClientConfig::default()).await?;
//!
//! let url = Url::parse("https://example.com/avatar.png")?;
//! let image = cache.image_for_url(&url).await?;
//! println!("{}x{}", image.width(), image.height());
//!
//! // Served from memory from now on
//! assert!(cache.cached_image_for_url(&url).is_some());
//! # Ok(())
//! # }
//! ```

pub mod binding;
pub mod cache;
pub mod client;
pub mod coordinator;
pub mod facade;
pub mod image;
pub mod key;

// Re-export main public API
pub use binding::{SlotBinding, SlotTicket};
pub use cache::{CacheConfig, CacheStats, DiskStats, MemoryStats};
pub use client::{ClientConfig, Fetcher, HttpFetcher};
pub use coordinator::{Callbacks, RequestState, RequestStats};
pub use facade::ImageCache;
pub use image::{Image, ImageCodec, RasterCodec};
pub use key::{derive_key, CacheKey};
