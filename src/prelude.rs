//! Prelude module for the Image Cache Library
//!
//! This module re-exports the most commonly used items from the library,
//! providing a convenient way to import everything needed for typical usage
//! with a single `use image_cache::prelude::*;` statement.
//!
//! # Usage
//!
//! ```rust,no_run
//! use image_cache::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let cache = ImageCache::shared().await?;
//!     let url = url::Url::parse("https://example.com/a.png").map_err(|e| AppError::generic(e.to_string()))?;
//!
//!     cache.image_for_url_then(url, None, Callbacks::new(|image: Image| {
//!         println!("{}x{}", image.width(), image.height());
//!     }));
//!     Ok(())
//! }
//! ```

// Core result types
pub use crate::errors::{AppError, RequestError, Result};

// Essential app components that are used in most integrations
pub use crate::app::{
    // Facade and configuration
    CacheConfig,
    ClientConfig,
    ImageCache,

    // Images and keys
    CacheKey,
    Image,
    ImageCodec,
    RasterCodec,
    derive_key,

    // Fetching
    Fetcher,
    HttpFetcher,

    // Delivery and status types
    CacheStats,
    Callbacks,
    RequestState,
    SlotBinding,
};

pub use crate::config::AppConfig;

// Commonly used constants
pub use crate::constants::{DEFAULT_MEMORY_BUDGET_BYTES, FILE_PREFIX, USER_AGENT};

// Standard library re-exports that are commonly needed
pub use std::path::{Path, PathBuf};
pub use std::sync::Arc;

pub use tokio;
