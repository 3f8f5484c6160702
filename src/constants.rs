//! Application constants for the image cache
//!
//! This module centralizes all constants used throughout the crate,
//! organized by functional domain for maintainability and clarity.

use std::time::Duration;

/// HTTP client configuration constants
pub mod http {
    use super::Duration;

    /// Default user agent for all HTTP requests
    pub const USER_AGENT: &str = concat!("image-cache/", env!("CARGO_PKG_VERSION"));

    /// Default HTTP request timeout
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

    /// Connection establishment timeout
    pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

    /// Connection pool idle timeout
    pub const POOL_IDLE_TIMEOUT: Duration = Duration::from_secs(90);

    /// Maximum idle connections per host in pool
    pub const POOL_MAX_PER_HOST: usize = 16;

    /// Maximum number of redirects to follow
    pub const MAX_REDIRECTS: usize = 10;
}

/// Rate limiting configuration
pub mod limits {
    /// Default rate limit for image requests (requests per second, 0 = unlimited)
    pub const DEFAULT_RATE_LIMIT_RPS: u32 = 0;

    /// Upper bound of the jitter applied when waiting on the rate limiter (milliseconds)
    pub const RATE_LIMIT_JITTER_MS: u64 = 50;
}

/// Memory and disk tier defaults
pub mod cache {
    /// Directory name used under the OS cache directory
    pub const CACHE_DIR_NAME: &str = "image-cache";

    /// Prefix of every cache file written to disk
    pub const FILE_PREFIX: &str = "img-";

    /// Decoded-byte budget of the memory tier (64 MiB)
    pub const DEFAULT_MEMORY_BUDGET_BYTES: usize = 64 * 1024 * 1024;

    /// Maximum number of decoded images held in memory
    pub const DEFAULT_MEMORY_COUNT_LIMIT: usize = 100;

    /// Number of terminal request states remembered for inspection
    pub const REQUEST_STATE_HISTORY: usize = 256;
}

/// File operation constants
pub mod files {
    /// Temporary file suffix for atomic operations
    pub const TEMP_FILE_SUFFIX: &str = ".tmp";
}

/// Configuration file locations
pub mod config {
    /// Directory name under the user config directory
    pub const CONFIG_DIR_NAME: &str = "image-cache";

    /// Configuration file name
    pub const CONFIG_FILE_NAME: &str = "config.toml";

    /// Project-local configuration file name
    pub const LOCAL_CONFIG_FILE_NAME: &str = "image-cache.toml";
}

/// Logging constants
pub mod logging {
    /// Default log level
    pub const DEFAULT_LOG_LEVEL: &str = "warn";
}

// Re-export commonly used constants for convenience
pub use cache::{DEFAULT_MEMORY_BUDGET_BYTES, DEFAULT_MEMORY_COUNT_LIMIT, FILE_PREFIX};
pub use files::TEMP_FILE_SUFFIX;
pub use http::USER_AGENT;
pub use limits::DEFAULT_RATE_LIMIT_RPS;
