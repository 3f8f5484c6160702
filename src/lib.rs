//! Image Cache Library
//!
//! A two-tier cache for remotely fetched images. Decoded images live in a
//! bounded in-memory LRU, encoded bytes persist on disk, and concurrent
//! requests for the same image share a single download.

pub mod app;
pub mod cli;
pub mod config;
pub mod constants;
pub mod errors;
pub mod prelude;

// Re-export commonly used types for convenience
pub use errors::{AppError, Result};

#[cfg(test)]
mod tests {
    use super::*;
    use constants::*;

    #[test]
    fn test_constants_accessible() {
        assert_eq!(FILE_PREFIX, "img-");
        assert_eq!(DEFAULT_RATE_LIMIT_RPS, 0);
        assert!(USER_AGENT.starts_with("image-cache/"));
    }

    #[test]
    fn test_error_types() {
        let cache_error = errors::CacheError::WorkerStopped;
        let app_error = AppError::Cache(cache_error);

        assert_eq!(app_error.category(), "cache");
    }
}
