//! Network transport for image payloads
//!
//! The cache talks to the network only through the [`Fetcher`] trait so that
//! tests and embedders can inject their own transport. [`HttpFetcher`] is the
//! default implementation on top of reqwest.
//!
//! The module is organized into specialized components:
//! - `config`: HTTP client configuration and building
//! - `http`: Core HTTP operations with optional rate limiting

use async_trait::async_trait;
use tracing::info;
use url::Url;

use crate::errors::FetchResult;

// Module declarations
pub mod config;
pub mod http;

pub use config::ClientConfig;

use http::HttpHandler;

/// Retrieves the raw payload behind a URL
#[async_trait]
pub trait Fetcher: Send + Sync + std::fmt::Debug {
    /// Fetch the full body, or fail with the transport error or HTTP status
    async fn fetch(&self, url: &Url) -> FetchResult<Vec<u8>>;
}

/// Default reqwest-backed fetcher
#[derive(Debug)]
pub struct HttpFetcher {
    http_handler: HttpHandler,
}

impl HttpFetcher {
    /// Creates a fetcher with default client settings
    ///
    /// # Errors
    ///
    /// Returns `FetchError` if HTTP client creation fails
    pub fn new() -> FetchResult<Self> {
        Self::with_config(ClientConfig::default())
    }

    /// Creates a fetcher with custom client settings
    ///
    /// # Errors
    ///
    /// Returns `FetchError` if HTTP client creation fails
    pub fn with_config(config: ClientConfig) -> FetchResult<Self> {
        let client = config.build_http_client()?;
        let http_handler = HttpHandler::new(client, config.rate_limit_rps, config.request_timeout);

        info!(
            "Created HTTP fetcher (timeout {:?}, rate limit {} rps)",
            config.request_timeout, config.rate_limit_rps
        );

        Ok(Self { http_handler })
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &Url) -> FetchResult<Vec<u8>> {
        self.http_handler.get_bytes(url).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::FetchError;

    #[tokio::test]
    async fn test_http_fetcher_creation() {
        let fetcher = HttpFetcher::new();
        assert!(fetcher.is_ok());
    }

    #[tokio::test]
    async fn test_fetcher_is_object_safe() {
        let fetcher: Box<dyn Fetcher> = Box::new(HttpFetcher::new().unwrap());
        let url = Url::parse("ftp://example.com/a.png").unwrap();

        let result = fetcher.fetch(&url).await;
        assert!(matches!(result, Err(FetchError::UnsupportedScheme { .. })));
    }
}
