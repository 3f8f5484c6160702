//! Core HTTP operations with optional rate limiting
//!
//! Requests are made once; there is no retry. Non-2xx responses, timeouts and
//! transport failures are all reported as [`FetchError`]s and left to the
//! caller to re-request.

use std::num::NonZeroU32;
use std::time::Duration;

use governor::{clock::DefaultClock, state::InMemoryState, state::NotKeyed, Jitter, Quota};
use reqwest::{Client, StatusCode};
use tracing::debug;
use url::Url;

use crate::constants::limits;
use crate::errors::{FetchError, FetchResult};

type DirectRateLimiter = governor::RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// HTTP operations handler
#[derive(Debug)]
pub struct HttpHandler {
    client: Client,
    rate_limiter: Option<DirectRateLimiter>,
    timeout: Duration,
}

impl HttpHandler {
    /// Creates a new HttpHandler with the given client and rate limit
    ///
    /// # Arguments
    ///
    /// * `client` - The HTTP client to use for requests
    /// * `rate_limit_rps` - Requests per second; 0 disables rate limiting
    /// * `timeout` - Request timeout the client was built with, for error reporting
    pub fn new(client: Client, rate_limit_rps: u32, timeout: Duration) -> Self {
        Self {
            client,
            rate_limiter: Self::build_rate_limiter(rate_limit_rps),
            timeout,
        }
    }

    /// Builds the rate limiter; `None` when the rate is zero
    fn build_rate_limiter(rate_limit_rps: u32) -> Option<DirectRateLimiter> {
        NonZeroU32::new(rate_limit_rps)
            .map(|rps| governor::RateLimiter::direct(Quota::per_second(rps)))
    }

    /// Fetches the full response body of a URL
    ///
    /// # Errors
    ///
    /// Returns `FetchError` for non-HTTP schemes, transport failures,
    /// timeouts and non-success statuses
    pub async fn get_bytes(&self, url: &Url) -> FetchResult<Vec<u8>> {
        match url.scheme() {
            "http" | "https" => {}
            other => {
                return Err(FetchError::UnsupportedScheme {
                    scheme: other.to_string(),
                    url: url.to_string(),
                })
            }
        }

        if let Some(rate_limiter) = &self.rate_limiter {
            // Jitter spreads out bursts of requests released together
            rate_limiter
                .until_ready_with_jitter(Jitter::up_to(Duration::from_millis(
                    limits::RATE_LIMIT_JITTER_MS,
                )))
                .await;
        }

        let response = self
            .client
            .get(url.as_str())
            .send()
            .await
            .map_err(|e| self.map_transport_error(e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Self::map_status(status, url));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| self.map_transport_error(e))?;

        debug!("Fetched {} bytes from {}", bytes.len(), url);
        Ok(bytes.to_vec())
    }

    fn map_transport_error(&self, error: reqwest::Error) -> FetchError {
        if error.is_timeout() {
            FetchError::Timeout {
                seconds: self.timeout.as_secs(),
            }
        } else {
            FetchError::Http(error)
        }
    }

    fn map_status(status: StatusCode, url: &Url) -> FetchError {
        match status {
            StatusCode::NOT_FOUND => FetchError::NotFound {
                url: url.to_string(),
            },
            StatusCode::FORBIDDEN => FetchError::Forbidden {
                url: url.to_string(),
            },
            other => FetchError::ServerError {
                status: other.as_u16(),
                url: url.to_string(),
            },
        }
    }

    /// Get a reference to the underlying HTTP client
    pub fn client(&self) -> &Client {
        &self.client
    }
}
