//! Error types for the image cache
//!
//! Errors are split by concern. Only network-path failures ever reach a
//! request's caller (as [`RequestError`]); disk persistence failures are
//! logged and absorbed, and cache misses are plain `None` values.

use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;

use crate::app::key::CacheKey;

/// Network transport errors reported by a fetcher
#[derive(Error, Debug)]
pub enum FetchError {
    /// HTTP request error
    #[error("HTTP request failed")]
    Http(#[from] reqwest::Error),

    /// Invalid URL provided
    #[error("Invalid URL: {url} - {error}")]
    InvalidUrl { url: String, error: String },

    /// URL scheme the transport cannot serve
    #[error("Unsupported URL scheme '{scheme}' in {url}")]
    UnsupportedScheme { scheme: String, url: String },

    /// Server answered 404
    #[error("Image not found: {url}")]
    NotFound { url: String },

    /// Server answered 403
    #[error("Access forbidden: {url}")]
    Forbidden { url: String },

    /// Server returned another non-success status
    #[error("Server error: HTTP {status} for {url}")]
    ServerError { status: u16, url: String },

    /// Request timed out
    #[error("Request timed out after {seconds} seconds")]
    Timeout { seconds: u64 },

    /// Generic error for other transports
    #[error("{0}")]
    Other(String),
}

impl FetchError {
    /// HTTP status of the response, when one was received
    pub fn status(&self) -> Option<u16> {
        match self {
            FetchError::NotFound { .. } => Some(404),
            FetchError::Forbidden { .. } => Some(403),
            FetchError::ServerError { status, .. } => Some(*status),
            FetchError::Http(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

/// Image decode/encode errors
#[derive(Error, Debug)]
pub enum DecodeError {
    /// Payload was empty
    #[error("Image payload is empty")]
    Empty,

    /// Codec rejected the payload
    #[error("Image decoding failed")]
    Image(#[from] image::ImageError),

    /// Image could not be encoded for persistence
    #[error("Image encoding failed: {reason}")]
    Encode { reason: String },
}

/// Disk tier errors
#[derive(Error, Debug)]
pub enum CacheError {
    /// Cache directory not found or inaccessible
    #[error("Cache directory not accessible: {path}")]
    DirectoryNotAccessible { path: PathBuf },

    /// I/O failure on a cache file
    #[error("Cache {operation} failed for {path}")]
    Io {
        operation: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The ordered disk worker is no longer running
    #[error("Disk worker stopped; operation could not be queued")]
    WorkerStopped,

    /// Invalid cache state
    #[error("Invalid cache state: {reason}")]
    InvalidState { reason: String },
}

/// Failure delivered to every caller waiting on one image request
///
/// Cloneable so a single fetch outcome can be fanned out to all waiters.
#[derive(Error, Debug, Clone)]
pub enum RequestError {
    /// Neither a URL nor an explicit key was supplied
    #[error("Cannot request an image without a URL or key")]
    EmptyRequest,

    /// The transport failed
    #[error("Fetching {url} failed")]
    Fetch {
        url: String,
        key: CacheKey,
        #[source]
        source: Arc<FetchError>,
    },

    /// The transport succeeded but the payload is not an image
    #[error("Payload from {url} is not a decodable image")]
    Decode {
        url: String,
        key: CacheKey,
        #[source]
        source: Arc<DecodeError>,
    },

    /// The fetch task ended without producing an outcome
    #[error("Fetch for key {key} ended without a result")]
    Abandoned { key: CacheKey },
}

impl RequestError {
    /// HTTP status of the failed response, when one was received
    pub fn status(&self) -> Option<u16> {
        match self {
            RequestError::Fetch { source, .. } => source.status(),
            _ => None,
        }
    }

    /// Cache key of the failed request
    pub fn key(&self) -> Option<&CacheKey> {
        match self {
            RequestError::Fetch { key, .. }
            | RequestError::Decode { key, .. }
            | RequestError::Abandoned { key } => Some(key),
            RequestError::EmptyRequest => None,
        }
    }

    /// URL of the failed request
    pub fn url(&self) -> Option<&str> {
        match self {
            RequestError::Fetch { url, .. } | RequestError::Decode { url, .. } => Some(url),
            _ => None,
        }
    }
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    NotFound { path: PathBuf },

    /// Invalid configuration format
    #[error("Invalid configuration format")]
    InvalidFormat(#[from] toml::de::Error),

    /// Configuration could not be serialized
    #[error("Configuration serialization failed")]
    Serialize(#[from] toml::ser::Error),

    /// Invalid configuration value
    #[error("Invalid configuration value for {field}: {value}. {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    /// User config directory cannot be determined
    #[error("Could not determine user config directory")]
    NoConfigDirectory,

    /// I/O error reading or writing configuration
    #[error("Configuration I/O error for {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Top-level application error that can represent any error type
#[derive(Error, Debug)]
pub enum AppError {
    /// Transport error
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// Decode error
    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// Cache error
    #[error(transparent)]
    Cache(#[from] CacheError),

    /// Image request error
    #[error(transparent)]
    Request(#[from] RequestError),

    /// Configuration error
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Generic I/O error
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Generic application error with context
    #[error("Application error: {message}")]
    Generic { message: String },
}

impl AppError {
    /// Create a generic application error with a message
    pub fn generic(message: impl Into<String>) -> Self {
        Self::Generic {
            message: message.into(),
        }
    }

    /// Check if the error is transient and a re-request may succeed
    pub fn is_recoverable(&self) -> bool {
        match self {
            AppError::Fetch(FetchError::Timeout { .. })
            | AppError::Fetch(FetchError::Http(_))
            | AppError::Request(RequestError::Abandoned { .. }) => true,

            AppError::Fetch(FetchError::ServerError { status, .. }) => *status >= 500,

            AppError::Request(RequestError::Fetch { source, .. }) => match source.as_ref() {
                FetchError::Timeout { .. } | FetchError::Http(_) => true,
                FetchError::ServerError { status, .. } => *status >= 500,
                _ => false,
            },

            _ => false,
        }
    }

    /// Get error category for logging
    pub fn category(&self) -> &'static str {
        match self {
            AppError::Fetch(_) => "fetch",
            AppError::Decode(_) => "decode",
            AppError::Cache(_) => "cache",
            AppError::Request(_) => "request",
            AppError::Config(_) => "config",
            AppError::Io(_) => "io",
            AppError::Generic { .. } => "generic",
        }
    }
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, AppError>;

/// Fetch result type alias
pub type FetchResult<T> = std::result::Result<T, FetchError>;

/// Decode result type alias
pub type DecodeResult<T> = std::result::Result<T, DecodeError>;

/// Cache result type alias
pub type CacheResult<T> = std::result::Result<T, CacheError>;

/// Config result type alias
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;
