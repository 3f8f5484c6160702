//! Cache key derivation
//!
//! A cache key is either a caller-supplied string or the lowercase SHA-1 hex
//! digest of the request URL. The same URL (or the same explicit key) always
//! yields the same key, across calls and across process restarts.

use std::fmt;

use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};
use url::Url;

use crate::errors::RequestError;

/// Opaque identifier for one cached image
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CacheKey(String);

impl CacheKey {
    /// Use a caller-supplied key verbatim
    pub fn explicit(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Derive the key for a URL (SHA-1 of its string form)
    pub fn from_url(url: &Url) -> Self {
        Self(sha1_hex(url.as_str()))
    }

    /// Get the key as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consume the key and return the inner string
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<&str> for CacheKey {
    fn from(key: &str) -> Self {
        Self::explicit(key)
    }
}

/// Lowercase hex SHA-1 digest of a string (40 characters)
pub fn sha1_hex(input: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(input.as_bytes());
    hex::encode(hasher.finalize())
}

/// Derive the cache key for a request
///
/// A non-empty `explicit` key always wins. Otherwise the key is the SHA-1 of
/// `url`. Both being empty is a usage error.
pub fn derive_key(url: &str, explicit: Option<&str>) -> Result<CacheKey, RequestError> {
    match explicit {
        Some(key) if !key.is_empty() => Ok(CacheKey::explicit(key)),
        _ if !url.is_empty() => Ok(CacheKey(sha1_hex(url))),
        _ => Err(RequestError::EmptyRequest),
    }
}

/// Derive the cache key for an already parsed URL
pub fn derive_key_for_url(url: &Url, explicit: Option<&str>) -> CacheKey {
    match explicit {
        Some(key) if !key.is_empty() => CacheKey::explicit(key),
        _ => CacheKey::from_url(url),
    }
}
