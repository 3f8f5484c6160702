//! Configuration management for the image cache
//!
//! This module provides TOML configuration with multi-location lookup,
//! explicit initialization of a commented default file, and zero-config
//! defaults for every setting.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::app::cache::CacheConfig;
use crate::app::client::ClientConfig;
use crate::constants::{cache, config as config_paths, http, limits, logging};
use crate::errors::{ConfigError, ConfigResult};

/// Unified application configuration for TOML serialization
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// Memory and disk tier settings
    pub cache: CacheConfigToml,
    /// HTTP client settings
    pub client: ClientConfigToml,
    /// Logging configuration
    pub logging: LoggingConfig,
}

/// TOML-friendly cache configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfigToml {
    /// Cache directory path
    pub cache_root: Option<PathBuf>,
    /// Decoded-byte budget of the memory tier
    pub memory_budget_bytes: usize,
    /// Maximum images held in memory (0 = unlimited)
    pub memory_count_limit: usize,
    /// Prefix of cache file names
    pub file_prefix: String,
    /// Finished request states remembered for inspection
    pub state_history: usize,
}

impl Default for CacheConfigToml {
    fn default() -> Self {
        Self {
            cache_root: None,
            memory_budget_bytes: cache::DEFAULT_MEMORY_BUDGET_BYTES,
            memory_count_limit: cache::DEFAULT_MEMORY_COUNT_LIMIT,
            file_prefix: cache::FILE_PREFIX.to_string(),
            state_history: cache::REQUEST_STATE_HISTORY,
        }
    }
}

/// TOML-friendly client configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfigToml {
    /// TCP keep-alive timeout in seconds (None = disabled)
    pub tcp_keepalive_secs: Option<u64>,
    /// TCP nodelay setting
    pub tcp_nodelay: bool,
    /// Connection pool idle timeout in seconds (None = no timeout)
    pub pool_idle_timeout_secs: Option<u64>,
    /// Maximum idle connections per host
    pub pool_max_per_host: usize,
    /// Request timeout in seconds
    pub request_timeout_secs: u64,
    /// Connect timeout in seconds
    pub connect_timeout_secs: u64,
    /// Rate limit (requests per second, 0 = unlimited)
    pub rate_limit_rps: u32,
    /// Maximum redirects followed per request
    pub max_redirects: usize,
    /// User agent header (None = built-in default)
    pub user_agent: Option<String>,
}

impl Default for ClientConfigToml {
    fn default() -> Self {
        Self {
            tcp_keepalive_secs: Some(30),
            tcp_nodelay: true,
            pool_idle_timeout_secs: Some(http::POOL_IDLE_TIMEOUT.as_secs()),
            pool_max_per_host: http::POOL_MAX_PER_HOST,
            request_timeout_secs: http::DEFAULT_TIMEOUT.as_secs(),
            connect_timeout_secs: http::CONNECT_TIMEOUT.as_secs(),
            rate_limit_rps: limits::DEFAULT_RATE_LIMIT_RPS,
            max_redirects: http::MAX_REDIRECTS,
            user_agent: None,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default log level when no verbosity flag or RUST_LOG is given
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: logging::DEFAULT_LOG_LEVEL.to_string(),
        }
    }
}

impl AppConfig {
    /// Convert TOML-friendly configuration to runtime configuration
    pub fn to_runtime_config(&self) -> (CacheConfig, ClientConfig) {
        (
            self.cache.to_runtime_config(),
            self.client.to_runtime_config(),
        )
    }

    /// Load configuration with precedence:
    /// 1. Explicit config file (must exist)
    /// 2. First config file found in the standard locations
    /// 3. Default values
    pub async fn load(config_file_override: Option<PathBuf>) -> ConfigResult<Self> {
        let config_path = match config_file_override {
            Some(path) => {
                if !path.exists() {
                    return Err(ConfigError::NotFound { path });
                }
                Some(path)
            }
            None => Self::find_config_file(),
        };

        let config = match config_path {
            Some(path) => Self::load_from_file(&path).await?,
            None => Self::default(),
        };

        config.validate()?;
        Ok(config)
    }

    /// Reject values the cache cannot run with
    pub fn validate(&self) -> ConfigResult<()> {
        if self.cache.memory_budget_bytes == 0 {
            return Err(ConfigError::InvalidValue {
                field: "cache.memory_budget_bytes".to_string(),
                value: "0".to_string(),
                reason: "The memory tier needs a non-zero budget".to_string(),
            });
        }

        if self.cache.file_prefix.is_empty()
            || self.cache.file_prefix.contains(std::path::is_separator)
        {
            return Err(ConfigError::InvalidValue {
                field: "cache.file_prefix".to_string(),
                value: self.cache.file_prefix.clone(),
                reason: "Prefix must be non-empty and contain no path separators".to_string(),
            });
        }

        if self.client.request_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "client.request_timeout_secs".to_string(),
                value: "0".to_string(),
                reason: "Requests need a timeout of at least one second".to_string(),
            });
        }

        Ok(())
    }

    /// Write a commented default config file
    ///
    /// Writes to `path` or the user config location. An existing file is
    /// only replaced when `force` is set.
    pub async fn initialize(path: Option<PathBuf>, force: bool) -> ConfigResult<PathBuf> {
        let config_path = match path {
            Some(path) => path,
            None => Self::default_config_path()?,
        };

        if config_path.exists() && !force {
            debug!("Config file already exists: {}", config_path.display());
            return Ok(config_path);
        }

        if let Some(parent) = config_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| ConfigError::Io {
                    path: parent.to_path_buf(),
                    source,
                })?;
        }

        tokio::fs::write(&config_path, Self::generate_default_config_content())
            .await
            .map_err(|source| ConfigError::Io {
                path: config_path.clone(),
                source,
            })?;

        info!("Created default configuration file: {}", config_path.display());
        Ok(config_path)
    }

    /// Find configuration file in standard locations
    pub fn find_config_file() -> Option<PathBuf> {
        let mut search_paths = vec![PathBuf::from(format!(
            "./{}",
            config_paths::LOCAL_CONFIG_FILE_NAME
        ))];
        if let Ok(user_path) = Self::default_config_path() {
            search_paths.push(user_path);
        }

        for path in search_paths {
            if path.exists() {
                debug!("Found config file: {}", path.display());
                return Some(path);
            }
        }

        debug!("No config file found in standard locations");
        None
    }

    /// Get the default config file path for the current user
    pub fn default_config_path() -> ConfigResult<PathBuf> {
        let config_dir = dirs::config_dir().ok_or(ConfigError::NoConfigDirectory)?;

        Ok(config_dir
            .join(config_paths::CONFIG_DIR_NAME)
            .join(config_paths::CONFIG_FILE_NAME))
    }

    /// Load configuration from a TOML file
    async fn load_from_file(path: &Path) -> ConfigResult<Self> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ConfigError::Io {
                path: path.to_path_buf(),
                source,
            })?;

        let config: AppConfig = toml::from_str(&content)?;

        info!("Loaded configuration from: {}", path.display());
        Ok(config)
    }

    /// Render the effective configuration as TOML
    pub fn to_toml_string(&self) -> ConfigResult<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Generate default configuration content with helpful comments
    pub fn generate_default_config_content() -> String {
        let default_cache_path = dirs::cache_dir()
            .map(|dir| dir.join(cache::CACHE_DIR_NAME))
            .unwrap_or_else(|| PathBuf::from(format!("./{}", cache::CACHE_DIR_NAME)));

        format!(
            r#"# Image Cache Configuration
# You can customize any of these settings to suit your needs.

[cache]
# Cache directory (leave unset to use the system default)
# Default: {}
# cache_root = "/path/to/custom/cache"

# Decoded-byte budget of the in-memory tier
memory_budget_bytes = {}

# Maximum number of images kept in memory (0 = unlimited)
memory_count_limit = {}

# Prefix of every cache file name
file_prefix = "{}"

# Finished request states remembered for inspection
state_history = {}

[client]
# HTTP client settings
tcp_keepalive_secs = 30
tcp_nodelay = true
pool_idle_timeout_secs = {}
pool_max_per_host = {}
request_timeout_secs = {}
connect_timeout_secs = {}
rate_limit_rps = {}  # 0 = unlimited
max_redirects = {}
# user_agent = "my-app/1.0"

[logging]
level = "{}"  # error, warn, info, debug, trace
"#,
            default_cache_path.display(),
            cache::DEFAULT_MEMORY_BUDGET_BYTES,
            cache::DEFAULT_MEMORY_COUNT_LIMIT,
            cache::FILE_PREFIX,
            cache::REQUEST_STATE_HISTORY,
            http::POOL_IDLE_TIMEOUT.as_secs(),
            http::POOL_MAX_PER_HOST,
            http::DEFAULT_TIMEOUT.as_secs(),
            http::CONNECT_TIMEOUT.as_secs(),
            limits::DEFAULT_RATE_LIMIT_RPS,
            http::MAX_REDIRECTS,
            logging::DEFAULT_LOG_LEVEL,
        )
    }
}

impl CacheConfigToml {
    /// Convert to runtime CacheConfig
    pub fn to_runtime_config(&self) -> CacheConfig {
        CacheConfig {
            cache_root: self.cache_root.clone(),
            memory_budget_bytes: self.memory_budget_bytes,
            memory_count_limit: self.memory_count_limit,
            file_prefix: self.file_prefix.clone(),
            state_history: self.state_history,
        }
    }
}

impl ClientConfigToml {
    /// Convert to runtime ClientConfig
    pub fn to_runtime_config(&self) -> ClientConfig {
        let defaults = ClientConfig::default();
        ClientConfig {
            tcp_keepalive: self.tcp_keepalive_secs.map(Duration::from_secs),
            tcp_nodelay: self.tcp_nodelay,
            pool_idle_timeout: self.pool_idle_timeout_secs.map(Duration::from_secs),
            pool_max_per_host: self.pool_max_per_host,
            request_timeout: Duration::from_secs(self.request_timeout_secs),
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
            rate_limit_rps: self.rate_limit_rps,
            max_redirects: self.max_redirects,
            user_agent: self.user_agent.clone().unwrap_or(defaults.user_agent),
        }
    }
}
