//! Command-line argument parsing for the image cache
//!
//! This module defines the CLI structure using clap derive macros,
//! providing commands to fetch images through the cache, inspect and prune
//! cache entries, and manage the configuration file.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// Image Cache - fetch and cache remote images
#[derive(Parser, Debug)]
#[command(
    name = "image_cache",
    version,
    about = "Fetch remote images through a two-tier memory and disk cache",
    long_about = "Fetches images over HTTP(S) once and keeps them in a persistent on-disk cache.
Concurrent requests for the same image share a single download."
)]
pub struct Cli {
    /// Global options
    #[command(flatten)]
    pub global: GlobalArgs,

    /// Subcommands
    #[command(subcommand)]
    pub command: Commands,
}

/// Global arguments available to all subcommands
#[derive(Args, Debug, Clone, Default)]
pub struct GlobalArgs {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Very verbose logging (debug level)
    #[arg(long, global = true)]
    pub very_verbose: bool,

    /// Quiet mode - suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Configuration file path
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Cache directory path (overrides the config file)
    #[arg(long, global = true, value_name = "DIR")]
    pub cache_dir: Option<PathBuf>,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Fetch images through the cache
    Fetch(FetchArgs),

    /// Inspect and manage cached entries
    Cache(CacheArgs),

    /// Manage the configuration file
    Config(ConfigArgs),
}

/// Arguments for the fetch command
#[derive(Args, Debug, Clone)]
pub struct FetchArgs {
    /// Image URLs to fetch
    #[arg(value_name = "URL", required = true)]
    pub urls: Vec<String>,

    /// Cache key to store the image under (single URL only)
    #[arg(short, long)]
    pub key: Option<String>,

    /// Print results as JSON lines
    #[arg(long)]
    pub json: bool,
}

/// Arguments for cache management
#[derive(Args, Debug)]
pub struct CacheArgs {
    #[command(subcommand)]
    pub action: CacheAction,
}

/// Identifies one cache entry by URL or explicit key
#[derive(Args, Debug, Clone)]
pub struct EntryArgs {
    /// Image URL whose entry to use
    #[arg(value_name = "URL", required_unless_present = "key")]
    pub url: Option<String>,

    /// Explicit cache key (takes precedence over the URL)
    #[arg(short, long)]
    pub key: Option<String>,
}

/// Cache management actions
#[derive(Subcommand, Debug)]
pub enum CacheAction {
    /// Show cache statistics and information
    Info {
        /// Print statistics as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show the file an entry is stored in
    Path(EntryArgs),

    /// Remove one entry
    Remove(EntryArgs),

    /// Remove every cached image
    Clear {
        /// Do not ask for confirmation
        #[arg(short, long)]
        yes: bool,
    },
}

/// Arguments for configuration management
#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: ConfigAction,
}

/// Configuration actions
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Write a commented default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },

    /// Print the effective configuration
    Show,
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Get the logging level based on global arguments
    pub fn log_level(&self) -> tracing::Level {
        if self.global.quiet {
            tracing::Level::ERROR
        } else if self.global.very_verbose {
            tracing::Level::DEBUG
        } else if self.global.verbose {
            tracing::Level::INFO
        } else {
            tracing::Level::WARN
        }
    }

    /// True when a flag picked the log level
    pub fn has_verbosity_flag(&self) -> bool {
        self.global.quiet || self.global.verbose || self.global.very_verbose
    }
}

impl FetchArgs {
    /// Reject argument combinations that cannot be honored
    pub fn validate(&self) -> Result<(), String> {
        if self.key.is_some() && self.urls.len() > 1 {
            return Err("--key can only be used with a single URL".to_string());
        }

        if self.key.as_deref() == Some("") {
            return Err("--key must not be empty".to_string());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_fetch_args_validation() {
        let mut args = FetchArgs {
            urls: vec!["https://example.com/a.png".to_string()],
            key: Some("avatar".to_string()),
            json: false,
        };

        // Valid configuration
        assert!(args.validate().is_ok());

        // Invalid: key with several URLs
        args.urls.push("https://example.com/b.png".to_string());
        assert!(args.validate().is_err());

        // Invalid: empty key
        args.urls.truncate(1);
        args.key = Some(String::new());
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_parse_cache_path_by_key() {
        let cli = Cli::try_parse_from(["image_cache", "cache", "path", "--key", "avatar"]).unwrap();

        match cli.command {
            Commands::Cache(CacheArgs {
                action: CacheAction::Path(entry),
            }) => {
                assert_eq!(entry.key.as_deref(), Some("avatar"));
                assert!(entry.url.is_none());
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_entry_requires_url_or_key() {
        let result = Cli::try_parse_from(["image_cache", "cache", "remove"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_log_level() {
        let cli_quiet = Cli {
            global: GlobalArgs {
                quiet: true,
                ..Default::default()
            },
            command: Commands::Config(ConfigArgs {
                action: ConfigAction::Show,
            }),
        };

        let cli_verbose = Cli {
            global: GlobalArgs {
                verbose: true,
                ..Default::default()
            },
            command: Commands::Config(ConfigArgs {
                action: ConfigAction::Show,
            }),
        };

        assert_eq!(cli_quiet.log_level(), tracing::Level::ERROR);
        assert_eq!(cli_verbose.log_level(), tracing::Level::INFO);
    }
}
