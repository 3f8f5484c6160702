//! Image Cache CLI application
//!
//! Command-line interface for fetching remote images through the two-tier
//! memory and disk cache, and for inspecting and pruning that cache.

use std::process;

use tracing::{debug, info};
use tracing_subscriber::{EnvFilter, fmt};

use image_cache::cli::{Cli, Commands, handle_cache, handle_config, handle_fetch};
use image_cache::config::AppConfig;
use image_cache::errors::Result;

#[tokio::main]
async fn main() {
    let result = run().await;

    if let Err(e) = result {
        eprintln!("Error ({}): {}", e.category(), e);
        process::exit(1);
    }
}

/// Main application logic
async fn run() -> Result<()> {
    // Load environment variables from .env file if it exists
    dotenv::dotenv().ok();

    let cli = Cli::parse_args();

    // A broken config file is reported by the command itself
    let config_level = AppConfig::load(cli.global.config.clone())
        .await
        .ok()
        .map(|config| config.logging.level);
    init_logging(&cli, config_level.as_deref());

    info!("Image Cache v{} starting", env!("CARGO_PKG_VERSION"));

    let global = cli.global;
    match cli.command {
        Commands::Fetch(args) => {
            info!("Executing fetch command");
            handle_fetch(args, &global).await
        }
        Commands::Cache(args) => {
            info!("Executing cache command");
            handle_cache(args, &global).await
        }
        Commands::Config(args) => {
            info!("Executing config command");
            handle_config(args, &global).await
        }
    }
}

/// Initialize logging from CLI flags, falling back to the configured level
fn init_logging(cli: &Cli, config_level: Option<&str>) {
    let level = if cli.has_verbosity_flag() {
        cli.log_level().to_string().to_lowercase()
    } else {
        config_level
            .map(str::to_string)
            .unwrap_or_else(|| cli.log_level().to_string().to_lowercase())
    };

    let mut filter = EnvFilter::from_default_env();
    let mut rejected = None;
    match format!("image_cache={}", level).parse() {
        Ok(directive) => filter = filter.add_directive(directive),
        Err(e) => rejected = Some(e),
    }

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_level(cli.global.very_verbose)
        .init();

    if let Some(e) = rejected {
        eprintln!("Ignoring log level '{}': {}", level, e);
    }

    if cli.global.very_verbose {
        debug!("Very verbose logging enabled");
    } else if cli.global.verbose {
        info!("Verbose logging enabled");
    }
}
