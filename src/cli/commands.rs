//! Command handlers for the image cache CLI
//!
//! This module implements the command handlers that coordinate between CLI
//! arguments and the cache library.

use std::io::{self, Write};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::join_all;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use tracing::{debug, info};
use url::Url;

use crate::app::cache::format_bytes;
use crate::app::key::derive_key;
use crate::app::ImageCache;
use crate::cli::{
    CacheAction, CacheArgs, ConfigAction, ConfigArgs, EntryArgs, FetchArgs, GlobalArgs,
};
use crate::config::AppConfig;
use crate::errors::{AppError, Result};

/// Where a fetched image came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
enum Source {
    Memory,
    Disk,
    Network,
}

/// Outcome of one URL in the fetch command
#[derive(Debug, Serialize)]
struct FetchReport {
    url: String,
    key: String,
    source: Source,
    width: Option<u32>,
    height: Option<u32>,
    error: Option<String>,
}

/// Load configuration and apply global overrides
async fn load_config(global: &GlobalArgs) -> Result<AppConfig> {
    let mut config = AppConfig::load(global.config.clone()).await?;
    if let Some(dir) = &global.cache_dir {
        config.cache.cache_root = Some(dir.clone());
    }
    Ok(config)
}

/// Build a cache from configuration
async fn open_cache(global: &GlobalArgs) -> Result<Arc<ImageCache>> {
    let (cache_config, client_config) = load_config(global).await?.to_runtime_config();
    let cache = ImageCache::with_defaults(cache_config, client_config).await?;
    Ok(Arc::new(cache))
}

/// Handle the fetch command
///
/// Requests every URL concurrently through the cache and reports where each
/// image was served from.
pub async fn handle_fetch(args: FetchArgs, global: &GlobalArgs) -> Result<()> {
    args.validate().map_err(AppError::generic)?;

    let mut urls = Vec::with_capacity(args.urls.len());
    for raw in &args.urls {
        let url = Url::parse(raw).map_err(|e| {
            AppError::Fetch(crate::errors::FetchError::InvalidUrl {
                url: raw.clone(),
                error: e.to_string(),
            })
        })?;
        urls.push(url);
    }

    let cache = open_cache(global).await?;
    let start_time = Instant::now();
    info!("Fetching {} images", urls.len());

    let spinner = if global.quiet || args.json {
        ProgressBar::hidden()
    } else {
        ProgressBar::new_spinner()
    };
    spinner.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .map_err(|e| AppError::generic(e.to_string()))?
            .tick_strings(&["◐", "◓", "◑", "◒"]),
    );
    spinner.set_message(format!("Fetching {} images...", urls.len()));
    spinner.enable_steady_tick(Duration::from_millis(120));

    let requests = urls.into_iter().map(|url| {
        let cache = cache.clone();
        let key = args.key.clone();
        async move { fetch_one(&cache, url, key.as_deref()).await }
    });
    let reports = join_all(requests).await;

    spinner.finish_and_clear();

    // Let queued disk writes land before the process exits
    cache.flush().await?;

    let failures = reports.iter().filter(|r| r.error.is_some()).count();
    for report in &reports {
        print_report(report, args.json)?;
    }

    if !args.json && !global.quiet {
        let requests = cache.stats().await.requests;
        println!();
        println!(
            "Fetched {} of {} images in {:.2}s",
            reports.len() - failures,
            reports.len(),
            start_time.elapsed().as_secs_f64()
        );
        println!(
            "Served from cache: {}, downloaded: {} ({})",
            requests.served_from_cache(),
            requests.fetch_successes,
            format_bytes(requests.bytes_fetched)
        );
    }

    if failures > 0 {
        return Err(AppError::generic(format!(
            "{} of {} images could not be fetched",
            failures,
            reports.len()
        )));
    }
    Ok(())
}

async fn fetch_one(cache: &ImageCache, url: Url, key: Option<&str>) -> FetchReport {
    let cache_key = cache.key_for(&url, key);
    let source = if cache.cached_image(cache_key.as_str()).is_some() {
        Source::Memory
    } else if cache.is_on_disk(&cache_key) {
        Source::Disk
    } else {
        Source::Network
    };

    let outcome = match key {
        Some(key) => cache.image_for_url_with_key(&url, key).await,
        None => cache.image_for_url(&url).await,
    };

    match outcome {
        Ok(image) => FetchReport {
            url: url.to_string(),
            key: cache_key.into_inner(),
            source,
            width: Some(image.width()),
            height: Some(image.height()),
            error: None,
        },
        Err(e) => {
            debug!("Fetch of {} failed: {:?}", url, e);
            let reason = match std::error::Error::source(&e) {
                Some(source) => format!("{}: {}", e, source),
                None => e.to_string(),
            };
            FetchReport {
                url: url.to_string(),
                key: cache_key.into_inner(),
                source,
                width: None,
                height: None,
                error: Some(reason),
            }
        }
    }
}

fn print_report(report: &FetchReport, json: bool) -> Result<()> {
    if json {
        let line = serde_json::to_string(report).map_err(|e| AppError::generic(e.to_string()))?;
        println!("{}", line);
        return Ok(());
    }

    match (&report.error, report.width, report.height) {
        (None, Some(width), Some(height)) => println!(
            "✅ {} ({}x{}, from {:?}) key={}",
            report.url, width, height, report.source, report.key
        ),
        (Some(error), _, _) => println!("❌ {} - {}", report.url, error),
        _ => println!("❔ {}", report.url),
    }
    Ok(())
}

/// Handle cache management commands
pub async fn handle_cache(args: CacheArgs, global: &GlobalArgs) -> Result<()> {
    match args.action {
        CacheAction::Info { json } => handle_cache_info(global, json).await,
        CacheAction::Path(entry) => handle_cache_path(global, entry).await,
        CacheAction::Remove(entry) => handle_cache_remove(global, entry).await,
        CacheAction::Clear { yes } => handle_cache_clear(global, yes).await,
    }
}

/// Handle cache information display
async fn handle_cache_info(global: &GlobalArgs, json: bool) -> Result<()> {
    let cache = open_cache(global).await?;
    let stats = cache.stats().await;

    if json {
        let rendered =
            serde_json::to_string_pretty(&stats).map_err(|e| AppError::generic(e.to_string()))?;
        println!("{}", rendered);
        return Ok(());
    }

    println!("💾 Cache Information");
    println!("===================");
    println!("Location: {}", stats.cache_root.display());
    println!("Cached files: {}", stats.cached_files_count);
    println!("Cache size: {}", stats.format_cache_size());
    println!(
        "Memory in use: {} ({} images)",
        stats.format_memory_size(),
        stats.memory.entries
    );
    println!(
        "Memory budget: {} / {} images",
        format_bytes(cache.config().memory_budget_bytes as u64),
        cache.config().memory_count_limit
    );
    println!("Collected at: {}", stats.collected_at.to_rfc3339());

    Ok(())
}

/// Resolve the key named by entry arguments
fn entry_key(entry: &EntryArgs) -> Result<crate::app::key::CacheKey> {
    let url = entry.url.as_deref().unwrap_or("");
    Ok(derive_key(url, entry.key.as_deref())?)
}

/// Handle showing the file behind an entry
async fn handle_cache_path(global: &GlobalArgs, entry: EntryArgs) -> Result<()> {
    let cache = open_cache(global).await?;
    let key = entry_key(&entry)?;
    let path = cache.disk_path(&key);

    if cache.is_on_disk(&key) {
        println!("{}", path.display());
    } else {
        println!("{} (not cached)", path.display());
    }
    Ok(())
}

/// Handle removal of one entry
async fn handle_cache_remove(global: &GlobalArgs, entry: EntryArgs) -> Result<()> {
    let cache = open_cache(global).await?;
    let key = entry_key(&entry)?;
    let was_cached = cache.is_on_disk(&key);

    cache.remove_image(key.as_str());
    cache.flush().await?;

    if !global.quiet {
        if was_cached {
            println!("🗑️  Removed {}", key);
        } else {
            println!("ℹ️  {} was not cached", key);
        }
    }
    Ok(())
}

/// Handle removal of every entry
async fn handle_cache_clear(global: &GlobalArgs, yes: bool) -> Result<()> {
    let cache = open_cache(global).await?;
    let before = cache.stats().await;

    if !yes && !confirm(&format!(
        "⚠️  Remove {} cached files ({}) from {}? [y/N] ",
        before.cached_files_count,
        before.format_cache_size(),
        before.cache_root.display()
    ))? {
        println!("Aborted.");
        return Ok(());
    }

    cache.clear();
    cache.flush().await?;

    if !global.quiet {
        println!("🧹 Cleared {} cached files", before.cached_files_count);
    }
    Ok(())
}

fn confirm(prompt: &str) -> Result<bool> {
    print!("{}", prompt);
    io::stdout().flush()?;

    let mut answer = String::new();
    io::stdin().read_line(&mut answer)?;
    Ok(matches!(answer.trim(), "y" | "Y" | "yes" | "YES"))
}

/// Handle configuration commands
pub async fn handle_config(args: ConfigArgs, global: &GlobalArgs) -> Result<()> {
    match args.action {
        ConfigAction::Init { force } => {
            let path = AppConfig::initialize(global.config.clone(), force).await?;
            println!("📁 Configuration file: {}", path.display());
            Ok(())
        }
        ConfigAction::Show => {
            let config = load_config(global).await?;
            print!("{}", config.to_toml_string()?);
            Ok(())
        }
    }
}
