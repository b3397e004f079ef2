//! The `platewise cache` command for result cache maintenance.

use clap::{Args, Subcommand};
use platewise_core::{CacheEntry, CacheOptions, CacheStats, Config, ContentHasher, ResultCache};
use std::path::{Path, PathBuf};

/// Arguments for the `cache` command.
#[derive(Args, Debug)]
pub struct CacheArgs {
    #[command(subcommand)]
    pub command: CacheCommand,
}

/// Subcommands for cache maintenance.
#[derive(Subcommand, Debug)]
pub enum CacheCommand {
    /// Show entry counts and hit rate
    Stats {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Remove entries older than the TTL
    Cleanup,

    /// Remove every entry (hit/miss counters are kept)
    Clear,

    /// Show the cached analysis of a photo, if any
    Lookup {
        /// Image file to look up
        image: PathBuf,
    },

    /// Show the cache file path
    Path,
}

/// Execute the cache command.
pub async fn execute(args: CacheArgs, config: &Config) -> anyhow::Result<()> {
    if let CacheCommand::Path = args.command {
        if config.cache.persist {
            println!("{}", config.cache_path().display());
        } else {
            println!("(persistence disabled; cache is in memory only)");
        }
        return Ok(());
    }

    let cache = ResultCache::open(CacheOptions::from_config(config)).await;

    match args.command {
        CacheCommand::Stats { json } => {
            let stats = cache.stats().await;
            if json {
                println!("{}", serde_json::to_string_pretty(&stats)?);
            } else {
                print!("{}", format_stats(&stats));
            }
        }

        CacheCommand::Cleanup => {
            let removed = cache.cleanup().await;
            cache.flush().await?;
            println!("Removed {removed} expired entries");
        }

        CacheCommand::Clear => {
            let size = cache.len().await;
            cache.clear().await;
            cache.flush().await?;
            println!("Cleared {size} entries");
        }

        CacheCommand::Lookup { image } => match lookup(&cache, &image).await? {
            Some(entry) => println!("{}", serde_json::to_string_pretty(&entry)?),
            None => anyhow::bail!("No cached analysis for {}", image.display()),
        },

        CacheCommand::Path => {}
    }

    Ok(())
}

/// Find the live entry for an image without counting it as a cache hit.
async fn lookup(cache: &ResultCache, image: &Path) -> anyhow::Result<Option<CacheEntry>> {
    let key = ContentHasher::hash_file(image)?;
    tracing::debug!("Looking up {} as {key}", image.display());
    if !cache.has(&key).await {
        return Ok(None);
    }
    Ok(cache.peek(&key).await)
}

fn format_stats(stats: &CacheStats) -> String {
    let mut out = String::new();
    out.push_str(&format!("Entries:      {} / {}\n", stats.size, stats.max_size));
    out.push_str(&format!(
        "Hit rate:     {:.1}% ({} hits, {} misses)\n",
        stats.hit_rate * 100.0,
        stats.hits,
        stats.misses
    ));
    out.push_str(&format!("Evictions:    {}\n", stats.evictions));
    out.push_str(&format!("Expirations:  {}\n", stats.expirations));
    if let (Some(oldest), Some(newest)) = (stats.oldest, stats.newest) {
        out.push_str(&format!("Oldest entry: {}\n", oldest.to_rfc3339()));
        out.push_str(&format!("Newest entry: {}\n", newest.to_rfc3339()));
    }
    out
}
