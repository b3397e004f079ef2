//! Platewise CLI - Cached, failover-aware food analysis from the command line.
//!
//! Platewise sends a meal photo (or a text description of a meal) to the
//! highest-priority healthy AI backend and prints structured food and
//! nutrition data. Identical inputs are answered from a local cache.
//!
//! # Usage
//!
//! ```bash
//! # Analyze a photo
//! platewise analyze lunch.jpg
//!
//! # Analyze a description
//! platewise analyze --text "two scrambled eggs on rye toast"
//!
//! # Inspect the cache and providers
//! platewise cache stats
//! platewise providers check
//! ```

use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod cli;
mod logging;

/// Platewise - Cached, failover-aware food analysis.
#[derive(Parser, Debug)]
#[command(name = "platewise")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose (debug) logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output logs in JSON format
    #[arg(long, global = true)]
    json_logs: bool,

    /// Config file to use instead of the platform default
    #[arg(long, global = true, env = "PLATEWISE_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Available commands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Analyze meal photos or a meal description
    Analyze(cli::analyze::AnalyzeArgs),

    /// Inspect and maintain the result cache
    Cache(cli::cache::CacheArgs),

    /// List and health-check analysis providers
    Providers(cli::providers::ProvidersArgs),

    /// View and manage configuration
    Config(cli::config::ConfigArgs),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config_path = cli::config_path(cli.config.as_deref());

    // Logging isn't initialized yet, so use eprintln for config warnings.
    let config = match cli::load_config(&config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!(
                "Warning: Failed to load config: {e}\n  \
                 Using default configuration. Check your config file with `platewise config path`."
            );
            platewise_core::Config::default()
        }
    };
    logging::init_from_config(&config, cli.verbose, cli.json_logs);

    tracing::debug!("Platewise v{}", platewise_core::VERSION);

    // Dispatch to the appropriate command handler
    match cli.command {
        Commands::Analyze(args) => cli::analyze::execute(args, &config).await,
        Commands::Cache(args) => cli::cache::execute(args, &config).await,
        Commands::Providers(args) => cli::providers::execute(args, &config).await,
        Commands::Config(args) => cli::config::execute(args, &config_path).await,
    }
}
