//! The `platewise providers` command for inspecting analysis backends.

use clap::{Args, Subcommand};
use platewise_core::clock::system_clock;
use platewise_core::provider::HealthCheck;
use platewise_core::{Config, Gateway, GatewayOptions, ProviderFactory, ProviderStatus, ResultCache};
use std::sync::Arc;
use std::time::Duration;

/// Arguments for the `providers` command.
#[derive(Args, Debug)]
pub struct ProvidersArgs {
    #[command(subcommand)]
    pub command: ProvidersCommand,
}

/// Subcommands for provider inspection.
#[derive(Subcommand, Debug)]
pub enum ProvidersCommand {
    /// List providers in failover order
    List {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Health-check every provider once
    Check {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Health-check every provider periodically until interrupted
    Watch {
        /// Seconds between checks (defaults to gateway.health_check_interval_secs)
        #[arg(long)]
        interval_secs: Option<u64>,
    },
}

/// Execute the providers command.
pub async fn execute(args: ProvidersArgs, config: &Config) -> anyhow::Result<()> {
    // Provider inspection never needs the persisted cache
    let gateway = Gateway::new(
        Arc::new(ResultCache::new(1, Duration::from_secs(1))),
        ProviderFactory::build_all(config, system_clock()),
        GatewayOptions::from_config(config),
    );
    if gateway.providers().is_empty() {
        anyhow::bail!(
            "No providers configured. Set an API key (e.g. ANTHROPIC_API_KEY) or enable [providers.ollama]."
        );
    }

    match args.command {
        ProvidersCommand::List { json } => {
            let statuses = gateway.provider_health();
            if json {
                println!("{}", serde_json::to_string_pretty(&statuses)?);
            } else {
                for status in &statuses {
                    println!("{}", format_status(status));
                }
            }
        }

        ProvidersCommand::Check { json } => {
            let checks = gateway.health_check_all().await;
            if json {
                println!("{}", serde_json::to_string_pretty(&checks)?);
            } else {
                for check in &checks {
                    println!("{}", format_check(check));
                }
            }
            if checks.iter().all(|c| !c.healthy) {
                anyhow::bail!("No provider is reachable");
            }
        }

        ProvidersCommand::Watch { interval_secs } => {
            let secs = interval_secs.unwrap_or(config.gateway.health_check_interval_secs);
            let interval = Duration::from_secs(secs.max(1));
            let monitor = gateway.spawn_health_monitor(interval);
            tracing::info!("Probing providers every {}s; press Ctrl-C to stop", interval.as_secs());
            tokio::signal::ctrl_c().await?;
            for check in monitor.latest() {
                println!("{}", format_check(&check));
            }
            monitor.shutdown().await;
        }
    }

    Ok(())
}

fn format_status(status: &ProviderStatus) -> String {
    let state = if status.health.available {
        "available".to_string()
    } else if let Some(until) = status.health.cooldown_until {
        format!("cooling down until {}", until.to_rfc3339())
    } else {
        "unavailable".to_string()
    };
    format!(
        "{:<12} priority {:<4} retries {:<2} timeout {:>6}ms  {}",
        status.name, status.priority, status.max_retries, status.timeout_ms, state
    )
}

fn format_check(check: &HealthCheck) -> String {
    let verdict = if check.healthy { "ok" } else { "FAIL" };
    match &check.detail {
        Some(detail) => format!(
            "{:<12} {:<4} {:>6}ms  {detail}",
            check.provider, verdict, check.latency_ms
        ),
        None => format!("{:<12} {:<4} {:>6}ms", check.provider, verdict, check.latency_ms),
    }
}
