//! PetKit Feeder Monitor - Main Entry Point
//!
//! `run` polls the PetKit cloud until interrupted and logs dispensed food
//! and scheduled feeds as they are detected. `check` fetches one snapshot
//! and prints it, which is handy for verifying credentials and region.

use anyhow::Context;
use clap::{Parser, Subcommand};
use petkit_feeder_rust::{
    client::{PetkitHttpClient, SnapshotSource},
    clock::SystemClock,
    config::{MonitorConfig, TimezoneSetting},
    coordinator::RefreshCycle,
    error::{ErrorContext, ErrorReporter},
    events::{RunningTotal, TracingObserver},
    log_structured_error,
    logging::init_logging,
    model::Snapshot,
    service::PollingService,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// PetKit feeder monitor configuration
#[derive(Parser, Debug)]
#[command(name = "petkit-monitor")]
#[command(about = "Track daily dispensed food and scheduled feeds for PetKit feeders")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Config {
    #[command(subcommand)]
    command: Command,

    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,

    /// Configuration file (defaults to the user config directory)
    #[arg(long, global = true, env = "PETKIT_CONFIG")]
    config: Option<PathBuf>,

    /// PetKit account email
    #[arg(long, global = true, env = "PETKIT_EMAIL")]
    email: Option<String>,

    /// PetKit account password
    #[arg(long, global = true, env = "PETKIT_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Account region, e.g. "United States" or "China"
    #[arg(long, global = true)]
    region: Option<String>,

    /// "Set Automatically", a UTC offset like +02:00, or an IANA zone name
    #[arg(long, global = true)]
    timezone: Option<TimezoneSetting>,

    /// Seconds between polls
    #[arg(long, global = true)]
    interval: Option<u64>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Poll continuously until interrupted
    Run {
        /// Keep a running dispensed total for this feeder id
        #[arg(long)]
        watch: Option<String>,
    },
    /// Fetch once and print every feeder
    Check {
        /// Print the snapshot as JSON
        #[arg(long)]
        json: bool,
    },
}

impl Config {
    /// Layer command line overrides over file and environment settings
    fn resolve(&self) -> anyhow::Result<MonitorConfig> {
        let mut config = MonitorConfig::load(self.config.as_deref())
            .context("Failed to load configuration")?;

        if let Some(email) = &self.email {
            config.account.email = email.clone();
        }
        if let Some(password) = &self.password {
            config.account.password = password.clone();
        }
        if let Some(region) = &self.region {
            config.region = region.clone();
        }
        if let Some(timezone) = self.timezone {
            config.timezone = timezone;
        }
        if let Some(secs) = self.interval {
            config.poll_interval = Duration::from_secs(secs);
        }

        config.validate().context("Invalid configuration")?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Config::parse();
    let config = cli.resolve()?;

    // Initialize logging
    let _guard = init_logging(&config.logging, cli.debug)?;

    info!(
        "Starting PetKit feeder monitor v{} (region: {}, timezone: {})",
        env!("CARGO_PKG_VERSION"),
        config.region,
        config.timezone
    );

    match cli.command {
        Command::Run { watch } => run(config, watch).await,
        Command::Check { json } => check(config, json).await,
    }
}

async fn run(config: MonitorConfig, watch: Option<String>) -> anyhow::Result<()> {
    let client = Arc::new(PetkitHttpClient::new(&config)?);
    let mut cycle = RefreshCycle::from_config(&config, client, Arc::new(SystemClock))
        .with_observer(Arc::new(TracingObserver));

    let watched = watch.map(|feeder_id| {
        let total = Arc::new(RunningTotal::new());
        cycle.register_listener(feeder_id.clone(), total.clone());
        info!("Watching dispensed food for feeder {}", feeder_id);
        (feeder_id, total)
    });

    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Shutdown requested");
                signal_token.cancel();
            }
            Err(e) => warn!("Unable to listen for shutdown signal: {}", e),
        }
    });

    let mut service = PollingService::new(cycle, config.poll_interval);
    let result = service.run(shutdown).await;

    if let Some((feeder_id, total)) = watched {
        info!(
            "Feeder {} dispensed {}g since the last daily reset",
            feeder_id,
            total.grams()
        );
    }

    result.context("Polling stopped")
}

async fn check(config: MonitorConfig, json: bool) -> anyhow::Result<()> {
    let client = PetkitHttpClient::new(&config)?;
    let snapshot = match client.fetch_snapshot().await {
        Ok(snapshot) => snapshot,
        Err(error) => {
            log_structured_error!(error, "check", "fetch_snapshot");
            if json {
                let context = ErrorContext::new(error.to_error_code(), "check", "fetch_snapshot")
                    .with_metadata("source", client.describe());
                let report = ErrorReporter::format_api_error(&error, Some(context), true);
                println!("{}", serde_json::to_string_pretty(&report)?);
            }
            return Err(error).context("Failed to fetch feeders");
        }
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&snapshot)?);
    } else {
        print_snapshot(&snapshot);
    }
    Ok(())
}

fn print_snapshot(snapshot: &Snapshot) {
    if snapshot.feeders.is_empty() {
        println!("No feeders found on this account");
        return;
    }

    for record in snapshot.feeders.values() {
        println!("{} ({}, {})", record.name, record.id, record.device_type);

        let food = match record.status.food_level {
            Some(0) => "empty",
            Some(_) => "ok",
            None => "unknown",
        };
        println!("  food level: {food}");

        match record.lifetime_dispensed_total {
            Some(total) => println!("  lifetime dispensed: {total}g"),
            None => println!("  lifetime dispensed: not reported"),
        }

        if record.schedule.slots.is_empty() {
            println!("  schedule: none");
        } else {
            let slots: Vec<String> = record
                .schedule
                .slots
                .iter()
                .map(|slot| format!("{} {}g", slot.time_of_day(), slot.amount_grams))
                .collect();
            println!(
                "  schedule: {} ({})",
                slots.join(", "),
                record.schedule.repeat_summary()
            );
        }
    }
}
