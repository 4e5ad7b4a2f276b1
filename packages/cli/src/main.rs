#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Launch window risk scanner.
//!
//! ```text
//! launch_risk run [--start <rfc3339>] [--window-hours N] [--increment-hours N] [--concurrency N] [--geojson]
//! launch_risk refresh
//! launch_risk sample [--count N] [--seed N] [--geojson]
//! ```
//!
//! Every command reads the TOML config given by `--config` (or the
//! `LAUNCH_RISK_CONFIG` environment variable). Results are written to
//! stdout as one JSON document per line; logs and the progress bar go to
//! stderr.

mod progress;
mod sample;

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use futures::StreamExt as _;
use indicatif::MultiProgress;
use launch_risk_evaluate::RiskResult;
use launch_risk_hazard::HazardStore;
use launch_risk_http::RetryPolicy;
use launch_risk_models::LaunchRiskConfig;
use launch_risk_scan::{CommandSimulator, ElevationLookup, LaunchWindowScanner, ScanWindow};

#[derive(Parser)]
#[command(name = "launch_risk", about = "Score balloon launch windows by landing risk")]
struct Cli {
    /// Path to the TOML config file
    #[arg(long, global = true, env = "LAUNCH_RISK_CONFIG")]
    config: Option<PathBuf>,

    /// Verbose logging and simulator debug output
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan a launch window and print one result per launch time
    Run {
        /// First launch time (RFC 3339); defaults to now
        #[arg(long)]
        start: Option<DateTime<Utc>>,
        /// Window length in hours
        #[arg(long)]
        window_hours: Option<i64>,
        /// Step between launch times in hours
        #[arg(long)]
        increment_hours: Option<i64>,
        /// Launch times evaluated concurrently
        #[arg(long)]
        concurrency: Option<usize>,
        /// Print full results with `GeoJSON` geometry instead of summaries
        #[arg(long)]
        geojson: bool,
    },
    /// Delete cached hazard data and download it again
    Refresh,
    /// Score a synthetic landing point cloud at a random spot in the boundary
    Sample {
        /// Number of landing points to draw
        #[arg(long, default_value = "200")]
        count: usize,
        /// Seed for reproducible draws
        #[arg(long)]
        seed: Option<u64>,
        /// Print the full result with `GeoJSON` geometry
        #[arg(long)]
        geojson: bool,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let multi = progress::init_logger(cli.debug);

    let mut config = match &cli.config {
        Some(path) => {
            log::info!("Loading config from {}", path.display());
            LaunchRiskConfig::load(path)?
        }
        None => {
            log::info!("No config file given, using defaults");
            LaunchRiskConfig::default()
        }
    };

    let client = launch_risk_http::client()?;
    let retry = RetryPolicy::from_settings(&config.retry);

    match cli.command {
        Commands::Run {
            start,
            window_hours,
            increment_hours,
            concurrency,
            geojson,
        } => {
            if let Some(hours) = window_hours {
                config.scan.window_hours = hours;
            }
            if let Some(hours) = increment_hours {
                config.scan.increment_hours = hours;
            }
            if let Some(steps) = concurrency {
                config.scan.max_concurrent_steps = steps;
            }
            config.validate()?;

            let store = HazardStore::new(config.data.clone(), client.clone(), retry);
            let scanner = LaunchWindowScanner::new(
                Arc::new(CommandSimulator::new(config.simulator.clone())),
                Arc::new(store),
                ElevationLookup::new(client, retry, config.elevation.clone()),
                config.launch_site.clone(),
                config.flight.clone(),
                config.scan.clone(),
            )
            .with_debug(cli.debug || config.simulator.debug);

            let window = ScanWindow::from_settings(start.unwrap_or_else(Utc::now), &config.scan);
            run(&multi, &scanner, window, geojson).await?;
        }
        Commands::Refresh => {
            let store = HazardStore::new(config.data.clone(), client, retry);
            let snapshot = store.refresh().await?;
            log::info!(
                "Hazard data refreshed: {} hazards in {}",
                snapshot.hazards().len(),
                config.data.data_dir.display()
            );
        }
        Commands::Sample {
            count,
            seed,
            geojson,
        } => {
            let store = HazardStore::new(config.data.clone(), client, retry);
            let result = sample::run(&store, &config.scan, count, seed).await?;
            print_result(&multi, &result, config.scan.max_hazard_ratio, geojson)?;
        }
    }

    Ok(())
}

async fn run(
    multi: &MultiProgress,
    scanner: &LaunchWindowScanner,
    window: ScanWindow,
    geojson: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let total = window.grid()?.len();
    let max_ratio = scanner.settings().max_hazard_ratio;
    let mut results = std::pin::pin!(scanner.scan(window).await?);

    let bar = progress::steps_bar(multi, "Launch times", u64::try_from(total)?);
    let mut failed = 0usize;
    let mut best: Option<(DateTime<Utc>, f64)> = None;

    while let Some(step) = results.next().await {
        match step {
            Ok(result) => {
                if best.is_none_or(|(_, ratio)| result.risk_ratio < ratio) {
                    best = Some((result.launch_time, result.risk_ratio));
                }
                print_result(multi, &result, max_ratio, geojson)?;
            }
            Err(e) => {
                failed += 1;
                log::error!("{e}");
            }
        }
        bar.inc(1);
    }
    bar.finish_and_clear();

    match best {
        Some((launch_time, ratio)) => log::info!(
            "Lowest risk: {} at ratio {ratio:.4} ({failed} of {total} launch times failed)",
            launch_time.to_rfc3339()
        ),
        None => log::warn!("No launch time could be scored ({failed} failed)"),
    }
    Ok(())
}

fn print_result(
    multi: &MultiProgress,
    result: &RiskResult,
    max_ratio: f64,
    geojson: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let line = if geojson {
        serde_json::to_string(&result.to_geojson()?)?
    } else {
        serde_json::to_string(&result.summary(max_ratio))?
    };
    multi.suspend(|| println!("{line}"));
    Ok(())
}
