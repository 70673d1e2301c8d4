//! Accidents ETL command line entry point.
//!
//! # Usage
//!
//! ```bash
//! # Run every stage in order (default): clean, region, optimize, rates
//! cargo run --bin accidents-etl
//!
//! # Run a single stage
//! cargo run --bin accidents-etl -- clean
//! cargo run --bin accidents-etl -- region
//! cargo run --bin accidents-etl -- optimize
//! cargo run --bin accidents-etl -- rates
//! ```
//!
//! # Environment Variables
//!
//! - `ETL_CONFIG`: Path to a TOML configuration file. Without it the standard
//!   locations are searched and built-in defaults are used if none exists.
//! - `RUST_LOG`: Log level (default: info)

use std::env;
use std::str::FromStr;

use anyhow::{bail, Context, Result};
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

use accidents_etl::stages::FileOutcome;
use accidents_etl::{Pipeline, PipelineConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Clean,
    Region,
    Optimize,
    Rates,
    All,
}

impl FromStr for Command {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "clean" => Ok(Command::Clean),
            "region" => Ok(Command::Region),
            "optimize" => Ok(Command::Optimize),
            "rates" => Ok(Command::Rates),
            "all" => Ok(Command::All),
            other => Err(format!(
                "unknown stage '{}' (expected clean, region, optimize, rates or all)",
                other
            )),
        }
    }
}

impl Command {
    /// Single stages to run, in order.
    fn stages(self) -> &'static [Command] {
        match self {
            Command::Clean => &[Command::Clean],
            Command::Region => &[Command::Region],
            Command::Optimize => &[Command::Optimize],
            Command::Rates => &[Command::Rates],
            Command::All => &[
                Command::Clean,
                Command::Region,
                Command::Optimize,
                Command::Rates,
            ],
        }
    }
}

fn load_config() -> Result<PipelineConfig> {
    if let Ok(path) = env::var("ETL_CONFIG") {
        return PipelineConfig::from_file(&path)
            .with_context(|| format!("Failed to load configuration from {}", path));
    }
    let found = PipelineConfig::from_default_location()
        .context("Failed to load configuration from the standard locations")?;
    Ok(found.unwrap_or_else(|| {
        info!("No accidents_etl.toml found, using built-in defaults");
        PipelineConfig::default()
    }))
}

fn clean(pipeline: &mut Pipeline) -> Result<()> {
    pipeline.run_clean().context("Clean stage failed")?;
    Ok(())
}

fn region(pipeline: &mut Pipeline) -> Result<()> {
    pipeline.run_region().context("Region stage failed")?;
    Ok(())
}

fn optimize(pipeline: &Pipeline) -> Result<()> {
    let outcomes = pipeline.run_optimize();
    let mut failed = 0;
    for outcome in &outcomes {
        match outcome {
            FileOutcome::Optimized(report) => info!(
                "{}: {} columns, {} rows, saved {} bytes",
                report.path.display(),
                report.columns_after,
                report.rows,
                report.bytes_saved()
            ),
            FileOutcome::Skipped { path } => info!("{}: not found, skipped", path.display()),
            FileOutcome::Failed { path, error } => {
                failed += 1;
                error!("{}: {}", path.display(), error);
            }
        }
    }
    if failed > 0 {
        bail!("{} of {} files could not be optimized", failed, outcomes.len());
    }
    Ok(())
}

fn rates(pipeline: &mut Pipeline) -> Result<()> {
    let rates = pipeline.run_rates().context("Rates stage failed")?;
    info!(
        "Total accidents: {}, avg per day: {:.1}, avg per hour: {:.2}",
        rates.total, rates.per_day, rates.per_hour
    );
    Ok(())
}

fn main() -> Result<()> {
    // Initialize logging
    FmtSubscriber::builder()
        .with_max_level(
            env::var("RUST_LOG")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(Level::INFO),
        )
        .with_target(true)
        .init();

    let command = match env::args().nth(1) {
        Some(arg) => arg.parse::<Command>().map_err(anyhow::Error::msg)?,
        None => Command::All,
    };

    let config = load_config()?;
    let mut pipeline = Pipeline::new(config);
    info!("Running {:?}", command);

    for stage in command.stages() {
        match stage {
            Command::Clean => clean(&mut pipeline)?,
            Command::Region => region(&mut pipeline)?,
            Command::Optimize => optimize(&pipeline)?,
            Command::Rates => rates(&mut pipeline)?,
            Command::All => bail!("'all' is not a single stage"),
        }
    }
    Ok(())
}
