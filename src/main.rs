//! Stratus CLI
//!
//! Command-line interface for the Stratus storage engine:
//! - Print a default config
//! - Plan a selection against the stored tiers
//! - Run a selection through the engine
//! - Show storage statistics

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use stratus::config::{generate_default_config, Config};
use stratus::geo::{Crs, GeoLocation};
use stratus::storage::{Plan, Response, Selection, StorageEngine, TimePeriod};
use stratus::upstream::SyntheticUpstream;

#[derive(Parser)]
#[command(name = "stratus")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Temporal-spatial storage for meteorological datasets")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file (default: search the standard locations)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Output format (table, json)
    #[arg(short, long, default_value = "table", global = true)]
    format: String,
}

#[derive(clap::Args)]
struct SelectionArgs {
    /// Location as "x,y" (repeatable)
    #[arg(short, long = "location", required = true)]
    locations: Vec<String>,

    /// EPSG code of the locations
    #[arg(long, default_value = "4326")]
    crs: u32,

    /// Model factor names (repeatable)
    #[arg(short = 'F', long = "factor", required = true)]
    factors: Vec<String>,

    /// Period start: date, offset (-7d) or "now"
    #[arg(short, long, default_value = "-7d", allow_hyphen_values = true)]
    start: String,

    /// Period end: date, offset (+12h) or "now"
    #[arg(short, long, default_value = "now", allow_hyphen_values = true)]
    end: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate default config file
    Config {
        /// Output path (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Show which parts of a selection are stored, without fetching
    Plan {
        #[command(flatten)]
        selection: SelectionArgs,
    },

    /// Run a selection against the synthetic upstream
    Fetch {
        #[command(flatten)]
        selection: SelectionArgs,

        /// Run the selection this many times
        #[arg(long, default_value = "1")]
        repeat: usize,
    },

    /// Show storage statistics
    Stats,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Commands::Config { output } = &cli.command {
        let content = generate_default_config();
        match output {
            Some(path) => {
                std::fs::write(path, content)
                    .with_context(|| format!("writing config to {:?}", path))?;
                println!("Config written to {:?}", path);
            }
            None => print!("{}", content),
        }
        return Ok(());
    }

    let config = match &cli.config {
        Some(path) => Config::load_with_env(path)?,
        None => Config::load_default(),
    };
    stratus::logging::init(&config.logging);
    tracing::info!("Stratus v{}", env!("CARGO_PKG_VERSION"));

    let engine = StorageEngine::builder(
        config.storage_configuration()?,
        Arc::new(SyntheticUpstream::new()),
    )
    .catalog(Arc::new(config.catalog()?))
    .build()?;

    match cli.command {
        Commands::Config { .. } => {}
        Commands::Plan { selection } => {
            let plan = engine.plan(&selection.build()?)?;
            match cli.format.as_str() {
                "json" => println!("{}", serde_json::to_string_pretty(&plan)?),
                _ => print_plan(&plan),
            }
        }
        Commands::Fetch { selection, repeat } => {
            let selection = selection.build()?;
            for run in 1..=repeat.max(1) {
                let started = std::time::Instant::now();
                let response = engine.handle(&selection).await?;
                match cli.format.as_str() {
                    "json" => println!("{}", serde_json::to_string_pretty(&response)?),
                    _ => {
                        if repeat > 1 {
                            println!("Run {} ({:.1?})", run, started.elapsed());
                        }
                        print_response(&response);
                    }
                }
            }
        }
        Commands::Stats => {
            let stats = engine.stats()?;
            match cli.format.as_str() {
                "json" => println!("{}", serde_json::to_string_pretty(&stats)?),
                _ => {
                    println!("Stratus v{}", env!("CARGO_PKG_VERSION"));
                    println!();
                    for (name, value) in engine.configuration().metadata() {
                        println!("  {:<28} {}", name, value);
                    }
                    println!();
                    println!("{}", stats);
                }
            }
        }
    }

    engine.shutdown().await?;
    Ok(())
}

impl SelectionArgs {
    fn build(&self) -> Result<Selection> {
        let period = TimePeriod::parse(&self.start, &self.end)?;
        let mut selection = Selection::new(period);
        for location in &self.locations {
            selection = selection.location(parse_location(location, Crs(self.crs))?);
        }
        for factor in &self.factors {
            selection = selection.factor(factor.as_str());
        }
        Ok(selection)
    }
}

fn parse_location(s: &str, crs: Crs) -> Result<GeoLocation> {
    let Some((x, y)) = s.split_once(',') else {
        bail!("invalid location '{}', expected \"x,y\"", s);
    };
    let x: f64 = x.trim().parse().with_context(|| format!("invalid x in '{}'", s))?;
    let y: f64 = y.trim().parse().with_context(|| format!("invalid y in '{}'", s))?;
    Ok(GeoLocation::new(x, y, crs))
}

fn join_periods(periods: &[TimePeriod]) -> String {
    if periods.is_empty() {
        return "-".to_string();
    }
    periods
        .iter()
        .map(|p| p.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

fn print_plan(plan: &Plan) {
    println!("Requested: {}", plan.requested);
    println!();
    for key in &plan.keys {
        println!("{}", key.key);
        println!("  cached:      {}", join_periods(&key.cached));
        println!("  archived:    {}", join_periods(&key.archived));
        println!("  to fetch:    {}", join_periods(&key.to_fetch));
        println!("  unavailable: {}", join_periods(&key.unavailable));
    }
    if !plan.unknown_factors.is_empty() {
        println!();
        println!("Unknown factors: {}", plan.unknown_factors.join(", "));
    }
}

fn print_response(response: &Response) {
    println!("Request {}: {}", response.request_id, response.state);
    println!();
    println!("{:<44} {:>8} {}", "Key", "Points", "Sources");
    println!("{}", "-".repeat(80));
    for series in &response.dataset.series {
        let sources: Vec<String> = series
            .provenance
            .iter()
            .map(|p| p.source.to_string())
            .collect();
        println!(
            "{:<44} {:>8} {}",
            series.key.to_string(),
            series.observations.len(),
            sources.join("+")
        );
    }

    if !response.gaps.gaps.is_empty() {
        println!();
        println!("Gaps:");
        for gap in &response.gaps.gaps {
            println!("  {} {}: {}", gap.key, gap.period, gap.reason);
        }
    }
    if !response.gaps.unknown_factors.is_empty() {
        println!();
        println!(
            "Unknown factors: {}",
            response.gaps.unknown_factors.join(", ")
        );
    }
}
