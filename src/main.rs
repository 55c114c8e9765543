use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use coffee_reconcile::{
    format_thousands, rename_map, run_merge, run_standardize, run_verify, top_by_mean_per_capita,
    FileOutcome, MergeOutcome, MergedRecord, PipelineConfig,
};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Coffee Reconcile - country-name reconciliation and per-capita consumption
#[derive(Parser, Debug)]
#[command(name = "coffee-reconcile", version)]
#[command(about = "Reconciles country names across coffee datasets and merges per-capita consumption")]
struct Cli {
    /// Log at debug level (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Rewrite the country column of every CSV in a directory
    Standardize(RunArgs),
    /// Melt, reconcile and join the consumption + population tables
    Merge(RunArgs),
    /// Print the top exporters and importers
    Verify(RunArgs),
}

#[derive(clap::Args, Debug)]
struct RunArgs {
    /// Directory holding the CSV files
    #[arg(long, default_value = ".")]
    dir: PathBuf,

    /// JSON config overriding the defaults
    #[arg(long)]
    config: Option<PathBuf>,

    /// Write the run report as JSON to this path
    #[arg(long)]
    report: Option<PathBuf>,
}

impl RunArgs {
    fn load_config(&self) -> Result<PipelineConfig> {
        match &self.config {
            Some(path) => PipelineConfig::from_file(path)
                .with_context(|| format!("Failed to load config {}", path.display())),
            None => Ok(PipelineConfig::default()),
        }
    }
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(e) = run(cli) {
        error!("{:#}", e);
        std::process::exit(1);
    }
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Standardize(args) => standardize(&args),
        Command::Merge(args) => merge(&args),
        Command::Verify(args) => verify(&args),
    }
}

fn standardize(args: &RunArgs) -> Result<()> {
    let config = args.load_config()?;
    let map = rename_map(&config.standardizer)?;

    let report = run_standardize(&args.dir, &config.standardizer, &map)?;

    for outcome in &report.files {
        match outcome {
            FileOutcome::Standardized { file, changes, .. } => {
                println!("✓ {} ({} names changed)", file, changes.len())
            }
            FileOutcome::Skipped { file, reason } => println!("- {} skipped: {}", file, reason),
            FileOutcome::Failed { file, error } => println!("✗ {} failed: {}", file, error),
        }
    }
    println!("\nCountry name standardization completed: {}", report.summary());

    write_report(args.report.as_deref(), &report)
}

fn merge(args: &RunArgs) -> Result<()> {
    let config = args.load_config()?;
    let outcome = run_merge(&args.dir, &config.merger)?;

    print_merge(&outcome, config.merger.preview_rows);

    write_report(args.report.as_deref(), &outcome.report)
}

fn verify(args: &RunArgs) -> Result<()> {
    let config = args.load_config()?;
    let report = run_verify(&args.dir, &config.verifier)?;

    println!("{}", report.render());

    write_report(args.report.as_deref(), &report)
}

fn print_merge(outcome: &MergeOutcome, preview: usize) {
    let report = &outcome.report;

    println!("\nSummary:");
    println!("Total rows: {}", report.rows_written);
    println!("Countries: {}", report.countries);
    match report.year_range {
        Some((min, max)) => println!("Year range: {} - {}", min, max),
        None => println!("Year range: n/a"),
    }
    println!("Rows without population: {}", report.join.missing_population_after_repair);

    println!("\nFirst {} rows:", preview);
    for record in outcome.records.iter().take(preview) {
        println!("{}", preview_line(record));
    }

    println!("\nTop {} countries by average per-capita consumption (kg):", preview);
    for (idx, (country, mean)) in top_by_mean_per_capita(&outcome.summaries, preview)
        .iter()
        .enumerate()
    {
        println!("{}. {}: {:.4}", idx + 1, country, mean);
    }

    println!("\nSaved: {}, {}", report.merged_output, report.summary_output);
}

fn preview_line(record: &MergedRecord) -> String {
    let total = record
        .total_consumption
        .map(format_thousands)
        .unwrap_or_else(|| "-".to_string());
    let per_capita = record
        .per_capita_kg
        .map(|v| format!("{:.4}", v))
        .unwrap_or_else(|| "-".to_string());

    format!("{} {} total={} kg per_capita={} kg", record.country, record.year, total, per_capita)
}

fn write_report<T: Serialize>(path: Option<&Path>, report: &T) -> Result<()> {
    let Some(path) = path else {
        return Ok(());
    };

    let json = serde_json::to_string_pretty(report)?;
    fs::write(path, json).with_context(|| format!("Failed to write report {}", path.display()))?;
    info!(path = %path.display(), "Report written");
    Ok(())
}
