//! Survey tree tuning CLI
//!
//! Runs the full tuning pipeline from a TOML configuration and writes the
//! report, tuning table and final model.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use survey_tuner::{Pipeline, PipelineConfig};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "survey-tune")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Deterministic regression-tree tuning for survey data", long_about = None)]
struct Args {
    /// Pipeline configuration (TOML)
    #[arg(short, long)]
    config: PathBuf,

    /// Output directory for the report, tuning table and model
    #[arg(short, long, default_value = "out")]
    output: PathBuf,

    /// Override the configured seed
    #[arg(long)]
    seed: Option<u64>,

    /// Override the configured worker count (0 = one per CPU)
    #[arg(long)]
    workers: Option<usize>,

    /// Override the configured number of bootstrap resamples
    #[arg(long)]
    bootstraps: Option<usize>,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = if args.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")?;

    info!("Survey tree tuner v{}", env!("CARGO_PKG_VERSION"));

    let mut config =
        PipelineConfig::load_from_file(&args.config).context("Failed to load configuration")?;

    if let Some(seed) = args.seed {
        config.seed = seed;
    }
    if let Some(workers) = args.workers {
        config.execution.workers = workers;
    }
    if let Some(bootstraps) = args.bootstraps {
        config.resampling.bootstraps = bootstraps;
    }
    config.validate().context("Invalid configuration")?;

    info!("Configuration:");
    info!("  Seed: {}", config.seed);
    info!("  Metric: {}", config.metric);
    info!("  Bootstraps: {}", config.resampling.bootstraps);
    info!("  Selection: {:?}, top {}", config.selection.rule, config.selection.top_k);

    let pipeline = Pipeline::from_config(config).context("Failed to open tuning cache")?;
    let report = pipeline.run().context("Tuning pipeline failed")?;

    for (rank, point) in report.selection.ranked.iter().enumerate() {
        info!(
            "  #{} {} mean={:.4} std_err={}",
            rank + 1,
            point.params,
            point.mean,
            point
                .std_err
                .map_or_else(|| "n/a".to_string(), |se| format!("{:.4}", se))
        );
    }

    let written = report
        .write_artifacts(&args.output)
        .context("Failed to write outputs")?;

    info!("✓ Tuning completed successfully");
    for path in written {
        info!("  {}", path.display());
    }
    info!("  Model hash: {}", report.final_fit.diagnostics.model_hash);

    Ok(())
}
