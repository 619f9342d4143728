// src/main.rs
use std::path::Path;

use anyhow::{Context, Result};
use clap::Parser;
use log::{error, info};

use raster_change::cli::{Cli, Commands};
use raster_change::config::AnalysisConfig;
use raster_change::io::{CatalogSource, DirectorySink};
use raster_change::processing::{Pipeline, Schedule};

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    match &cli.command {
        Commands::Run {
            config,
            catalog,
            output,
            sequential,
            threads,
        } => {
            let threads = threads.unwrap_or_else(num_cpus::get);
            rayon::ThreadPoolBuilder::new()
                .num_threads(threads)
                .build_global()
                .context("Failed to size the worker pool")?;

            let schedule = if *sequential {
                Schedule::Sequential
            } else {
                Schedule::Concurrent
            };
            let failed = run(config, catalog, output, schedule)?;
            if failed > 0 {
                anyhow::bail!("{} run(s) failed", failed);
            }
        }
        Commands::InitConfig { output } => {
            AnalysisConfig::default().save(output)?;
            println!("Wrote default configuration to {}", output.display());
        }
    }

    Ok(())
}

/// Execute every configured run; returns the number of failed runs.
fn run(config_path: &Path, catalog_path: &Path, output: &Path, schedule: Schedule) -> Result<usize> {
    let config = AnalysisConfig::load(config_path)?;
    let source = CatalogSource::open(catalog_path)
        .with_context(|| format!("Failed to open catalog {}", catalog_path.display()))?;
    let sink = DirectorySink::new(output);

    let windows = config.windows()?;
    let specs = config.run_specs()?;
    info!(
        "Event {}: pre {} / post {}, {} runs, cloud cover below {}%",
        windows.event,
        windows.pre,
        windows.post,
        specs.len(),
        config.cloud_ceiling
    );

    let pipeline = Pipeline::new(&source, &sink, windows, config.cloud_ceiling)
        .with_export(config.export.clone());
    let reports = pipeline.run_all(&specs, schedule);

    let mut failed = 0;
    for report in &reports {
        match &report.outcome {
            Ok(output) => {
                println!("{}: {} artifacts", report.run, output.stored.len());
                for stored in &output.stored {
                    println!("  {} -> {}", stored.name, stored.location);
                }
            }
            Err(failure) => {
                failed += 1;
                error!("{}: failed at {} stage: {}", report.run, failure.stage, failure.error);
                println!("{}: FAILED at {} stage: {}", report.run, failure.stage, failure.error);
                for stored in &failure.orphaned {
                    println!("  left behind: {} -> {}", stored.name, stored.location);
                }
            }
        }
    }
    Ok(failed)
}
