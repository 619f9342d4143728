// src/cli.rs
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "raster-change")]
#[command(version, about = "Bitemporal burn severity and vegetation loss mapping")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Composite, difference, clip and export every configured run
    Run {
        /// Analysis configuration (JSON)
        #[arg(short, long)]
        config: PathBuf,

        /// Scene catalog (JSON) listing band files per acquisition
        #[arg(long)]
        catalog: PathBuf,

        /// Root directory for exported artifacts
        #[arg(short, long, default_value = "output")]
        output: PathBuf,

        /// Run one region after the other instead of concurrently
        #[arg(long)]
        sequential: bool,

        /// Worker threads for per-pixel work (default: all cores)
        #[arg(short = 'j', long)]
        threads: Option<usize>,
    },

    /// Write the default Los Angeles configuration
    InitConfig {
        /// Destination file
        #[arg(short, long, default_value = "analysis.json")]
        output: PathBuf,
    },
}
