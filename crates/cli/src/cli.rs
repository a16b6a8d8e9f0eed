use std::path::PathBuf;

use clap::{Parser, Subcommand};
use scanreports_core::{Config, ScanSelection};

#[derive(Debug, Parser)]
#[command(
    name = "scanreports",
    version,
    about = "Bulk generation and retrieval of vulnerability scan reports"
)]
pub struct Cli {
    /// Configuration file
    #[arg(
        long,
        short,
        env = "SCANREPORTS_CONFIG",
        default_value = "config.toml",
        global = true
    )]
    pub config: PathBuf,

    /// Keep going below the critical request quota without asking
    #[arg(long, short = 'y', global = true)]
    pub yes: bool,

    /// Debug logging (RUST_LOG still takes precedence)
    #[arg(long, short, global = true)]
    pub verbose: bool,

    /// Print Prometheus metrics after the command
    #[arg(long, global = true)]
    pub print_metrics: bool,

    /// Directory for downloaded reports, overriding the configured one
    #[arg(long, short, value_name = "DIR", global = true)]
    pub output_folder: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    /// Apply command-line overrides on top of the loaded configuration.
    pub fn apply_overrides(&self, config: &mut Config) {
        if let Some(dir) = &self.output_folder {
            config.reports.download_path = dir.clone();
        }
    }
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Generate scan-based reports: every configured scan template for every scan
    Scans {
        /// Scan to report on, as REF=TITLE (repeatable)
        #[arg(long = "scan", value_name = "REF=TITLE", required = true)]
        scans: Vec<ScanSelection>,
    },
    /// Generate host-based reports from the configured host templates
    Templates {
        /// Template id to generate (repeatable, default: all)
        #[arg(long = "template", value_name = "ID")]
        templates: Vec<String>,
    },
    /// Show request quota, running reports and free slots
    Status,
    /// Wait until enough report slots are free
    WaitSlots {
        #[arg(long, default_value_t = 1)]
        required: usize,
    },
    /// Show stored report counts by status and recent runs
    Stats {
        /// Number of recent runs to show
        #[arg(long, default_value_t = 10)]
        runs: usize,
    },
    /// Print the effective configuration with secrets redacted
    ShowConfig,
}
