use clap::Parser;
use std::path::PathBuf;

#[derive(Debug, Clone, Parser)]
#[command(name = "quote-batch")]
#[command(about = "Scheduled opt-in expiry and retention clean-up for quote records")]
pub struct CliArgs {
    /// Path to TOML configuration file
    #[arg(short, long, default_value = "quote-batch.toml")]
    pub config: PathBuf,

    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,

    /// Override monitoring setting from config
    #[arg(long)]
    pub monitor: Option<bool>,

    /// Run the job once and exit instead of starting the scheduler
    #[arg(long)]
    pub run_once: bool,

    /// Dry run - show the configuration and cutoffs without touching the database
    #[arg(long)]
    pub dry_run: bool,
}
