//! Command-line interface definition

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::sync::OnceLock;

use crate::application::RunMode;

/// Version text with build metadata embedded by the build script
fn long_version() -> &'static str {
    static VERSION: OnceLock<String> = OnceLock::new();
    VERSION.get_or_init(|| {
        format!(
            "{}\nbuilt: {}\ncommit: {}",
            env!("CARGO_PKG_VERSION"),
            option_env!("VERGEN_BUILD_DATE").unwrap_or("unknown"),
            option_env!("VERGEN_GIT_SHA").unwrap_or("unknown")
        )
    })
}

/// Keep catalog repository metadata in sync with GitHub and GitLab
#[derive(Debug, Parser)]
#[command(name = "catalog-pulse", version, long_version = long_version())]
pub struct Cli {
    /// Log level filter (overridden by RUST_LOG)
    #[arg(long, global = true, env = "CATALOG_PULSE_LOG_LEVEL")]
    pub log_level: Option<String>,

    /// Log format: json, pretty or default
    #[arg(long, global = true)]
    pub log_format: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Refresh metadata for every catalog entry from its forge
    Sync(SyncArgs),
    /// Show the maintenance status of catalog entries
    Status(StatusArgs),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ModeArg {
    /// One fetch per distinct repository
    Refresh,
    /// One fetch per entry
    PerEntry,
}

impl From<ModeArg> for RunMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Refresh => RunMode::Refresh,
            ModeArg::PerEntry => RunMode::PerEntry,
        }
    }
}

#[derive(Debug, Args)]
pub struct SyncArgs {
    /// Process only the first N repositories
    #[arg(value_name = "LIMIT")]
    pub limit: Option<usize>,

    /// Catalog directory containing entry JSON files
    #[arg(short = 'd', long)]
    pub catalog_dir: Option<PathBuf>,

    /// Maximum concurrent upstream requests
    #[arg(short = 'p', long = "parallel")]
    pub parallelism: Option<usize>,

    /// Rate-limited responses tolerated before stopping
    #[arg(long)]
    pub breaker_threshold: Option<u32>,

    #[arg(short, long, value_enum)]
    pub mode: Option<ModeArg>,

    /// Fetch and compute changes without writing entry files
    #[arg(long)]
    pub dry_run: bool,

    /// Markdown report destination
    #[arg(short, long)]
    pub report: Option<PathBuf>,

    /// Print the run report as JSON on stdout
    #[arg(long)]
    pub json: bool,

    /// Hide the progress bar
    #[arg(short, long)]
    pub quiet: bool,
}

#[derive(Debug, Args)]
pub struct StatusArgs {
    /// Entry files to inspect
    #[arg(value_name = "ENTRY", required_unless_present = "all")]
    pub entries: Vec<PathBuf>,

    /// Inspect every entry in the catalog directory
    #[arg(short, long, conflicts_with = "entries")]
    pub all: bool,

    /// Catalog directory used with --all
    #[arg(short = 'd', long)]
    pub catalog_dir: Option<PathBuf>,

    /// Print status views as JSON
    #[arg(long)]
    pub json: bool,
}
