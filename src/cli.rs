//! Command-line interface for the water-system batch processor.
//!
//! Defines the clap argument surface, logging setup, and the glue that turns
//! parsed arguments into a configured [`crate::pipeline::BatchPipeline`].

use crate::config::PipelineConfig;
use crate::error::{PipelineError, Result};
use crate::models::BatchStats;
use crate::pipeline::{BatchPaths, BatchPipeline};
use crate::storage::ParquetStore;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// CLI arguments for the water-system recording processor
///
/// Validates, merges and analyses on-board water-system Parquet recordings
/// and publishes consumption indicator tables.
#[derive(Debug, Clone, clap::Parser)]
#[command(
    name = "water-processor",
    version,
    about = "Process train water-system recordings into consumption indicator tables",
    long_about = "Validates directories of on-board water-system Parquet recordings, merges \
                  split recordings into whole runs, detects tank events per car unit, and \
                  publishes per-run and per-day water consumption indicators."
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available subcommands
#[derive(Debug, Clone, clap::Subcommand)]
pub enum Commands {
    /// Run the full batch: validate, merge, analyse, publish
    Process(ProcessArgs),
    /// Validate recording units and write the exclusion ledger, nothing more
    Validate(ValidateArgs),
}

/// Arguments for the process command
#[derive(Debug, Clone, clap::Parser)]
pub struct ProcessArgs {
    /// Directory containing the recording-unit directories
    #[arg(
        short = 'i',
        long = "source",
        value_name = "PATH",
        help = "Source directory of recording units"
    )]
    pub source_path: PathBuf,

    /// Destination for merged runs
    ///
    /// Defaults to an `Edited` directory next to the source directory.
    #[arg(
        long = "edited",
        value_name = "PATH",
        help = "Destination directory for merged runs"
    )]
    pub edited_path: Option<PathBuf>,

    /// Output directory for the published indicator tables
    ///
    /// Defaults to a `tables` directory next to the source directory.
    #[arg(
        short = 'o',
        long = "output",
        value_name = "PATH",
        help = "Output directory for result tables"
    )]
    pub output_path: Option<PathBuf>,

    /// Exclusion ledger file
    ///
    /// Defaults to `parquet_exclusion.txt` next to the source directory.
    #[arg(
        long = "ledger",
        value_name = "FILE",
        help = "Path of the exclusion ledger file"
    )]
    pub ledger_path: Option<PathBuf>,

    /// Number of vehicles analysed concurrently
    #[arg(
        short = 'j',
        long = "workers",
        value_name = "COUNT",
        help = "Maximum vehicles analysed concurrently"
    )]
    pub workers: Option<usize>,

    /// Rolling-median window applied to gauge columns
    #[arg(
        long = "smoothing-window",
        value_name = "SAMPLES",
        help = "Rolling-median window in samples"
    )]
    pub smoothing_window: Option<usize>,

    /// Logging verbosity level
    #[arg(
        short = 'v',
        long = "verbose",
        action = clap::ArgAction::Count,
        help = "Increase logging verbosity (-v: info, -vv: debug, -vvv: trace)"
    )]
    pub verbose: u8,

    /// Suppress output except errors
    #[arg(
        short = 'q',
        long = "quiet",
        help = "Suppress output except errors",
        conflicts_with = "verbose"
    )]
    pub quiet: bool,
}

/// Arguments for the validate command
#[derive(Debug, Clone, clap::Parser)]
pub struct ValidateArgs {
    /// Directory containing the recording-unit directories
    #[arg(
        short = 'i',
        long = "source",
        value_name = "PATH",
        help = "Source directory of recording units"
    )]
    pub source_path: PathBuf,

    /// Exclusion ledger file
    #[arg(
        long = "ledger",
        value_name = "FILE",
        help = "Path of the exclusion ledger file"
    )]
    pub ledger_path: Option<PathBuf>,

    /// Logging verbosity level
    #[arg(
        short = 'v',
        long = "verbose",
        action = clap::ArgAction::Count,
        help = "Increase logging verbosity (-v: info, -vv: debug, -vvv: trace)"
    )]
    pub verbose: u8,
}

impl ProcessArgs {
    /// Validate the process command arguments for consistency
    pub fn validate(&self) -> Result<()> {
        if !self.source_path.is_dir() {
            return Err(PipelineError::configuration(format!(
                "Source path is not a directory: {}",
                self.source_path.display()
            )));
        }
        if let Some(workers) = self.workers {
            if workers == 0 {
                return Err(PipelineError::configuration(
                    "Number of workers must be greater than 0",
                ));
            }
            if workers > 100 {
                return Err(PipelineError::configuration(
                    "Number of workers cannot exceed 100",
                ));
            }
        }
        if let Some(window) = self.smoothing_window {
            if window < 2 {
                return Err(PipelineError::configuration(
                    "Smoothing window must be at least 2 samples",
                ));
            }
        }
        Ok(())
    }

    /// Determine the appropriate log level based on verbosity flags
    pub fn get_log_level(&self) -> &'static str {
        if self.quiet {
            "error"
        } else {
            match self.verbose {
                0 => "warn",
                1 => "info",
                2 => "debug",
                _ => "trace",
            }
        }
    }
}

impl ValidateArgs {
    /// Determine the appropriate log level based on verbosity flags
    pub fn get_log_level(&self) -> &'static str {
        match self.verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        }
    }
}

/// Set up structured logging
pub fn setup_logging(log_level: &str, quiet: bool) {
    use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("water_processor={}", log_level)));

    if quiet {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_level(true)
                    .with_writer(std::io::stderr)
                    .compact(),
            )
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_level(true)
                    .with_timer(fmt::time::uptime())
                    .with_writer(std::io::stderr),
            )
            .init();
    }

    debug!("Logging initialized at level: {}", log_level);
}

/// Dispatch the parsed command
pub async fn run(args: Args, token: CancellationToken) -> Result<BatchStats> {
    match args.command {
        Some(Commands::Process(args)) => run_process(args, token).await,
        Some(Commands::Validate(args)) => run_validate(args, token).await,
        None => Err(PipelineError::configuration("no command given")),
    }
}

async fn run_process(args: ProcessArgs, token: CancellationToken) -> Result<BatchStats> {
    setup_logging(args.get_log_level(), args.quiet);
    args.validate()?;

    let mut paths = BatchPaths::for_source(&args.source_path);
    if let Some(edited) = &args.edited_path {
        paths.edited_dir = edited.clone();
    }
    if let Some(ledger) = &args.ledger_path {
        paths.ledger_path = ledger.clone();
    }
    let output_dir = args.output_path.clone().unwrap_or_else(|| {
        paths
            .source_dir
            .parent()
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."))
            .join("tables")
    });

    let mut config = PipelineConfig::default();
    if let Some(workers) = args.workers {
        config = config.with_max_concurrent_vehicles(workers);
    }
    if let Some(window) = args.smoothing_window {
        config = config.with_smoothing_window(window);
    }

    let store = Arc::new(ParquetStore::new(output_dir));
    let pipeline = BatchPipeline::new(paths, config)?;
    pipeline.process(store, token).await
}

async fn run_validate(args: ValidateArgs, token: CancellationToken) -> Result<BatchStats> {
    setup_logging(args.get_log_level(), false);

    let mut paths = BatchPaths::for_source(&args.source_path);
    if let Some(ledger) = &args.ledger_path {
        paths.ledger_path = ledger.clone();
    }

    let config = PipelineConfig::default().with_validate_only();
    let store = Arc::new(ParquetStore::new(
        paths
            .source_dir
            .parent()
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."))
            .join("tables"),
    ));
    let pipeline = BatchPipeline::new(paths, config)?;
    pipeline.process(store, token).await
}
