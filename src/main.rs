use clap::Parser;
use std::process;
use tokio_util::sync::CancellationToken;
use water_processor::cli::{self, Args};

fn main() {
    // Parse command line arguments
    let args = Args::parse();

    // If no subcommand was provided, show help and available commands
    if args.command.is_none() {
        show_help_and_commands();
        process::exit(0);
    }

    // Create async runtime and run the main command logic with signal handling
    let runtime = tokio::runtime::Runtime::new().unwrap_or_else(|e| {
        eprintln!("Failed to create async runtime: {}", e);
        process::exit(1);
    });

    let result = runtime.block_on(async {
        // Create cancellation token for coordinating graceful shutdown
        let cancellation_token = CancellationToken::new();

        // Set up graceful shutdown handling
        let shutdown_signal = async {
            tokio::signal::ctrl_c()
                .await
                .expect("Failed to install CTRL+C signal handler");

            // Cancel all operations when Ctrl+C is received
            cancellation_token.cancel();
        };

        // Run the main command with cancellation support
        tokio::select! {
            result = cli::run(args, cancellation_token.clone()) => {
                result
            }
            _ = shutdown_signal => {
                eprintln!("\nReceived CTRL+C, shutting down gracefully...");
                Err(water_processor::PipelineError::interrupted(
                    "Processing interrupted by user",
                ))
            }
        }
    });

    match result {
        Ok(_stats) => {
            // Success - stats have already been reported by the pipeline
            process::exit(0);
        }
        Err(error) => {
            // Error occurred - print to stderr and exit with error code
            eprintln!("Error: {:#}", error);
            process::exit(1);
        }
    }
}

/// Show help information and available commands when no subcommand is provided
fn show_help_and_commands() {
    println!("Water Processor - Train Water-System Recording Analyser");
    println!("=======================================================");
    println!();
    println!("Validate, merge and analyse on-board water-system Parquet recordings");
    println!("and publish water consumption indicator tables.");
    println!();
    println!("USAGE:");
    println!("    water-processor <COMMAND> [OPTIONS]");
    println!();
    println!("COMMANDS:");
    println!("    process     Run the full batch: validate, merge, analyse, publish");
    println!("    validate    Validate recording units and write the exclusion ledger");
    println!("    help        Show this help message or help for specific commands");
    println!();
    println!("OPTIONS:");
    println!("    -h, --help       Show help information");
    println!("    -V, --version    Show version information");
    println!();
    println!("EXAMPLES:");
    println!("    # Process a batch of recordings:");
    println!("    water-processor process --source /data/Source");
    println!();
    println!("    # Custom destinations and concurrency:");
    println!("    water-processor process --source /data/Source --output /data/tables -j 4");
    println!();
    println!("    # Validation only (writes the exclusion ledger):");
    println!("    water-processor validate --source /data/Source");
    println!();
    println!("For detailed help on any command, use:");
    println!("    water-processor <COMMAND> --help");
}
