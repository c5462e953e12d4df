//! Airlift CLI - Main entry point

use airlift_cli::{Cli, Commands};
use airlift_common::logging::{init_logging, LogConfig, LogLevel, LogOutput};
use clap::Parser;
use std::process;
use tracing::error;

#[tokio::main]
async fn main() {
    // Parse command-line arguments
    let cli = Cli::parse();

    // Handle markdown help generation
    if cli.markdown_help {
        println!("{}", clap_markdown::help_markdown::<Cli>());
        return;
    }

    // Ensure a command is provided
    if cli.command.is_none() {
        eprintln!("Error: A subcommand is required");
        eprintln!();
        eprintln!("For more information, try '--help'.");
        process::exit(2);
    }

    // Initialize logging based on verbose flag and environment
    let log_config = if cli.verbose {
        // Verbose mode: log to console with debug level
        LogConfig::builder()
            .level(LogLevel::Debug)
            .output(LogOutput::Console)
            .log_file_prefix("airlift".to_string())
            .build()
    } else {
        // Normal mode: only warnings and errors to console
        LogConfig::builder()
            .level(LogLevel::Warn)
            .output(LogOutput::Console)
            .log_file_prefix("airlift".to_string())
            .build()
    };

    // Merge with environment variables (they take precedence)
    let log_config = LogConfig::from_env().unwrap_or(log_config);

    // Initialize logging (ignore errors as CLI should work without logging)
    let _ = init_logging(&log_config);

    // Execute command
    if let Err(e) = execute_command(cli).await {
        error!(error = %e, "Command failed");
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

/// Execute the CLI command
async fn execute_command(cli: Cli) -> airlift_cli::Result<()> {
    // Command is guaranteed to exist at this point (checked in main)
    let Some(command) = cli.command else {
        unreachable!("Command should have been validated in main");
    };

    match command {
        Commands::Create {
            kind,
            source,
            slug,
            run,
        } => airlift_cli::commands::create::run(kind, source, slug, run).await,

        Commands::Run { entity } => airlift_cli::commands::run::run(entity).await,

        Commands::Status { entity, json } => {
            airlift_cli::commands::status::run(entity, json).await
        }

        Commands::Abort { entity } => airlift_cli::commands::abort::run(entity).await,

        Commands::Delete { entity, yes } => {
            airlift_cli::commands::delete::run(entity, yes).await
        }
    }
}
