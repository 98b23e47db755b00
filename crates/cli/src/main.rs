//! uiverify CLI - Main Entry Point
//!
//! Loads scenario files, runs them against Chromium and reports
//! one row per scenario.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::{Parser, Subcommand};
use uiverify::VerifyConfig;

mod commands;
mod output;

use commands::{check, run};

/// uiverify - Scripted UI verification
#[derive(Parser)]
#[command(name = "uiverify")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Configuration file
    #[arg(long, default_value = "uiverify.toml", env = "UIVERIFY_CONFIG", global = true)]
    config: PathBuf,

    /// Output format
    #[arg(long, default_value = "table", global = true)]
    format: output::OutputFormat,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run scenarios against a browser
    Run(run::RunArgs),

    /// Load and validate scenarios without a browser
    Check(check::CheckArgs),
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match dispatch(cli).await {
        Ok(code) => code,
        Err(e) => {
            output::print_error(&format!("{:#}", e));
            ExitCode::from(2)
        }
    }
}

async fn dispatch(cli: Cli) -> anyhow::Result<ExitCode> {
    let mut config = VerifyConfig::load(&cli.config)
        .with_context(|| format!("failed to load {}", cli.config.display()))?;
    config.apply_env();

    match cli.command {
        Commands::Run(args) => run::execute(args, config, cli.format).await,
        Commands::Check(args) => {
            config.validate()?;
            check::execute(args, &config, cli.format)?;
            Ok(ExitCode::SUCCESS)
        }
    }
}
