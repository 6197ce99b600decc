// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! # Cadence CLI
//!
//! The `cadence` binary runs the core algorithms offline over JSON files.
//!
//! ## Commands
//!
//! - `cadence aggregate <NOTES>` - Multi-scale aggregation of a note stream
//! - `cadence window <NOTES>` - Adaptive window recommendation
//! - `cadence calibrate <SAMPLES>` - Agreement statistics for labelled scores
//! - `cadence config show|validate|generate` - Configuration management

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;

use cadence_cli::commands::{self, AggregateArgs, CalibrateArgs, ConfigCommand, WindowArgs};

/// Cadence - temporal bookkeeping for automated judgments
#[derive(Parser)]
#[command(name = "cadence")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file (overrides discovery)
    #[arg(
        short,
        long,
        global = true,
        env = "CADENCE_CONFIG_PATH",
        value_name = "FILE"
    )]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, env = "CADENCE_LOG_LEVEL", default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Aggregate a note stream across time scales
    #[command(name = "aggregate")]
    Aggregate(AggregateArgs),

    /// Recommend a window size for a note stream
    #[command(name = "window")]
    Window(WindowArgs),

    /// Compute agreement between automated and human scores
    #[command(name = "calibrate")]
    Calibrate(CalibrateArgs),

    /// Configuration management
    #[command(name = "config")]
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(&cli.log_level)?;

    match cli.command {
        Some(Commands::Aggregate(args)) => commands::notes::aggregate(args, cli.config).await,
        Some(Commands::Window(args)) => commands::notes::window(args, cli.config).await,
        Some(Commands::Calibrate(args)) => commands::calibrate::execute(args, cli.config).await,
        Some(Commands::Config { command }) => {
            commands::config::handle_command(command, cli.config).await
        }
        None => {
            eprintln!("{}", "No command specified. Use --help for usage.".yellow());
            std::process::exit(1);
        }
    }
}

/// Initialize tracing subscriber for logging
fn init_logging(level: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(level))
        .context("Failed to create log filter")?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .init();

    Ok(())
}
