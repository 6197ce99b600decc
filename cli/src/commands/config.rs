// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Configuration management commands
//!
//! Commands: show, validate, generate

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use std::path::PathBuf;

use cadence_core::domain::config::CadenceConfig;

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show {
        /// Show config file paths checked
        #[arg(long)]
        paths: bool,
    },

    /// Validate configuration file
    Validate {
        /// Path to config file (default: discover)
        #[arg(value_name = "FILE")]
        file: Option<PathBuf>,
    },

    /// Generate sample configuration
    Generate {
        /// Output path (default: ./cadence-config.yaml)
        #[arg(short, long, default_value = "./cadence-config.yaml")]
        output: PathBuf,
    },
}

pub async fn handle_command(
    command: ConfigCommand,
    config_override: Option<PathBuf>,
) -> Result<()> {
    match command {
        ConfigCommand::Show { paths } => show(config_override, paths).await,
        ConfigCommand::Validate { file } => validate(file.or(config_override)).await,
        ConfigCommand::Generate { output } => generate(output).await,
    }
}

async fn show(config_override: Option<PathBuf>, show_paths: bool) -> Result<()> {
    let config = CadenceConfig::load_or_default(config_override.clone())
        .context("Failed to load configuration")?;

    if show_paths {
        println!("{}", "Configuration discovery paths:".bold());
        if let Some(path) = &config_override {
            println!("  1. --config flag: {}", path.display());
        } else {
            println!("  1. --config flag: {}", "(not set)".dimmed());
        }
        println!(
            "  2. CADENCE_CONFIG_PATH: {}",
            std::env::var("CADENCE_CONFIG_PATH")
                .unwrap_or_else(|_| "(not set)".to_string())
                .dimmed()
        );
        println!("  3. ./cadence-config.yaml");
        println!("  4. ~/.cadence/config.yaml");
        println!("  5. /etc/cadence/config.yaml");
        println!();
    }

    println!("{}", "Current configuration:".bold());
    println!();

    println!("{}", "Context:".bold());
    println!("  Max history: {}", config.context.max_history);
    println!("  Trend tolerance: {}", config.context.trend_tolerance);
    println!();

    println!("{}", "Aggregation:".bold());
    for scale in &config.aggregation.scales {
        println!("  {} → {} ms", scale.name, scale.window_ms);
    }
    println!("  Decay factor: {}", config.aggregation.decay_factor);
    let weights = &config.aggregation.coherence_weights;
    println!(
        "  Coherence weights: direction {}, variance {}, observation {}",
        weights.direction, weights.variance, weights.observation
    );
    println!();

    println!("{}", "Scheduler:".bold());
    println!("  Mode: {:?}", config.scheduler.mode);
    println!("  Max batch size: {}", config.scheduler.max_batch_size);
    println!("  Max wait: {:?}", config.scheduler.max_wait);
    println!("  Max concurrency: {}", config.scheduler.max_concurrency);
    match config.scheduler.batch_deadline {
        Some(deadline) => println!(
            "  Batch deadline: {:?} ({} retries)",
            deadline, config.scheduler.max_batch_retries
        ),
        None => println!("  Batch deadline: {}", "(none)".dimmed()),
    }
    println!();

    println!("{}", "Calibration:".bold());
    println!("  Min samples: {}", config.calibration.min_samples);
    println!("  Min correlation: {}", config.calibration.min_correlation);
    println!("  Max MAE: {}", config.calibration.max_mae);
    println!();

    Ok(())
}

async fn validate(config_path: Option<PathBuf>) -> Result<()> {
    println!("Validating configuration...");

    let config = CadenceConfig::load_or_default(config_path)
        .context("Failed to load configuration")?;

    config
        .validate()
        .context("Configuration validation failed")?;

    println!("{}", "✓ Configuration is valid".green());

    Ok(())
}

async fn generate(output: PathBuf) -> Result<()> {
    let sample = include_str!("../../templates/cadence-config.yaml");

    std::fs::write(&output, sample)
        .with_context(|| format!("Failed to write config to {:?}", output))?;

    println!(
        "{}",
        format!("✓ Configuration generated: {}", output.display()).green()
    );

    Ok(())
}
