// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Calibration report over a file of labelled scores

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use serde::Deserialize;
use std::path::{Path, PathBuf};

use cadence_core::domain::calibration::CalibrationManager;
use cadence_core::domain::config::CadenceConfig;

use super::{format_optional, print_json, read_json_array};

#[derive(Args)]
pub struct CalibrateArgs {
    /// JSON file holding an array of {automated_score, human_score, evaluator_id?}
    #[arg(value_name = "SAMPLES")]
    pub file: PathBuf,

    /// Apply the fitted correction to these automated scores
    #[arg(long, value_name = "SCORE")]
    pub correct: Vec<f64>,

    /// Print the status as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Deserialize)]
struct LabelledScore {
    automated_score: f64,
    human_score: f64,
    #[serde(default)]
    evaluator_id: Option<String>,
}

/// Build a calibration log from every labelled score in `path`
pub fn load_samples(path: &Path, manager: &CalibrationManager) -> Result<usize> {
    let items = read_json_array(path)?;
    let total = items.len();
    for (i, value) in items.into_iter().enumerate() {
        let labelled: LabelledScore = serde_json::from_value(value)
            .with_context(|| format!("Malformed sample at index {}", i))?;
        manager
            .record_sample(
                labelled.automated_score,
                labelled.human_score,
                labelled.evaluator_id,
            )
            .with_context(|| format!("Invalid sample at index {}", i))?;
    }
    Ok(total)
}

pub async fn execute(args: CalibrateArgs, config_override: Option<PathBuf>) -> Result<()> {
    let config = CadenceConfig::load_or_default(config_override)
        .context("Failed to load configuration")?;
    let manager = CalibrationManager::new(config.calibration);
    load_samples(&args.file, &manager)?;
    let status = manager.status();

    if args.json {
        return print_json(&status);
    }

    println!("{}", "Calibration status:".bold());
    println!("  Samples: {} (minimum {})", status.sample_count, status.min_samples);
    println!("  Pearson r: {}", format_optional(status.correlation));
    println!("  Cohen's kappa: {}", format_optional(status.kappa));
    println!("  MAE: {}", format_optional(status.mae));
    let verdict = if status.is_good {
        "✓ Calibrated and within thresholds".green()
    } else if status.calibrated {
        "⚠ Calibrated but outside thresholds".yellow()
    } else {
        "✗ Not enough samples".red()
    };
    println!("  {}", verdict);
    println!();

    if !status.evaluators.is_empty() {
        println!("{}", "Evaluators:".bold());
        for (evaluator, count) in &status.evaluators {
            println!("  {}: {}", evaluator, count);
        }
        println!();
    }

    if let Some(correction) = status.correction {
        println!("{}", "Correction:".bold());
        println!(
            "  human ≈ {:.3} × automated {:+.3}",
            correction.slope, correction.intercept
        );
    }
    for score in args.correct {
        let corrected = manager.correct(score)?;
        println!("  {:.2} → {:.2}", score, corrected);
    }

    Ok(())
}
