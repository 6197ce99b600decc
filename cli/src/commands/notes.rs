// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Note stream commands
//!
//! Commands: aggregate, window

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use std::path::{Path, PathBuf};

use cadence_core::domain::aggregation::{AggregationOptions, MultiScaleAggregator};
use cadence_core::domain::config::CadenceConfig;
use cadence_core::domain::temporal::{CoherenceStatus, ScaleDigest, TemporalNote};
use cadence_core::domain::window_selector::AdaptiveWindowSelector;

use super::{format_optional, print_json, read_json_array};

#[derive(Args)]
pub struct AggregateArgs {
    /// JSON file holding an array of temporal notes
    #[arg(value_name = "NOTES")]
    pub file: PathBuf,

    /// Aggregate at a single window of this many milliseconds
    #[arg(long, value_name = "MS", conflicts_with = "adaptive")]
    pub window_ms: Option<u64>,

    /// Aggregate at the window recommended for this stream
    #[arg(long)]
    pub adaptive: bool,

    /// Print the full result as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args)]
pub struct WindowArgs {
    /// JSON file holding an array of temporal notes
    #[arg(value_name = "NOTES")]
    pub file: PathBuf,

    /// Print the recommendation as JSON
    #[arg(long)]
    pub json: bool,
}

/// Load and validate every note in `path`
pub fn load_notes(path: &Path) -> Result<Vec<TemporalNote>> {
    read_json_array(path)?
        .into_iter()
        .enumerate()
        .map(|(i, value)| {
            TemporalNote::from_json(value).with_context(|| format!("Invalid note at index {}", i))
        })
        .collect()
}

pub async fn aggregate(args: AggregateArgs, config_override: Option<PathBuf>) -> Result<()> {
    let config = CadenceConfig::load_or_default(config_override)
        .context("Failed to load configuration")?;
    let notes = load_notes(&args.file)?;
    let aggregator = MultiScaleAggregator::new(config.aggregation.clone());

    if args.adaptive || args.window_ms.is_some() {
        let selector = AdaptiveWindowSelector::new(config.windowing.clone());
        let result = aggregator.aggregate_temporal_notes(&notes, args.window_ms, &selector)?;
        if args.json {
            return print_json(&result);
        }
        print_digests(&[result.digest()]);
        return Ok(());
    }

    let result = aggregator.aggregate(&notes, &AggregationOptions { require_data: true })?;
    if args.json {
        return print_json(&result);
    }

    println!(
        "{}",
        format!("Aggregated {} notes across {} scales", notes.len(), result.scales.len()).bold()
    );
    println!();
    let mut digests = result.digests();
    digests.sort_by_key(|d| {
        result
            .get(&d.scale)
            .map(|s| s.window_ms)
            .unwrap_or(u64::MAX)
    });
    print_digests(&digests);
    Ok(())
}

pub async fn window(args: WindowArgs, config_override: Option<PathBuf>) -> Result<()> {
    let config = CadenceConfig::load_or_default(config_override)
        .context("Failed to load configuration")?;
    let notes = load_notes(&args.file)?;
    let recommendation =
        AdaptiveWindowSelector::new(config.windowing).calculate_optimal_window_size(&notes);

    if args.json {
        return print_json(&recommendation);
    }

    let stats = &recommendation.statistics;
    println!("{}", "Window recommendation:".bold());
    println!("  Pattern: {:?}", recommendation.pattern);
    println!("  Window: {} ms", recommendation.window_size_ms.to_string().green());
    println!();
    println!("{}", "Stream statistics:".bold());
    println!("  Notes: {}", stats.note_count);
    println!("  Mean interval: {:.1} ms", stats.mean_interval_ms);
    println!("  Interval CV: {:.3}", stats.interval_cv);
    println!("  Score volatility: {:.3}", stats.score_volatility);
    println!("  Sign flip ratio: {:.3}", stats.sign_flip_ratio);
    Ok(())
}

fn print_digests(digests: &[ScaleDigest]) {
    for digest in digests {
        let coherence = match digest.status {
            CoherenceStatus::Undefined => "undefined".dimmed().to_string(),
            CoherenceStatus::SingleWindow => format!("{:.3} (single window)", digest.coherence),
            CoherenceStatus::Complete => format!("{:.3}", digest.coherence),
        };
        println!("{}", digest.scale.bold());
        println!("  Windows: {} ({} notes)", digest.window_count, digest.note_count);
        println!(
            "  Scores: first {}, last {}, mean {}",
            format_optional(digest.first_score),
            format_optional(digest.last_score),
            format_optional(digest.mean_score)
        );
        println!("  Net change: {}", format_optional(digest.net_change));
        println!("  Coherence: {}", coherence);
    }
}
