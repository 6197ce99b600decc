// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Multi-Scale Aggregation
//!
//! Partitions a note stream into fixed, non-overlapping windows at several
//! time scales and scores how coherent each scale's window sequence is.
//!
//! Each scale is computed independently from the same sorted input. Windows
//! start at the first note's timestamp; empty windows are omitted, so every
//! note lands in exactly one window per scale.
//!
//! ## Window Weighting
//! ```text
//! weight = decay_factor ^ (age / window_ms)       age relative to the newest note in the window
//!        × salience_boost                         high-salience notes only
//!        × (1 + novelty_weight × novelty)         only when enable_novelty is set
//! ```
//!
//! ## Coherence
//! Weighted sum of direction consistency, variance coherence and
//! observation-text overlap. When no note carries observation text the
//! text weight is dropped and the remaining weights are renormalized.

use chrono::{DateTime, Duration, Utc};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

use crate::domain::config::{AggregationConfig, TimeScale};
use crate::domain::error::JudgmentError;
use crate::domain::temporal::{
    CoherenceBreakdown, CoherenceStatus, MultiScaleResult, Salience, ScaleResult, TemporalNote,
    Window,
};
use crate::domain::window_selector::AdaptiveWindowSelector;

const SIGN_EPSILON: f64 = 1e-9;
const NEUTRAL_DIRECTION: f64 = 0.5;
/// Largest window whose bounds are representable as a signed millisecond offset
const MAX_WINDOW_MS: u64 = i64::MAX as u64;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AggregationOptions {
    /// Fail with `InsufficientData` instead of returning empty scales
    pub require_data: bool,
}

/// Aggregate with the default scales and weighting
pub fn aggregate(
    notes: &[TemporalNote],
    options: &AggregationOptions,
) -> Result<MultiScaleResult, JudgmentError> {
    MultiScaleAggregator::default().aggregate(notes, options)
}

#[derive(Debug, Clone, Default)]
pub struct MultiScaleAggregator {
    config: AggregationConfig,
}

impl MultiScaleAggregator {
    pub fn new(config: AggregationConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AggregationConfig {
        &self.config
    }

    pub fn aggregate(
        &self,
        notes: &[TemporalNote],
        options: &AggregationOptions,
    ) -> Result<MultiScaleResult, JudgmentError> {
        let sorted = self.prepare(notes, options)?;

        let mut result = MultiScaleResult::default();
        for scale in &self.config.scales {
            let scale_result = self.aggregate_sorted(&sorted, &scale.name, scale.window_ms)?;
            result.scales.insert(scale.name.clone(), scale_result);
        }

        metrics::counter!("cadence_notes_aggregated_total").increment(sorted.len() as u64);
        Ok(result)
    }

    /// Aggregate a single scale of the configured set by name
    pub fn aggregate_scale(
        &self,
        notes: &[TemporalNote],
        scale: &TimeScale,
    ) -> Result<ScaleResult, JudgmentError> {
        let sorted = self.prepare(notes, &AggregationOptions::default())?;
        self.aggregate_sorted(&sorted, &scale.name, scale.window_ms)
    }

    /// Single-scale aggregation.
    ///
    /// With `window_ms` unset the window comes from the selector's
    /// classification of the stream and the scale is named `adaptive`;
    /// otherwise it is named `custom`.
    pub fn aggregate_temporal_notes(
        &self,
        notes: &[TemporalNote],
        window_ms: Option<u64>,
        selector: &AdaptiveWindowSelector,
    ) -> Result<ScaleResult, JudgmentError> {
        let sorted = self.prepare(notes, &AggregationOptions::default())?;
        let (name, window_ms) = match window_ms {
            Some(ms) => ("custom", ms),
            None => (
                "adaptive",
                selector.calculate_optimal_window_size(&sorted).window_size_ms,
            ),
        };
        self.aggregate_sorted(&sorted, name, window_ms)
    }

    fn prepare(
        &self,
        notes: &[TemporalNote],
        options: &AggregationOptions,
    ) -> Result<Vec<TemporalNote>, JudgmentError> {
        self.config
            .validate_weighting()
            .map_err(|e| JudgmentError::InvalidInput(format!("aggregation config: {}", e)))?;
        for note in notes {
            note.validate()?;
        }
        if notes.is_empty() && options.require_data {
            return Err(JudgmentError::InsufficientData(
                "no temporal notes to aggregate".to_string(),
            ));
        }

        let mut sorted = notes.to_vec();
        sorted.sort_by_key(|n| n.timestamp);
        Ok(sorted)
    }

    fn aggregate_sorted(
        &self,
        sorted: &[TemporalNote],
        scale: &str,
        window_ms: u64,
    ) -> Result<ScaleResult, JudgmentError> {
        if window_ms == 0 {
            return Err(JudgmentError::InvalidInput(format!(
                "window size for scale '{}' must be greater than zero",
                scale
            )));
        }
        if window_ms > MAX_WINDOW_MS {
            return Err(JudgmentError::InvalidInput(format!(
                "window size for scale '{}' exceeds {} ms",
                scale, MAX_WINDOW_MS
            )));
        }
        let Some(first) = sorted.first() else {
            return Ok(ScaleResult::empty(scale, window_ms));
        };

        let origin = first.timestamp;
        let mut buckets: BTreeMap<u64, Vec<TemporalNote>> = BTreeMap::new();
        for note in sorted {
            let offset = (note.timestamp - origin).num_milliseconds().max(0) as u64;
            buckets.entry(offset / window_ms).or_default().push(note.clone());
        }

        let mut windows: Vec<Window> = Vec::with_capacity(buckets.len());
        for (index, members) in buckets {
            let (start_time, end_time) = window_bounds(origin, index * window_ms, window_ms)
                .ok_or_else(|| {
                    JudgmentError::InvalidInput(format!(
                        "window size {} ms for scale '{}' overflows the timestamp range",
                        window_ms, scale
                    ))
                })?;
            let previous_tokens = windows
                .last()
                .map(|w| self.tokens(&w.observation_text()));
            let avg_score = self.weighted_mean(&members, window_ms, previous_tokens.as_ref());
            windows.push(Window {
                start_time,
                end_time,
                raw_count: members.len(),
                notes: members,
                avg_score,
            });
        }

        let (breakdown, status) = if windows.len() == 1 {
            (self.single_window_breakdown(&windows[0]), CoherenceStatus::SingleWindow)
        } else {
            (self.sequence_breakdown(&windows), CoherenceStatus::Complete)
        };
        let coherence = self.combine(&breakdown);

        debug!(
            scale,
            window_ms,
            windows = windows.len(),
            coherence,
            "Aggregated temporal notes"
        );

        Ok(ScaleResult {
            scale: scale.to_string(),
            window_ms,
            windows,
            coherence,
            breakdown,
            status,
        })
    }

    fn weighted_mean(
        &self,
        members: &[TemporalNote],
        window_ms: u64,
        previous_tokens: Option<&BTreeSet<String>>,
    ) -> f64 {
        let newest = members.iter().map(|n| n.timestamp).max().unwrap_or(members[0].timestamp);

        let mut weighted = 0.0;
        let mut total = 0.0;
        for note in members {
            let age_ms = (newest - note.timestamp).num_milliseconds().max(0) as f64;
            let mut weight = self.config.decay_factor.powf(age_ms / window_ms as f64);

            if note.salience == Salience::High {
                weight *= self.config.salience_boost;
            }
            if self.config.enable_novelty {
                if let (Some(previous), Some(text)) = (previous_tokens, note.observation.as_deref()) {
                    weight *= 1.0 + self.config.novelty_weight * self.novelty(text, previous);
                }
            }

            weighted += weight * note.score;
            total += weight;
        }

        if total > 0.0 {
            weighted / total
        } else {
            members.iter().map(|n| n.score).sum::<f64>() / members.len() as f64
        }
    }

    /// Share of a note's tokens not present in the previous window
    fn novelty(&self, text: &str, previous: &BTreeSet<String>) -> f64 {
        let tokens = self.tokens(text);
        if tokens.is_empty() {
            return 0.0;
        }
        let seen = tokens.iter().filter(|t| previous.contains(*t)).count();
        1.0 - seen as f64 / tokens.len() as f64
    }

    fn sequence_breakdown(&self, windows: &[Window]) -> CoherenceBreakdown {
        let scores: Vec<f64> = windows.iter().map(|w| w.avg_score).collect();
        let texts: Vec<String> = windows.iter().map(Window::observation_text).collect();
        CoherenceBreakdown {
            direction: direction_consistency(&scores),
            variance: self.variance_coherence(&scores),
            observation: self.text_overlap(&texts),
        }
    }

    fn single_window_breakdown(&self, window: &Window) -> CoherenceBreakdown {
        let scores: Vec<f64> = window.notes.iter().map(|n| n.score).collect();
        let texts: Vec<String> = window
            .notes
            .iter()
            .map(|n| n.observation.clone().unwrap_or_default())
            .collect();
        CoherenceBreakdown {
            direction: NEUTRAL_DIRECTION,
            variance: self.variance_coherence(&scores),
            observation: self.text_overlap(&texts),
        }
    }

    fn variance_coherence(&self, scores: &[f64]) -> f64 {
        if scores.len() < 2 {
            return 1.0;
        }
        let mean = scores.iter().sum::<f64>() / scores.len() as f64;
        let variance = scores.iter().map(|s| (s - mean).powi(2)).sum::<f64>() / scores.len() as f64;
        1.0 - (variance / self.config.variance_normalizer).min(1.0)
    }

    /// Mean Jaccard overlap of consecutive texts; `None` when no text exists
    fn text_overlap(&self, texts: &[String]) -> Option<f64> {
        let token_sets: Vec<BTreeSet<String>> = texts.iter().map(|t| self.tokens(t)).collect();
        let overlaps: Vec<f64> = token_sets
            .windows(2)
            .filter_map(|pair| jaccard(&pair[0], &pair[1]))
            .collect();
        if overlaps.is_empty() {
            None
        } else {
            Some(overlaps.iter().sum::<f64>() / overlaps.len() as f64)
        }
    }

    fn combine(&self, breakdown: &CoherenceBreakdown) -> f64 {
        let w = &self.config.coherence_weights;
        let (mut sum, mut weight) = (
            w.direction * breakdown.direction + w.variance * breakdown.variance,
            w.direction + w.variance,
        );
        if let Some(observation) = breakdown.observation {
            sum += w.observation * observation;
            weight += w.observation;
        }
        if weight <= 0.0 {
            return 0.0;
        }
        (sum / weight).clamp(0.0, 1.0)
    }

    fn tokens(&self, text: &str) -> BTreeSet<String> {
        text.to_lowercase()
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| t.chars().count() >= self.config.min_token_len)
            .map(str::to_string)
            .collect()
    }
}

fn window_bounds(
    origin: DateTime<Utc>,
    offset_ms: u64,
    window_ms: u64,
) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
    let millis = |ms: u64| Duration::try_milliseconds(i64::try_from(ms).ok()?);
    let start = origin.checked_add_signed(millis(offset_ms)?)?;
    let end = start.checked_add_signed(millis(window_ms)?)?;
    Some((start, end))
}

fn sign(delta: f64) -> i8 {
    if delta > SIGN_EPSILON {
        1
    } else if delta < -SIGN_EPSILON {
        -1
    } else {
        0
    }
}

/// Fraction of consecutive score-change pairs that share a sign
fn direction_consistency(scores: &[f64]) -> f64 {
    let signs: Vec<i8> = scores.windows(2).map(|pair| sign(pair[1] - pair[0])).collect();
    match signs.len() {
        0 => NEUTRAL_DIRECTION,
        1 => 1.0,
        n => {
            let agreeing = signs.windows(2).filter(|pair| pair[0] == pair[1]).count();
            agreeing as f64 / (n - 1) as f64
        }
    }
}

fn jaccard(a: &BTreeSet<String>, b: &BTreeSet<String>) -> Option<f64> {
    if a.is_empty() && b.is_empty() {
        return None;
    }
    let intersection = a.intersection(b).count();
    let union = a.union(b).count();
    Some(intersection as f64 / union as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::temporal::COHERENCE_UNDEFINED;
    use crate::domain::config::CoherenceWeights;

    fn base() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-03-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn note(ms: i64, score: f64) -> TemporalNote {
        TemporalNote::new(base() + Duration::milliseconds(ms), ms as u64, score).unwrap()
    }

    fn single_scale(window_ms: u64) -> MultiScaleAggregator {
        MultiScaleAggregator::new(AggregationConfig {
            scales: vec![TimeScale::new("test", window_ms)],
            ..Default::default()
        })
    }

    // ── Partitioning ──

    #[test]
    fn test_every_note_lands_in_exactly_one_window() {
        let notes: Vec<TemporalNote> = [0, 40, 90, 150, 1_200, 1_250, 9_999, 10_000, 75_000]
            .iter()
            .map(|ms| note(*ms, 5.0))
            .collect();

        let result = aggregate(&notes, &AggregationOptions::default()).unwrap();
        assert_eq!(result.scales.len(), 4);
        for scale in result.scales.values() {
            assert_eq!(scale.note_count(), notes.len(), "scale {}", scale.scale);
            for window in &scale.windows {
                assert!(!window.notes.is_empty());
                for n in &window.notes {
                    assert!(n.timestamp >= window.start_time && n.timestamp < window.end_time);
                }
            }
        }
        assert_eq!(result.get("short").unwrap().windows.len(), 5);
        assert_eq!(result.get("long").unwrap().windows.len(), 2);
    }

    #[test]
    fn test_unsorted_input_is_sorted_before_partitioning() {
        let notes = vec![note(2_500, 9.0), note(0, 1.0), note(1_100, 5.0)];
        let scale = single_scale(1_000)
            .aggregate(&notes, &AggregationOptions::default())
            .unwrap()
            .scales
            .remove("test")
            .unwrap();

        let averages: Vec<f64> = scale.windows.iter().map(|w| w.avg_score).collect();
        assert_eq!(averages, vec![1.0, 5.0, 9.0]);
        assert_eq!(scale.windows[0].start_time, base());
    }

    // ── Edge cases ──

    #[test]
    fn test_empty_input_is_undefined_not_perfect() {
        let result = aggregate(&[], &AggregationOptions::default()).unwrap();
        for scale in result.scales.values() {
            assert!(scale.is_empty());
            assert_eq!(scale.coherence, COHERENCE_UNDEFINED);
            assert_eq!(scale.status, CoherenceStatus::Undefined);
        }
    }

    #[test]
    fn test_require_data_rejects_empty_input() {
        let err = aggregate(&[], &AggregationOptions { require_data: true }).unwrap_err();
        assert!(matches!(err, JudgmentError::InsufficientData(_)));
    }

    #[test]
    fn test_invalid_note_is_rejected() {
        let mut bad = note(0, 5.0);
        bad.score = 11.0;
        let err = aggregate(&[note(0, 5.0), bad], &AggregationOptions::default()).unwrap_err();
        assert!(matches!(err, JudgmentError::InvalidInput(_)));
    }

    #[test]
    fn test_single_window_uses_intra_window_metrics() {
        let notes = vec![
            note(0, 4.0).with_observation("button label unreadable"),
            note(100, 6.0).with_observation("button label still unreadable"),
        ];
        let scale = single_scale(10_000)
            .aggregate(&notes, &AggregationOptions::default())
            .unwrap()
            .scales
            .remove("test")
            .unwrap();

        assert_eq!(scale.status, CoherenceStatus::SingleWindow);
        assert_eq!(scale.breakdown.direction, 0.5);
        assert!((scale.breakdown.variance - (1.0 - 1.0 / 25.0)).abs() < 1e-9);
        assert!((scale.breakdown.observation.unwrap() - 0.75).abs() < 1e-9);
        assert!(scale.coherence > 0.0 && scale.coherence <= 1.0);
    }

    // ── Weighting ──

    #[test]
    fn test_recent_notes_weigh_more() {
        let notes = vec![note(0, 2.0), note(500, 8.0)];
        let avg = single_scale(1_000)
            .aggregate(&notes, &AggregationOptions::default())
            .unwrap()
            .scales["test"]
            .windows[0]
            .avg_score;
        assert!(avg > 5.0 && avg < 8.0);
    }

    #[test]
    fn test_salience_boost_shifts_average() {
        let notes = vec![note(0, 2.0).with_salience(Salience::High), note(500, 8.0)];
        let avg = single_scale(1_000)
            .aggregate(&notes, &AggregationOptions::default())
            .unwrap()
            .scales["test"]
            .windows[0]
            .avg_score;
        assert!(avg < 5.0);
    }

    #[test]
    fn test_novelty_boost_favours_new_observations() {
        let aggregator = MultiScaleAggregator::new(AggregationConfig {
            scales: vec![TimeScale::new("test", 1_000)],
            enable_novelty: true,
            decay_factor: 1.0,
            ..Default::default()
        });
        let notes = vec![
            note(0, 5.0).with_observation("checkout form loads"),
            note(1_000, 3.0).with_observation("checkout form loads"),
            note(1_100, 9.0).with_observation("payment modal crashed"),
        ];
        let scale = aggregator
            .aggregate(&notes, &AggregationOptions::default())
            .unwrap()
            .scales
            .remove("test")
            .unwrap();
        assert!(scale.windows[1].avg_score > 6.0);
    }

    // ── Coherence ──

    #[test]
    fn test_strict_alternation_has_low_direction_consistency() {
        let notes = vec![note(0, 2.0), note(1_000, 8.0), note(2_000, 2.0), note(3_000, 8.0)];
        let scale = single_scale(1_000)
            .aggregate(&notes, &AggregationOptions::default())
            .unwrap()
            .scales
            .remove("test")
            .unwrap();

        assert_eq!(scale.status, CoherenceStatus::Complete);
        assert!(scale.breakdown.direction < 0.5);
        assert!(scale.coherence < 0.5);
        assert_eq!(scale.breakdown.observation, None);
    }

    #[test]
    fn test_monotone_run_is_fully_directional() {
        let notes = vec![note(0, 1.0), note(1_000, 2.0), note(2_000, 3.0), note(3_000, 4.0)];
        let scale = single_scale(1_000)
            .aggregate(&notes, &AggregationOptions::default())
            .unwrap()
            .scales
            .remove("test")
            .unwrap();
        assert_eq!(scale.breakdown.direction, 1.0);
    }

    #[test]
    fn test_direction_consistency_edge_counts() {
        assert_eq!(direction_consistency(&[5.0]), 0.5);
        assert_eq!(direction_consistency(&[5.0, 3.0]), 1.0);
        assert_eq!(direction_consistency(&[5.0, 5.0, 5.0]), 1.0);
        assert_eq!(direction_consistency(&[5.0, 5.0, 6.0]), 0.0);
    }

    #[test]
    fn test_missing_text_renormalizes_weights() {
        let aggregator = single_scale(1_000);
        let breakdown = CoherenceBreakdown {
            direction: 1.0,
            variance: 1.0,
            observation: None,
        };
        assert!((aggregator.combine(&breakdown) - 1.0).abs() < 1e-12);

        let breakdown = CoherenceBreakdown {
            direction: 1.0,
            variance: 1.0,
            observation: Some(0.0),
        };
        assert!((aggregator.combine(&breakdown) - 0.7).abs() < 1e-12);
    }

    #[test]
    fn test_coherence_always_in_unit_interval() {
        let streams: Vec<Vec<TemporalNote>> = vec![
            vec![],
            vec![note(0, 0.0)],
            vec![note(0, 0.0), note(1_000, 10.0), note(2_000, 0.0), note(3_000, 10.0)],
            vec![note(0, 10.0).with_observation("a b c"), note(5_000, 10.0)],
        ];
        for notes in streams {
            let result = aggregate(&notes, &AggregationOptions::default()).unwrap();
            for scale in result.scales.values() {
                assert!((0.0..=1.0).contains(&scale.coherence), "{:?}", scale);
            }
        }
    }

    // ── Single-scale aggregation ──

    #[test]
    fn test_adaptive_single_scale_uses_selector() {
        let notes: Vec<TemporalNote> = (0..20).map(|i| note(i * 200, 7.0)).collect();
        let scale = MultiScaleAggregator::default()
            .aggregate_temporal_notes(&notes, None, &AdaptiveWindowSelector::default())
            .unwrap();
        assert_eq!(scale.scale, "adaptive");
        assert_eq!(scale.window_ms, 10_000);
        assert_eq!(scale.windows.len(), 1);

        let scale = MultiScaleAggregator::default()
            .aggregate_temporal_notes(&notes, Some(1_000), &AdaptiveWindowSelector::default())
            .unwrap();
        assert_eq!(scale.scale, "custom");
        assert_eq!(scale.windows.len(), 4);
    }

    #[test]
    fn test_oversized_window_is_invalid() {
        let selector = AdaptiveWindowSelector::default();
        for window_ms in [u64::MAX, i64::MAX as u64] {
            let err = MultiScaleAggregator::default()
                .aggregate_temporal_notes(&[note(0, 5.0), note(10, 6.0)], Some(window_ms), &selector)
                .unwrap_err();
            assert!(matches!(err, JudgmentError::InvalidInput(_)), "window {}", window_ms);
        }
    }

    #[test]
    fn test_invalid_weighting_config_is_rejected() {
        let notes = [note(0, 5.0), note(500, 7.0)];
        for config in [
            AggregationConfig {
                decay_factor: -0.5,
                ..Default::default()
            },
            AggregationConfig {
                decay_factor: 0.0,
                ..Default::default()
            },
            AggregationConfig {
                variance_normalizer: 0.0,
                ..Default::default()
            },
            AggregationConfig {
                coherence_weights: CoherenceWeights {
                    direction: 0.0,
                    variance: 0.0,
                    observation: 0.0,
                },
                ..Default::default()
            },
        ] {
            let err = MultiScaleAggregator::new(config)
                .aggregate(&notes, &AggregationOptions::default())
                .unwrap_err();
            assert!(matches!(err, JudgmentError::InvalidInput(_)));
        }
    }

    #[test]
    fn test_zero_window_is_invalid() {
        let err = MultiScaleAggregator::default()
            .aggregate_temporal_notes(&[note(0, 5.0)], Some(0), &AdaptiveWindowSelector::default())
            .unwrap_err();
        assert!(matches!(err, JudgmentError::InvalidInput(_)));
    }
}
