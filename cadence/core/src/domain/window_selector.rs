// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Adaptive Window Selection
//!
//! Picks an aggregation window size from the shape of a note stream.
//!
//! ## Classification Table
//! | Pattern | Condition | Window |
//! |---------|-----------|--------|
//! | `Erratic` | irregular spacing, or volatile scores that keep reversing | `3 × mean interval`, clamped to floor/cap |
//! | `FastChange` | mean score change ≥ `fast_volatility` | `fast_window_ms` |
//! | `Consistent` | low volatility and regular spacing | `default_window_ms` |
//! | `SlowChange` | everything else | `slow_window_min_ms..=slow_window_max_ms`, larger when calmer |
//!
//! Streams of zero or one note are reported as `Consistent` with the
//! default window.

use serde::{Deserialize, Serialize};

use crate::domain::config::WindowSelectorConfig;
use crate::domain::temporal::TemporalNote;

const SIGN_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotePattern {
    FastChange,
    SlowChange,
    Consistent,
    Erratic,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct StreamStatistics {
    pub note_count: usize,
    pub mean_interval_ms: f64,
    pub interval_variance: f64,
    /// Standard deviation of intervals divided by their mean
    pub interval_cv: f64,
    /// Mean absolute score change between consecutive notes
    pub score_volatility: f64,
    /// Share of consecutive non-zero score changes that reverse direction
    pub sign_flip_ratio: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowRecommendation {
    pub pattern: NotePattern,
    pub window_size_ms: u64,
    pub statistics: StreamStatistics,
}

#[derive(Debug, Clone, Default)]
pub struct AdaptiveWindowSelector {
    config: WindowSelectorConfig,
}

impl AdaptiveWindowSelector {
    pub fn new(config: WindowSelectorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &WindowSelectorConfig {
        &self.config
    }

    pub fn calculate_optimal_window_size(&self, notes: &[TemporalNote]) -> WindowRecommendation {
        let statistics = Self::statistics(notes);
        if statistics.note_count < 2 {
            return WindowRecommendation {
                pattern: NotePattern::Consistent,
                window_size_ms: self.config.default_window_ms,
                statistics,
            };
        }

        let pattern = self.classify(&statistics);
        let window_size_ms = self.window_for(pattern, &statistics);
        tracing::debug!(
            ?pattern,
            window_size_ms,
            volatility = statistics.score_volatility,
            interval_cv = statistics.interval_cv,
            "Selected aggregation window"
        );

        WindowRecommendation {
            pattern,
            window_size_ms,
            statistics,
        }
    }

    fn classify(&self, stats: &StreamStatistics) -> NotePattern {
        let c = &self.config;
        let volatile = stats.score_volatility >= c.fast_volatility;

        if stats.interval_cv > c.erratic_interval_cv
            || (volatile && stats.sign_flip_ratio > c.erratic_flip_ratio)
        {
            NotePattern::Erratic
        } else if volatile {
            NotePattern::FastChange
        } else if stats.score_volatility <= c.consistent_volatility
            && stats.interval_cv <= c.consistent_interval_cv
        {
            NotePattern::Consistent
        } else {
            NotePattern::SlowChange
        }
    }

    fn window_for(&self, pattern: NotePattern, stats: &StreamStatistics) -> u64 {
        let c = &self.config;
        match pattern {
            NotePattern::FastChange => c.fast_window_ms,
            NotePattern::Consistent => c.default_window_ms,
            NotePattern::SlowChange => {
                let span = c.fast_volatility - c.consistent_volatility;
                let t = if span > 0.0 {
                    ((stats.score_volatility - c.consistent_volatility) / span).clamp(0.0, 1.0)
                } else {
                    0.0
                };
                let range = c.slow_window_max_ms.saturating_sub(c.slow_window_min_ms) as f64;
                c.slow_window_max_ms - (t * range).round() as u64
            }
            NotePattern::Erratic => {
                let proposed = (stats.mean_interval_ms * 3.0).round() as u64;
                proposed.max(c.erratic_window_floor_ms).min(c.erratic_window_cap_ms)
            }
        }
    }

    fn statistics(notes: &[TemporalNote]) -> StreamStatistics {
        let mut sorted: Vec<&TemporalNote> = notes.iter().collect();
        sorted.sort_by_key(|n| n.timestamp);

        let mut stats = StreamStatistics {
            note_count: sorted.len(),
            ..Default::default()
        };
        if sorted.len() < 2 {
            return stats;
        }

        let intervals: Vec<f64> = sorted
            .windows(2)
            .map(|pair| (pair[1].timestamp - pair[0].timestamp).num_milliseconds() as f64)
            .collect();
        let mean_interval = intervals.iter().sum::<f64>() / intervals.len() as f64;
        let variance = intervals
            .iter()
            .map(|i| (i - mean_interval).powi(2))
            .sum::<f64>()
            / intervals.len() as f64;

        stats.mean_interval_ms = mean_interval;
        stats.interval_variance = variance;
        stats.interval_cv = if mean_interval > 0.0 {
            variance.sqrt() / mean_interval
        } else {
            0.0
        };

        let deltas: Vec<f64> = sorted.windows(2).map(|pair| pair[1].score - pair[0].score).collect();
        stats.score_volatility = deltas.iter().map(|d| d.abs()).sum::<f64>() / deltas.len() as f64;

        let moving: Vec<f64> = deltas.into_iter().filter(|d| d.abs() > SIGN_EPSILON).collect();
        if moving.len() >= 2 {
            let flips = moving
                .windows(2)
                .filter(|pair| pair[0].signum() != pair[1].signum())
                .count();
            stats.sign_flip_ratio = flips as f64 / (moving.len() - 1) as f64;
        }

        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn notes(points: &[(i64, f64)]) -> Vec<TemporalNote> {
        let start = Utc::now();
        points
            .iter()
            .map(|(ms, score)| {
                TemporalNote::new(start + Duration::milliseconds(*ms), *ms as u64, *score).unwrap()
            })
            .collect()
    }

    #[test]
    fn test_empty_and_single_note_use_default() {
        let selector = AdaptiveWindowSelector::default();

        let empty = selector.calculate_optimal_window_size(&[]);
        assert_eq!(empty.pattern, NotePattern::Consistent);
        assert_eq!(empty.window_size_ms, 10_000);

        let single = selector.calculate_optimal_window_size(&notes(&[(0, 5.0)]));
        assert_eq!(single.window_size_ms, 10_000);
        assert_eq!(single.statistics.mean_interval_ms, 0.0);
    }

    #[test]
    fn test_evenly_spaced_constant_stream_is_consistent() {
        let selector = AdaptiveWindowSelector::default();
        let points: Vec<(i64, f64)> = (0..20).map(|i| (i * 200, 7.0)).collect();
        let rec = selector.calculate_optimal_window_size(&notes(&points));

        assert_eq!(rec.pattern, NotePattern::Consistent);
        assert_eq!(rec.window_size_ms, 10_000);
        assert_eq!(rec.statistics.mean_interval_ms, 200.0);
        assert_eq!(rec.statistics.interval_cv, 0.0);
    }

    #[test]
    fn test_steady_climb_is_fast_change() {
        let selector = AdaptiveWindowSelector::default();
        let points: Vec<(i64, f64)> = (0..6).map(|i| (i * 500, i as f64 * 1.5)).collect();
        let rec = selector.calculate_optimal_window_size(&notes(&points));

        assert_eq!(rec.pattern, NotePattern::FastChange);
        assert_eq!(rec.window_size_ms, 5_000);
    }

    #[test]
    fn test_reversing_scores_are_erratic() {
        let selector = AdaptiveWindowSelector::default();
        let points = [(0, 2.0), (400, 8.0), (800, 2.0), (1200, 8.0), (1600, 2.0)];
        let rec = selector.calculate_optimal_window_size(&notes(&points));

        assert_eq!(rec.pattern, NotePattern::Erratic);
        assert_eq!(rec.statistics.sign_flip_ratio, 1.0);
        assert_eq!(rec.window_size_ms, 1_200);
        assert!(rec.window_size_ms <= selector.config().erratic_window_cap_ms);
    }

    #[test]
    fn test_inverted_erratic_bounds_resolve_to_cap() {
        let selector = AdaptiveWindowSelector::new(WindowSelectorConfig {
            erratic_window_floor_ms: 5_000,
            erratic_window_cap_ms: 1_000,
            ..Default::default()
        });
        let points = [(0, 2.0), (400, 8.0), (800, 2.0), (1200, 8.0), (1600, 2.0)];
        let rec = selector.calculate_optimal_window_size(&notes(&points));

        assert_eq!(rec.pattern, NotePattern::Erratic);
        assert_eq!(rec.window_size_ms, 1_000);
    }

    #[test]
    fn test_irregular_spacing_is_erratic() {
        let selector = AdaptiveWindowSelector::default();
        let points = [(0, 5.0), (10, 5.0), (20, 5.0), (5_000, 5.0)];
        let rec = selector.calculate_optimal_window_size(&notes(&points));
        assert_eq!(rec.pattern, NotePattern::Erratic);
    }

    #[test]
    fn test_gentle_drift_is_slow_change() {
        let selector = AdaptiveWindowSelector::default();
        let points: Vec<(i64, f64)> = (0..8).map(|i| (i * 1_000, 3.0 + i as f64 * 0.5)).collect();
        let rec = selector.calculate_optimal_window_size(&notes(&points));

        assert_eq!(rec.pattern, NotePattern::SlowChange);
        assert!(rec.window_size_ms >= 20_000 && rec.window_size_ms <= 30_000);
    }
}
