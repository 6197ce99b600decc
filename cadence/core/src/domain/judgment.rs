// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Sequential Judgment Context
//!
//! Bounded, timestamp-ordered history of the judgments made during one
//! evaluation session, plus the trend analysis used to bias later judgments.
//!
//! | Type | Description |
//! |------|-------------|
//! | `JudgmentRecord` | Immutable score/issues/timestamp produced by a judge |
//! | `SequentialContext` | Rolling history capped at `max_history` |
//! | `SharedSequentialContext` | Lock-guarded handle shared with batch completions |
//! | `ContextPatterns` | Trend, mean score and recurring issues |
//!
//! Records are inserted by timestamp, not by arrival, so completion jitter in
//! the scheduler never changes the detected trend. Eviction always drops the
//! earliest records.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::Arc;
use tracing::debug;

use crate::domain::config::ContextConfig;
use crate::domain::error::{validate_score, JudgmentError};

const TREND_EPSILON: f64 = 1e-9;

/// Stable sequence number assigned when a record enters a context
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DecisionId(pub u64);

impl std::fmt::Display for DecisionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "decision-{}", self.0)
    }
}

/// A single judgment as seen by the sequential context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JudgmentRecord {
    score: Option<f64>,
    issues: Vec<String>,
    timestamp: DateTime<Utc>,
    origin: Option<String>,
}

impl JudgmentRecord {
    pub fn new(
        score: Option<f64>,
        issues: Vec<String>,
        timestamp: DateTime<Utc>,
    ) -> Result<Self, JudgmentError> {
        if let Some(score) = score {
            validate_score(score, "judgment score")?;
        }
        Ok(Self {
            score,
            issues,
            timestamp,
            origin: None,
        })
    }

    /// Attach the context the judgment originated from (test name, page, step)
    pub fn with_origin(mut self, origin: Option<String>) -> Self {
        self.origin = origin;
        self
    }

    pub fn score(&self) -> Option<f64> {
        self.score
    }

    pub fn issues(&self) -> &[String] {
        &self.issues
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn origin(&self) -> Option<&str> {
        self.origin.as_deref()
    }
}

/// A record together with the id it was assigned on insertion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredDecision {
    pub id: DecisionId,
    pub record: JudgmentRecord,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trend {
    Improving,
    Declining,
    Stable,
}

impl Trend {
    fn from_delta(delta: f64, tolerance: f64) -> Self {
        if delta > tolerance + TREND_EPSILON {
            Trend::Improving
        } else if delta < -(tolerance + TREND_EPSILON) {
            Trend::Declining
        } else {
            Trend::Stable
        }
    }
}

impl std::fmt::Display for Trend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Trend::Improving => "improving",
            Trend::Declining => "declining",
            Trend::Stable => "stable",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IssueFrequency {
    pub issue: String,
    pub occurrences: usize,
}

/// Result of [`SequentialContext::identify_patterns`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextPatterns {
    pub trend: Trend,
    /// Number of records carrying a score
    pub scored_records: usize,
    pub mean_score: Option<f64>,
    pub earliest_mean: Option<f64>,
    pub recent_mean: Option<f64>,
    /// Issues reported by at least two records, most frequent first
    pub recurring_issues: Vec<IssueFrequency>,
}

/// Bounded rolling history of judgments for one evaluation session.
#[derive(Debug, Clone)]
pub struct SequentialContext {
    max_history: usize,
    history: VecDeque<StoredDecision>,
    next_id: u64,
    trend_tolerance: f64,
    bias_magnitude: f64,
}

impl SequentialContext {
    /// Create a context holding at most `max_history` records (minimum 1)
    pub fn new(max_history: usize) -> Self {
        let defaults = ContextConfig::default();
        Self {
            max_history: max_history.max(1),
            history: VecDeque::new(),
            next_id: 0,
            trend_tolerance: defaults.trend_tolerance,
            bias_magnitude: defaults.bias_magnitude,
        }
    }

    pub fn from_config(config: &ContextConfig) -> Self {
        Self {
            max_history: config.max_history.max(1),
            history: VecDeque::new(),
            next_id: 0,
            trend_tolerance: config.trend_tolerance.max(0.0),
            bias_magnitude: config.bias_magnitude,
        }
    }

    /// Insert a record in timestamp order and evict the earliest records
    /// beyond capacity. Equal timestamps keep arrival order.
    pub fn add_decision(&mut self, record: JudgmentRecord) -> DecisionId {
        let id = DecisionId(self.next_id);
        self.next_id += 1;

        let position = self
            .history
            .partition_point(|d| d.record.timestamp <= record.timestamp);
        self.history.insert(position, StoredDecision { id, record });

        while self.history.len() > self.max_history {
            if let Some(evicted) = self.history.pop_front() {
                debug!(decision = %evicted.id, "Evicted decision from sequential context");
            }
        }
        id
    }

    pub fn len(&self) -> usize {
        self.history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }

    pub fn max_history(&self) -> usize {
        self.max_history
    }

    /// Records from earliest to latest
    pub fn iter(&self) -> impl Iterator<Item = &StoredDecision> {
        self.history.iter()
    }

    pub fn latest(&self) -> Option<&StoredDecision> {
        self.history.back()
    }

    pub fn get(&self, id: DecisionId) -> Option<&StoredDecision> {
        self.history.iter().find(|d| d.id == id)
    }

    /// Classify the score trend and collect recurring issues.
    ///
    /// With three or more scored records the mean of the latest third is
    /// compared with the mean of the earliest third; shorter histories count
    /// the signs of consecutive score changes.
    pub fn identify_patterns(&self) -> ContextPatterns {
        let scores: Vec<f64> = self.history.iter().filter_map(|d| d.record.score).collect();

        let (trend, earliest_mean, recent_mean) = if scores.len() >= 3 {
            let third = scores.len() / 3;
            let earliest = mean(&scores[..third]);
            let recent = mean(&scores[scores.len() - third..]);
            (
                Trend::from_delta(recent - earliest, self.trend_tolerance),
                Some(earliest),
                Some(recent),
            )
        } else {
            let (mut rising, mut falling) = (0usize, 0usize);
            for pair in scores.windows(2) {
                let delta = pair[1] - pair[0];
                if delta > self.trend_tolerance + TREND_EPSILON {
                    rising += 1;
                } else if delta < -(self.trend_tolerance + TREND_EPSILON) {
                    falling += 1;
                }
            }
            let trend = match rising.cmp(&falling) {
                std::cmp::Ordering::Greater => Trend::Improving,
                std::cmp::Ordering::Less => Trend::Declining,
                std::cmp::Ordering::Equal => Trend::Stable,
            };
            (trend, scores.first().copied(), scores.last().copied())
        };

        ContextPatterns {
            trend,
            scored_records: scores.len(),
            mean_score: if scores.is_empty() { None } else { Some(mean(&scores)) },
            earliest_mean,
            recent_mean,
            recurring_issues: self.recurring_issues(),
        }
    }

    /// Multiplier an external prompt builder may apply to its guidance.
    pub fn prompt_bias(&self) -> f64 {
        match self.identify_patterns().trend {
            Trend::Improving => 1.0 + self.bias_magnitude,
            Trend::Declining => 1.0 - self.bias_magnitude,
            Trend::Stable => 1.0,
        }
    }

    fn recurring_issues(&self) -> Vec<IssueFrequency> {
        let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
        for decision in &self.history {
            let unique: BTreeSet<&str> = decision.record.issues.iter().map(String::as_str).collect();
            for issue in unique {
                *counts.entry(issue).or_default() += 1;
            }
        }

        let mut recurring: Vec<IssueFrequency> = counts
            .into_iter()
            .filter(|(_, n)| *n >= 2)
            .map(|(issue, occurrences)| IssueFrequency {
                issue: issue.to_string(),
                occurrences,
            })
            .collect();
        recurring.sort_by(|a, b| b.occurrences.cmp(&a.occurrences));
        recurring
    }
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

/// Thread-safe handle to a [`SequentialContext`].
///
/// Writers are serialized; readers observe a consistent snapshot.
#[derive(Debug, Clone)]
pub struct SharedSequentialContext {
    inner: Arc<RwLock<SequentialContext>>,
}

impl SharedSequentialContext {
    pub fn new(context: SequentialContext) -> Self {
        Self {
            inner: Arc::new(RwLock::new(context)),
        }
    }

    pub fn add_decision(&self, record: JudgmentRecord) -> DecisionId {
        self.inner.write().add_decision(record)
    }

    pub fn identify_patterns(&self) -> ContextPatterns {
        self.inner.read().identify_patterns()
    }

    pub fn prompt_bias(&self) -> f64 {
        self.inner.read().prompt_bias()
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }

    /// Copy of the current history, earliest first
    pub fn snapshot(&self) -> Vec<StoredDecision> {
        self.inner.read().iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn record_at(score: f64, offset_secs: i64) -> JudgmentRecord {
        let base = DateTime::parse_from_rfc3339("2026-01-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        JudgmentRecord::new(Some(score), vec![], base + Duration::seconds(offset_secs)).unwrap()
    }

    #[test]
    fn test_record_rejects_out_of_range_score() {
        assert!(JudgmentRecord::new(Some(11.0), vec![], Utc::now()).is_err());
        assert!(JudgmentRecord::new(None, vec!["blank".into()], Utc::now()).is_ok());
    }

    #[test]
    fn test_capacity_evicts_earliest() {
        let mut context = SequentialContext::new(3);
        for i in 0..5 {
            context.add_decision(record_at(i as f64, i));
        }
        assert_eq!(context.len(), 3);
        let scores: Vec<f64> = context.iter().filter_map(|d| d.record.score()).collect();
        assert_eq!(scores, vec![2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_out_of_order_insert_is_sorted_by_timestamp() {
        let mut context = SequentialContext::new(10);
        context.add_decision(record_at(5.0, 20));
        context.add_decision(record_at(3.0, 10));
        context.add_decision(record_at(7.0, 30));

        let scores: Vec<f64> = context.iter().filter_map(|d| d.record.score()).collect();
        assert_eq!(scores, vec![3.0, 5.0, 7.0]);
        assert_eq!(context.latest().unwrap().record.score(), Some(7.0));
    }

    #[test]
    fn test_ids_are_stable_across_eviction() {
        let mut context = SequentialContext::new(2);
        let first = context.add_decision(record_at(1.0, 1));
        let second = context.add_decision(record_at(2.0, 2));
        let third = context.add_decision(record_at(3.0, 3));

        assert!(context.get(first).is_none());
        assert_eq!(context.get(second).unwrap().record.score(), Some(2.0));
        assert_eq!(third, DecisionId(2));
    }

    #[test]
    fn test_trend_by_thirds() {
        let mut context = SequentialContext::new(10);
        for (i, score) in [4.0, 4.5, 5.0, 6.0, 7.0, 8.0].iter().enumerate() {
            context.add_decision(record_at(*score, i as i64));
        }
        let patterns = context.identify_patterns();
        assert_eq!(patterns.trend, Trend::Improving);
        assert_eq!(patterns.earliest_mean, Some(4.25));
        assert_eq!(patterns.recent_mean, Some(7.5));

        let mut context = SequentialContext::new(10);
        for (i, score) in [9.0, 8.0, 7.0].iter().enumerate() {
            context.add_decision(record_at(*score, i as i64));
        }
        assert_eq!(context.identify_patterns().trend, Trend::Declining);
    }

    #[test]
    fn test_trend_ties_are_stable() {
        let mut context = SequentialContext::new(10);
        for (i, score) in [6.0, 2.0, 9.0, 6.0].iter().enumerate() {
            context.add_decision(record_at(*score, i as i64));
        }
        assert_eq!(context.identify_patterns().trend, Trend::Stable);
        assert_eq!(context.prompt_bias(), 1.0);
    }

    #[test]
    fn test_short_history_uses_delta_signs() {
        let mut context = SequentialContext::new(10);
        assert_eq!(context.identify_patterns().trend, Trend::Stable);

        context.add_decision(record_at(5.0, 0));
        assert_eq!(context.identify_patterns().trend, Trend::Stable);

        context.add_decision(record_at(6.5, 1));
        let patterns = context.identify_patterns();
        assert_eq!(patterns.trend, Trend::Improving);
        assert!((context.prompt_bias() - 1.05).abs() < 1e-12);
        assert_eq!(patterns.scored_records, 2);
    }

    #[test]
    fn test_unscored_records_are_ignored_for_trend() {
        let mut context = SequentialContext::new(10);
        context.add_decision(record_at(8.0, 0));
        context.add_decision(JudgmentRecord::new(None, vec![], Utc::now()).unwrap());
        context.add_decision(record_at(4.0, 2));

        let patterns = context.identify_patterns();
        assert_eq!(patterns.scored_records, 2);
        assert_eq!(patterns.trend, Trend::Declining);
    }

    #[test]
    fn test_recurring_issues() {
        let mut context = SequentialContext::new(10);
        let now = Utc::now();
        context.add_decision(
            JudgmentRecord::new(Some(5.0), vec!["low contrast".into(), "low contrast".into()], now).unwrap(),
        );
        context.add_decision(
            JudgmentRecord::new(Some(5.0), vec!["low contrast".into(), "small tap targets".into()], now).unwrap(),
        );
        context.add_decision(JudgmentRecord::new(Some(5.0), vec!["missing alt text".into()], now).unwrap());

        let patterns = context.identify_patterns();
        assert_eq!(patterns.recurring_issues.len(), 1);
        assert_eq!(patterns.recurring_issues[0].issue, "low contrast");
        assert_eq!(patterns.recurring_issues[0].occurrences, 2);
    }

    #[test]
    fn test_zero_capacity_is_clamped() {
        let mut context = SequentialContext::new(0);
        context.add_decision(record_at(1.0, 0));
        context.add_decision(record_at(2.0, 1));
        assert_eq!(context.max_history(), 1);
        assert_eq!(context.len(), 1);
    }

    #[test]
    fn test_shared_context_snapshot() {
        let shared = SharedSequentialContext::new(SequentialContext::new(4));
        let writer = shared.clone();
        writer.add_decision(record_at(3.0, 0));
        writer.add_decision(record_at(4.0, 1));

        let snapshot = shared.snapshot();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(shared.len(), 2);
        assert_eq!(shared.identify_patterns().trend, Trend::Improving);
    }
}
