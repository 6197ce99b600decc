// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Human Calibration
//!
//! Compares automated scores with human labels to decide how far the judge
//! can be trusted and how its scores should be corrected.
//!
//! Statistics are recomputed from the full sample log on every query, so the
//! status always reflects every recorded sample. The `calibrated` flag is a
//! latch: once `min_samples` is reached it stays set until [`CalibrationManager::reset`].

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{info, warn};

use crate::domain::batch::RequestId;
use crate::domain::config::CalibrationConfig;
use crate::domain::error::{validate_score, JudgmentError};

const STAT_EPSILON: f64 = 1e-12;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SampleId(pub u64);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationSample {
    pub id: SampleId,
    pub automated_score: f64,
    pub human_score: f64,
    pub evaluator_id: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

/// Outcome of [`CalibrationManager::record_sample`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordedSample {
    pub id: SampleId,
    pub sample_count: usize,
    /// True only for the sample that flipped the calibrated latch
    pub threshold_reached: bool,
}

/// Least-squares fit `human ≈ slope · automated + intercept`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LinearCorrection {
    pub slope: f64,
    pub intercept: f64,
}

impl LinearCorrection {
    pub fn apply(&self, automated: f64) -> f64 {
        (self.slope * automated + self.intercept).clamp(0.0, 10.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationStatus {
    pub sample_count: usize,
    pub min_samples: usize,
    pub correlation: Option<f64>,
    pub kappa: Option<f64>,
    pub mae: Option<f64>,
    pub calibrated: bool,
    /// Calibrated and within the correlation and MAE gates
    pub is_good: bool,
    /// Present once calibrated
    pub correction: Option<LinearCorrection>,
    /// Samples contributed per evaluator; unlabelled samples count under `unknown`
    pub evaluators: BTreeMap<String, usize>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReviewCandidate {
    pub request_id: RequestId,
    pub automated_score: f64,
    pub uncertainty: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewReason {
    ExtremeScore,
    HighUncertainty,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReviewSelection {
    /// Position in the candidate slice
    pub index: usize,
    pub request_id: RequestId,
    pub reason: ReviewReason,
    pub information: f64,
}

#[derive(Debug, Default)]
struct CalibrationLog {
    samples: Vec<CalibrationSample>,
    next_id: u64,
    calibrated: bool,
}

/// Calibration log and statistics for one judge.
///
/// Created explicitly by the caller and shared behind an `Arc`; writers are
/// serialized and readers see a consistent snapshot.
#[derive(Debug)]
pub struct CalibrationManager {
    config: CalibrationConfig,
    log: RwLock<CalibrationLog>,
}

impl Default for CalibrationManager {
    fn default() -> Self {
        Self::new(CalibrationConfig::default())
    }
}

impl CalibrationManager {
    pub fn new(config: CalibrationConfig) -> Self {
        Self {
            config,
            log: RwLock::new(CalibrationLog::default()),
        }
    }

    pub fn config(&self) -> &CalibrationConfig {
        &self.config
    }

    pub fn record_sample(
        &self,
        automated_score: f64,
        human_score: f64,
        evaluator_id: Option<String>,
    ) -> Result<RecordedSample, JudgmentError> {
        validate_score(automated_score, "automated score")?;
        validate_score(human_score, "human score")?;

        let mut log = self.log.write();
        let id = SampleId(log.next_id);
        log.next_id += 1;
        log.samples.push(CalibrationSample {
            id,
            automated_score,
            human_score,
            evaluator_id,
            recorded_at: Utc::now(),
        });

        let sample_count = log.samples.len();
        let threshold_reached = !log.calibrated && sample_count >= self.config.min_samples;
        if threshold_reached {
            log.calibrated = true;
            info!(
                sample_count,
                min_samples = self.config.min_samples,
                "Calibration threshold reached"
            );
        }
        metrics::counter!("cadence_calibration_samples_total").increment(1);

        Ok(RecordedSample {
            id,
            sample_count,
            threshold_reached,
        })
    }

    pub fn is_calibrated(&self) -> bool {
        self.log.read().calibrated
    }

    pub fn samples(&self) -> Vec<CalibrationSample> {
        self.log.read().samples.clone()
    }

    pub fn status(&self) -> CalibrationStatus {
        let log = self.log.read();
        let automated: Vec<f64> = log.samples.iter().map(|s| s.automated_score).collect();
        let human: Vec<f64> = log.samples.iter().map(|s| s.human_score).collect();

        let mut evaluators: BTreeMap<String, usize> = BTreeMap::new();
        for sample in &log.samples {
            let key = sample.evaluator_id.as_deref().unwrap_or("unknown");
            *evaluators.entry(key.to_string()).or_default() += 1;
        }

        let correlation = pearson(&automated, &human);
        let kappa = cohen_kappa(&automated, &human, self.config.kappa_bins);
        let mae = mean_absolute_error(&automated, &human);
        let correction = if log.calibrated {
            least_squares(&automated, &human)
        } else {
            None
        };

        let is_good = log.calibrated
            && correlation.is_some_and(|r| r >= self.config.min_correlation)
            && mae.is_some_and(|m| m <= self.config.max_mae);

        CalibrationStatus {
            sample_count: log.samples.len(),
            min_samples: self.config.min_samples,
            correlation,
            kappa,
            mae,
            calibrated: log.calibrated,
            is_good,
            correction,
            evaluators,
        }
    }

    /// Apply the current least-squares correction to an automated score
    pub fn correct(&self, automated_score: f64) -> Result<f64, JudgmentError> {
        validate_score(automated_score, "automated score")?;
        let status = self.status();
        match status.correction {
            Some(correction) if status.calibrated => Ok(correction.apply(automated_score)),
            _ => Err(JudgmentError::CalibrationNotReady {
                sample_count: status.sample_count,
                min_samples: status.min_samples,
            }),
        }
    }

    /// Clear the sample log and the calibrated latch
    pub fn reset(&self) {
        let mut log = self.log.write();
        log.samples.clear();
        log.calibrated = false;
        info!("Calibration log reset");
    }

    /// Pick the pending judgment whose human label would teach the most.
    ///
    /// Candidates qualify when their score lies within `extreme_margin` of
    /// either end of the scale or their uncertainty reaches
    /// `uncertainty_threshold`. Ties go to the earliest candidate.
    pub fn select_for_human_review(&self, candidates: &[ReviewCandidate]) -> Option<ReviewSelection> {
        let margin = self.config.extreme_margin;
        let mut best: Option<ReviewSelection> = None;

        for (index, candidate) in candidates.iter().enumerate() {
            if validate_score(candidate.automated_score, "candidate score").is_err() {
                warn!(request_id = %candidate.request_id, "Skipping review candidate with invalid score");
                continue;
            }

            let distance = candidate.automated_score.min(10.0 - candidate.automated_score);
            let extremeness = if distance <= margin {
                if margin > 0.0 {
                    (margin - distance) / margin
                } else {
                    1.0
                }
            } else {
                0.0
            };
            let is_extreme = distance <= margin;
            let uncertainty = candidate.uncertainty.unwrap_or(0.0).clamp(0.0, 1.0);
            let is_uncertain = uncertainty >= self.config.uncertainty_threshold;

            if !is_extreme && !is_uncertain {
                continue;
            }

            let reason = if is_extreme && (!is_uncertain || extremeness >= uncertainty) {
                ReviewReason::ExtremeScore
            } else {
                ReviewReason::HighUncertainty
            };
            let information = extremeness + uncertainty;

            if best.as_ref().is_none_or(|b| information > b.information) {
                best = Some(ReviewSelection {
                    index,
                    request_id: candidate.request_id,
                    reason,
                    information,
                });
            }
        }

        best
    }
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

/// Pearson correlation; `None` with fewer than two samples
pub(crate) fn pearson(x: &[f64], y: &[f64]) -> Option<f64> {
    if x.len() < 2 || x.len() != y.len() {
        return None;
    }
    let (mx, my) = (mean(x), mean(y));
    let mut cov = 0.0;
    let mut vx = 0.0;
    let mut vy = 0.0;
    for (a, b) in x.iter().zip(y) {
        cov += (a - mx) * (b - my);
        vx += (a - mx).powi(2);
        vy += (b - my).powi(2);
    }

    let flat_x = vx < STAT_EPSILON;
    let flat_y = vy < STAT_EPSILON;
    if flat_x && flat_y {
        let identical = x.iter().zip(y).all(|(a, b)| (a - b).abs() < STAT_EPSILON);
        return Some(if identical { 1.0 } else { 0.0 });
    }
    if flat_x || flat_y {
        return Some(0.0);
    }
    Some((cov / (vx * vy).sqrt()).clamp(-1.0, 1.0))
}

fn bin(score: f64, bins: usize) -> usize {
    ((score / 10.0 * bins as f64).floor() as usize).min(bins - 1)
}

/// Cohen's kappa over equal-width bins of the 0–10 scale
pub(crate) fn cohen_kappa(x: &[f64], y: &[f64], bins: usize) -> Option<f64> {
    if x.is_empty() || x.len() != y.len() || bins == 0 {
        return None;
    }
    let n = x.len() as f64;
    let mut rows = vec![0usize; bins];
    let mut cols = vec![0usize; bins];
    let mut agree = 0usize;
    for (a, b) in x.iter().zip(y) {
        let (ba, bb) = (bin(*a, bins), bin(*b, bins));
        rows[ba] += 1;
        cols[bb] += 1;
        if ba == bb {
            agree += 1;
        }
    }

    let observed = agree as f64 / n;
    let expected: f64 = rows
        .iter()
        .zip(&cols)
        .map(|(r, c)| (*r as f64 / n) * (*c as f64 / n))
        .sum();

    if (1.0 - expected).abs() < STAT_EPSILON {
        return Some(if (1.0 - observed).abs() < STAT_EPSILON { 1.0 } else { 0.0 });
    }
    Some((observed - expected) / (1.0 - expected))
}

pub(crate) fn mean_absolute_error(x: &[f64], y: &[f64]) -> Option<f64> {
    if x.is_empty() || x.len() != y.len() {
        return None;
    }
    Some(x.iter().zip(y).map(|(a, b)| (a - b).abs()).sum::<f64>() / x.len() as f64)
}

pub(crate) fn least_squares(x: &[f64], y: &[f64]) -> Option<LinearCorrection> {
    if x.is_empty() || x.len() != y.len() {
        return None;
    }
    let (mx, my) = (mean(x), mean(y));
    let vx: f64 = x.iter().map(|a| (a - mx).powi(2)).sum();
    if vx < STAT_EPSILON {
        return Some(LinearCorrection {
            slope: 1.0,
            intercept: my - mx,
        });
    }
    let cov: f64 = x.iter().zip(y).map(|(a, b)| (a - mx) * (b - my)).sum();
    let slope = cov / vx;
    Some(LinearCorrection {
        slope,
        intercept: my - slope * mx,
    })
}
