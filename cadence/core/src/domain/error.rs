// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use thiserror::Error;

use crate::domain::batch::RequestId;

/// Failures surfaced by the judgment core.
///
/// Aggregation and calibration return these as explicit values; nothing is
/// coerced into a default score or coherence.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum JudgmentError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    #[error("Calibration not ready: {sample_count} of {min_samples} samples collected")]
    CalibrationNotReady {
        sample_count: usize,
        min_samples: usize,
    },

    #[error("Request {request_id} timed out after {attempts} attempt(s)")]
    BatchTimeout {
        request_id: RequestId,
        attempts: u32,
    },

    #[error("Concurrency limit exceeded: {in_flight} batches in flight, limit is {limit}")]
    ConcurrencyLimitExceeded { in_flight: usize, limit: usize },
}

/// Checks that a score is finite and inside the 0–10 judgment scale.
pub(crate) fn validate_score(score: f64, what: &str) -> Result<(), JudgmentError> {
    if !score.is_finite() || !(0.0..=10.0).contains(&score) {
        return Err(JudgmentError::InvalidInput(format!(
            "{} must be within [0, 10], got {}",
            what, score
        )));
    }
    Ok(())
}
