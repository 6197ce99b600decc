// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Judgment requests, the judge port and per-request results.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::error::{validate_score, JudgmentError};
use crate::domain::goal::ResolvedGoal;
use crate::domain::self_consistency::Importance;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RequestId(pub Uuid);

impl RequestId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BatchId(pub Uuid);

impl BatchId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for BatchId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for BatchId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A unit of work for the judge.
///
/// The payload is opaque to the scheduler. Higher `priority` dispatches first;
/// equal priorities dispatch in submission order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JudgmentRequest {
    pub id: RequestId,
    pub payload: serde_json::Value,
    #[serde(default)]
    pub priority: i32,
    pub requested_at: DateTime<Utc>,

    /// Request that must finish before this one is batched (temporal mode)
    #[serde(default)]
    pub depends_on: Option<RequestId>,

    /// Goal resolved at submission; never re-resolved mid-batch
    #[serde(default)]
    pub goal: Option<ResolvedGoal>,

    /// Human label recorded as a calibration sample once the judge answers
    #[serde(default)]
    pub human_score: Option<f64>,

    #[serde(default)]
    pub evaluator_id: Option<String>,

    /// Test name, page or step the request came from
    #[serde(default)]
    pub origin: Option<String>,

    #[serde(default)]
    pub importance: Importance,

    /// A failure here would block users from completing their task
    #[serde(default)]
    pub blocks_use: bool,

    /// Longest this request may sit in the queue before it fails with
    /// `BatchTimeout`; overrides the scheduler-wide `queue_timeout`
    #[serde(default, with = "humantime_serde")]
    pub queue_timeout: Option<Duration>,
}

impl JudgmentRequest {
    pub fn new(payload: serde_json::Value) -> Self {
        Self {
            id: RequestId::new(),
            payload,
            priority: 0,
            requested_at: Utc::now(),
            depends_on: None,
            goal: None,
            human_score: None,
            evaluator_id: None,
            origin: None,
            importance: Importance::default(),
            blocks_use: false,
            queue_timeout: None,
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn depends_on(mut self, dependency: RequestId) -> Self {
        self.depends_on = Some(dependency);
        self
    }

    pub fn with_goal(mut self, goal: ResolvedGoal) -> Self {
        self.goal = Some(goal);
        self
    }

    pub fn with_human_label(mut self, human_score: f64, evaluator_id: impl Into<String>) -> Self {
        self.human_score = Some(human_score);
        self.evaluator_id = Some(evaluator_id.into());
        self
    }

    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = Some(origin.into());
        self
    }

    pub fn with_importance(mut self, importance: Importance) -> Self {
        self.importance = importance;
        self
    }

    pub fn blocking(mut self) -> Self {
        self.blocks_use = true;
        self
    }

    pub fn with_queue_timeout(mut self, timeout: Duration) -> Self {
        self.queue_timeout = Some(timeout);
        self
    }

    pub fn requested_at(mut self, at: DateTime<Utc>) -> Self {
        self.requested_at = at;
        self
    }

    pub fn validate(&self) -> Result<(), JudgmentError> {
        if let Some(human) = self.human_score {
            validate_score(human, "human score")?;
        }
        if self.depends_on == Some(self.id) {
            return Err(JudgmentError::InvalidInput(format!(
                "request {} cannot depend on itself",
                self.id
            )));
        }
        Ok(())
    }
}

/// What a judge returns for one request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JudgeOutcome {
    /// `None` when the judge could not score the input
    pub score: Option<f64>,
    #[serde(default)]
    pub issues: Vec<String>,
    #[serde(default)]
    pub reasoning: String,
    /// Judge-reported uncertainty in [0, 1]
    #[serde(default)]
    pub uncertainty: Option<f64>,
}

impl JudgeOutcome {
    pub fn scored(score: f64) -> Self {
        Self {
            score: Some(score),
            issues: Vec::new(),
            reasoning: String::new(),
            uncertainty: None,
        }
    }

    pub fn with_issues(mut self, issues: Vec<String>) -> Self {
        self.issues = issues;
        self
    }

    pub fn with_uncertainty(mut self, uncertainty: f64) -> Self {
        self.uncertainty = Some(uncertainty);
        self
    }

    pub fn validate(&self) -> Result<(), JudgmentError> {
        if let Some(score) = self.score {
            validate_score(score, "judge score")?;
        }
        if let Some(u) = self.uncertainty {
            if !u.is_finite() || !(0.0..=1.0).contains(&u) {
                return Err(JudgmentError::InvalidInput(format!(
                    "judge uncertainty must be within [0, 1], got {}",
                    u
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum JudgeError {
    #[error("Judge rejected input: {0}")]
    InvalidInput(String),

    #[error("Judge failed: {0}")]
    Failed(String),
}

/// Port to the external judge (LLM/VLM) that scores a payload
#[async_trait]
pub trait JudgeInvoker: Send + Sync {
    async fn invoke(&self, request: &JudgmentRequest) -> Result<JudgeOutcome, JudgeError>;
}

/// Per-request result delivered through a `JudgmentHandle`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JudgmentResult {
    pub request_id: RequestId,
    pub batch_id: BatchId,
    pub outcome: JudgeOutcome,
    pub requested_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    /// Dispatch attempts, including the successful one
    pub attempts: u32,
}

impl JudgmentResult {
    pub fn score(&self) -> Option<f64> {
        self.outcome.score
    }
}
