// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Decides when a judgment is worth repeating and how many samples to take.

use serde::{Deserialize, Serialize};

use crate::domain::batch::JudgeOutcome;
use crate::domain::config::SelfConsistencyConfig;

const BORDERLINE_SAMPLES: u8 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Importance {
    Low,
    #[default]
    Normal,
    High,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsistencyReason {
    CriticalImportance,
    BlockingImpact,
    HighUncertainty,
    BorderlineScore,
    ManyIssues,
    Confident,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelfConsistencyDecision {
    pub recommended: bool,
    /// Total judge invocations to run, including the one already made
    pub samples: u8,
    pub reason: ConsistencyReason,
}

#[derive(Debug, Clone, Default)]
pub struct SelfConsistencyAdvisor {
    config: SelfConsistencyConfig,
}

impl SelfConsistencyAdvisor {
    pub fn new(config: SelfConsistencyConfig) -> Self {
        Self { config }
    }

    /// Rules are checked in order; the first match wins.
    ///
    /// 1. critical importance, or a failure that blocks users: `max_samples`
    /// 2. uncertainty at or above the threshold: 3
    /// 3. score within `borderline_band` of the pass line: 3
    /// 4. issue count at or above the threshold: 3
    pub fn decide(
        &self,
        importance: Importance,
        blocks_use: bool,
        partial: &JudgeOutcome,
    ) -> SelfConsistencyDecision {
        let repeat = |samples: u8, reason| SelfConsistencyDecision {
            recommended: true,
            samples,
            reason,
        };
        let max = self.config.max_samples;

        if importance == Importance::Critical {
            return repeat(max, ConsistencyReason::CriticalImportance);
        }
        if blocks_use {
            return repeat(max, ConsistencyReason::BlockingImpact);
        }
        if partial
            .uncertainty
            .is_some_and(|u| u >= self.config.uncertainty_threshold)
        {
            return repeat(BORDERLINE_SAMPLES.min(max), ConsistencyReason::HighUncertainty);
        }
        if partial
            .score
            .is_some_and(|s| (s - self.config.pass_score).abs() <= self.config.borderline_band)
        {
            return repeat(BORDERLINE_SAMPLES.min(max), ConsistencyReason::BorderlineScore);
        }
        if partial.issues.len() >= self.config.issue_threshold {
            return repeat(BORDERLINE_SAMPLES.min(max), ConsistencyReason::ManyIssues);
        }

        SelfConsistencyDecision {
            recommended: false,
            samples: 1,
            reason: ConsistencyReason::Confident,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_critical_and_blocking_use_max_samples() {
        let advisor = SelfConsistencyAdvisor::default();
        let outcome = JudgeOutcome::scored(9.0);

        let d = advisor.decide(Importance::Critical, false, &outcome);
        assert!(d.recommended);
        assert_eq!(d.samples, 5);
        assert_eq!(d.reason, ConsistencyReason::CriticalImportance);

        let d = advisor.decide(Importance::Low, true, &outcome);
        assert_eq!(d.reason, ConsistencyReason::BlockingImpact);
    }

    #[test]
    fn test_uncertain_borderline_and_noisy_results_repeat_three_times() {
        let advisor = SelfConsistencyAdvisor::default();

        let d = advisor.decide(Importance::Normal, false, &JudgeOutcome::scored(9.0).with_uncertainty(0.4));
        assert_eq!((d.samples, d.reason), (3, ConsistencyReason::HighUncertainty));

        let d = advisor.decide(Importance::Normal, false, &JudgeOutcome::scored(6.5));
        assert_eq!((d.samples, d.reason), (3, ConsistencyReason::BorderlineScore));

        let issues = (0..5).map(|i| format!("issue {}", i)).collect();
        let d = advisor.decide(Importance::Normal, false, &JudgeOutcome::scored(9.0).with_issues(issues));
        assert_eq!((d.samples, d.reason), (3, ConsistencyReason::ManyIssues));
    }

    #[test]
    fn test_confident_result_is_not_repeated() {
        let advisor = SelfConsistencyAdvisor::default();
        let d = advisor.decide(Importance::High, false, &JudgeOutcome::scored(9.0).with_uncertainty(0.1));
        assert!(!d.recommended);
        assert_eq!(d.samples, 1);
    }

    #[test]
    fn test_importance_ordering() {
        assert!(Importance::Critical > Importance::High);
        assert!(Importance::Low < Importance::Normal);
    }
}
