// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Judgment Pipeline Application Service
//!
//! Coordinates one evaluation session end to end:
//! - dispatches requests through the [`BatchScheduler`]
//! - appends each answered judgment to the [`SharedSequentialContext`]
//! - records human-labelled requests as calibration samples
//! - recommends self-consistency re-runs
//! - publishes context and calibration events on the [`EventBus`]

use chrono::Utc;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, info};

use crate::application::batch_scheduler::{BatchScheduler, SchedulerError};
use crate::domain::batch::{JudgeInvoker, JudgmentRequest, JudgmentResult};
use crate::domain::calibration::{CalibrationManager, RecordedSample};
use crate::domain::config::CadenceConfig;
use crate::domain::error::JudgmentError;
use crate::domain::events::{CalibrationEvent, ContextEvent};
use crate::domain::goal::{Goal, GoalContext, ResolvedGoal};
use crate::domain::judgment::{DecisionId, JudgmentRecord, SequentialContext, SharedSequentialContext, Trend};
use crate::domain::self_consistency::{SelfConsistencyAdvisor, SelfConsistencyDecision};
use crate::infrastructure::event_bus::EventBus;

/// Everything the pipeline learned from one request
#[derive(Debug, Clone)]
pub struct PipelineOutcome {
    pub result: JudgmentResult,
    pub decision_id: DecisionId,
    /// Session trend after this judgment was added
    pub trend: Trend,
    pub calibration_sample: Option<RecordedSample>,
    pub self_consistency: SelfConsistencyDecision,
}

pub struct JudgmentPipeline {
    scheduler: BatchScheduler,
    context: SharedSequentialContext,
    calibration: Arc<CalibrationManager>,
    advisor: SelfConsistencyAdvisor,
    event_bus: Arc<EventBus>,
    last_trend: Mutex<Trend>,
}

impl JudgmentPipeline {
    pub fn new(config: &CadenceConfig, invoker: Arc<dyn JudgeInvoker>, event_bus: Arc<EventBus>) -> Self {
        let calibration = Arc::new(CalibrationManager::new(config.calibration.clone()));
        Self::with_calibration(config, invoker, event_bus, calibration)
    }

    /// Build a pipeline around an existing calibration log, e.g. one shared
    /// by several sessions judged by the same model
    pub fn with_calibration(
        config: &CadenceConfig,
        invoker: Arc<dyn JudgeInvoker>,
        event_bus: Arc<EventBus>,
        calibration: Arc<CalibrationManager>,
    ) -> Self {
        let scheduler =
            BatchScheduler::spawn_with_events(config.scheduler.clone(), invoker, event_bus.clone());
        Self {
            scheduler,
            context: SharedSequentialContext::new(SequentialContext::from_config(&config.context)),
            calibration,
            advisor: SelfConsistencyAdvisor::new(config.self_consistency.clone()),
            event_bus,
            last_trend: Mutex::new(Trend::Stable),
        }
    }

    pub fn scheduler(&self) -> &BatchScheduler {
        &self.scheduler
    }

    pub fn context(&self) -> &SharedSequentialContext {
        &self.context
    }

    pub fn calibration(&self) -> &Arc<CalibrationManager> {
        &self.calibration
    }

    pub fn goal_context(&self) -> GoalContext {
        GoalContext::from_patterns(&self.context.identify_patterns(), self.context.len())
    }

    /// Resolve a goal against the session as it stands now
    pub fn resolve_goal(&self, goal: &Goal) -> Result<ResolvedGoal, JudgmentError> {
        goal.resolve(&self.goal_context())
    }

    /// Resolve `goal` once, attach it to the request and submit
    pub async fn submit_with_goal(
        &self,
        request: JudgmentRequest,
        goal: &Goal,
    ) -> Result<PipelineOutcome, SchedulerError> {
        let resolved = self.resolve_goal(goal)?;
        self.submit_judgment_request(request.with_goal(resolved)).await
    }

    /// Submit a request and wait for it to be judged and recorded
    pub async fn submit_judgment_request(
        &self,
        request: JudgmentRequest,
    ) -> Result<PipelineOutcome, SchedulerError> {
        let requested_at = request.requested_at;
        let origin = request.origin.clone();
        let human_label = request.human_score.map(|score| (score, request.evaluator_id.clone()));
        let importance = request.importance;
        let blocks_use = request.blocks_use;

        let handle = self.scheduler.submit(request)?;
        let result = handle.result().await?;

        let record = JudgmentRecord::new(result.outcome.score, result.outcome.issues.clone(), requested_at)?
            .with_origin(origin);
        let decision_id = self.context.add_decision(record);
        let trend = self.observe_trend();

        let calibration_sample = match (result.outcome.score, human_label) {
            (Some(automated), Some((human, evaluator_id))) => {
                Some(self.record_calibration(automated, human, evaluator_id)?)
            }
            _ => None,
        };

        let self_consistency = self.advisor.decide(importance, blocks_use, &result.outcome);
        if self_consistency.recommended {
            debug!(
                request_id = %result.request_id,
                samples = self_consistency.samples,
                reason = ?self_consistency.reason,
                "Self-consistency recommended"
            );
        }

        Ok(PipelineOutcome {
            result,
            decision_id,
            trend,
            calibration_sample,
            self_consistency,
        })
    }

    /// Drain queued requests and stop the scheduler
    pub async fn shutdown(&self) {
        self.scheduler.shutdown().await;
    }

    fn observe_trend(&self) -> Trend {
        let current = self.context.identify_patterns().trend;
        let previous = std::mem::replace(&mut *self.last_trend.lock(), current);
        if previous != current {
            info!(%previous, %current, "Judgment trend changed");
            self.event_bus.publish_context_event(ContextEvent::TrendChanged {
                previous,
                current,
                history_len: self.context.len(),
                changed_at: Utc::now(),
            });
        }
        current
    }

    fn record_calibration(
        &self,
        automated: f64,
        human: f64,
        evaluator_id: Option<String>,
    ) -> Result<RecordedSample, JudgmentError> {
        let recorded = self.calibration.record_sample(automated, human, evaluator_id)?;
        self.event_bus.publish_calibration_event(CalibrationEvent::SampleRecorded {
            sample_id: recorded.id,
            automated_score: automated,
            human_score: human,
            sample_count: recorded.sample_count,
        });

        if recorded.threshold_reached {
            let status = self.calibration.status();
            self.event_bus.publish_calibration_event(CalibrationEvent::ThresholdReached {
                sample_count: status.sample_count,
                correlation: status.correlation,
                mae: status.mae,
                reached_at: Utc::now(),
            });
        }
        Ok(recorded)
    }
}
