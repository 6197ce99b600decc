// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::batch::{BatchId, RequestId};
use crate::domain::calibration::SampleId;
use crate::domain::judgment::Trend;

/// Batch lifecycle as seen by observers of the scheduler.
///
/// `in_flight` on `BatchStarted` counts the starting batch, so a subscriber
/// can check the concurrency bound without any other state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SchedulerEvent {
    BatchStarted {
        batch_id: BatchId,
        request_ids: Vec<RequestId>,
        in_flight: usize,
        started_at: DateTime<Utc>,
    },
    BatchCompleted {
        batch_id: BatchId,
        size: usize,
        succeeded: usize,
        failed: usize,
        latency_ms: u64,
        completed_at: DateTime<Utc>,
    },
    BatchRetried {
        batch_id: BatchId,
        attempt: u32,
        pending: usize,
        backoff_ms: u64,
    },
    RequestCompleted {
        batch_id: BatchId,
        request_id: RequestId,
        completed_at: DateTime<Utc>,
    },
    RequestFailed {
        batch_id: BatchId,
        request_id: RequestId,
        reason: String,
    },
    BatchSizeAdjusted {
        previous: usize,
        next: usize,
        latency_ms: u64,
    },
    /// Queue timeout elapsed before the request was dispatched
    RequestExpired {
        request_id: RequestId,
        waited_ms: u64,
    },
}

impl SchedulerEvent {
    pub fn batch_id(&self) -> Option<BatchId> {
        match self {
            SchedulerEvent::BatchStarted { batch_id, .. }
            | SchedulerEvent::BatchCompleted { batch_id, .. }
            | SchedulerEvent::BatchRetried { batch_id, .. }
            | SchedulerEvent::RequestCompleted { batch_id, .. }
            | SchedulerEvent::RequestFailed { batch_id, .. } => Some(*batch_id),
            SchedulerEvent::BatchSizeAdjusted { .. } | SchedulerEvent::RequestExpired { .. } => {
                None
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CalibrationEvent {
    SampleRecorded {
        sample_id: SampleId,
        automated_score: f64,
        human_score: f64,
        sample_count: usize,
    },
    ThresholdReached {
        sample_count: usize,
        correlation: Option<f64>,
        mae: Option<f64>,
        reached_at: DateTime<Utc>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ContextEvent {
    TrendChanged {
        previous: Trend,
        current: Trend,
        history_len: usize,
        changed_at: DateTime<Utc>,
    },
}
