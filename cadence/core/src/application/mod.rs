// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod batch_scheduler;
pub mod judgment_pipeline;
pub mod latency;

pub use batch_scheduler::{BatchScheduler, JudgmentHandle, SchedulerError};
pub use judgment_pipeline::{JudgmentPipeline, PipelineOutcome};
