// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # `cadence-core` - Temporal Judgment Core
//!
//! Bookkeeping for streams of automated judgments: sequential context,
//! multi-scale temporal aggregation, batch scheduling under a concurrency cap,
//! and calibration of automated scores against human labels.
//!
//! ## Crate Layout
//!
//! | Module | Layer | Contents |
//! |--------|-------|----------|
//! | [`domain`] | Domain | Records, notes, windows, goals, calibration statistics, configuration |
//! | [`application`] | Application | `BatchScheduler`, adaptive batch sizing, `JudgmentPipeline` |
//! | [`infrastructure`] | Infrastructure | In-memory `EventBus` |
//!
//! The core never talks to a model provider. Judge calls go through the
//! [`domain::batch::JudgeInvoker`] trait supplied by the caller.

pub mod domain;
pub mod application;
pub mod infrastructure;

pub use domain::*;
