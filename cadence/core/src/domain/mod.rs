// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Domain Layer
//!
//! Pure types and algorithms. Nothing in here spawns tasks or performs I/O
//! apart from configuration file loading.

pub mod error;
pub mod judgment;
pub mod temporal;
pub mod window_selector;
pub mod aggregation;
pub mod batch;
pub mod goal;
pub mod calibration;
pub mod self_consistency;
pub mod events;
pub mod config;
