// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Latency-driven batch sizing: additive increase while batches finish under
//! the target latency, multiplicative decrease when they overrun it.

use std::time::Duration;

use crate::domain::config::LatencyConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SizeAdjustment {
    pub previous: usize,
    pub next: usize,
}

impl SizeAdjustment {
    pub fn changed(&self) -> bool {
        self.previous != self.next
    }
}

#[derive(Debug, Clone)]
pub struct AdaptiveBatchSize {
    current: usize,
    min: usize,
    max: usize,
    target: Duration,
}

impl AdaptiveBatchSize {
    /// Start at `initial`, clamped into the configured bounds
    pub fn new(initial: usize, config: &LatencyConfig) -> Self {
        let min = config.min_batch_size.max(1);
        let max = config.max_batch_size.max(min);
        Self {
            current: initial.clamp(min, max),
            min,
            max,
            target: config.target_latency,
        }
    }

    pub fn current(&self) -> usize {
        self.current
    }

    pub fn observe(&mut self, latency: Duration) -> SizeAdjustment {
        let previous = self.current;
        self.current = if latency <= self.target {
            (self.current + 1).min(self.max)
        } else {
            (self.current / 2).max(self.min)
        };
        SizeAdjustment {
            previous,
            next: self.current,
        }
    }
}
