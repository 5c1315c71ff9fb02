//! Per-session flood control.
//!
//! Each traffic class has its own window. A datagram over the limit is
//! dropped and leaves a warning; enough warnings inside the warnings window
//! and the session is handed to the penalty policy.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use sluice_protocol::TrafficClass;

use crate::config::{RateLimitConfig, WindowLimit};

/// A fixed-length window that restarts on the first hit after it lapses.
#[derive(Debug, Clone)]
pub struct SlidingWindow {
    started_at: Option<Instant>,
    count: u32,
    limit: WindowLimit,
}

impl SlidingWindow {
    pub fn new(limit: WindowLimit) -> Self {
        Self {
            started_at: None,
            count: 0,
            limit,
        }
    }

    /// Counts one datagram. Returns `false` if it is over the limit.
    ///
    /// The window restarts only when strictly more than its length has
    /// passed since it started.
    pub fn hit(&mut self, now: Instant) -> bool {
        let lapsed = match self.started_at {
            Some(start) => now.saturating_duration_since(start) > self.limit.window(),
            None => true,
        };
        if lapsed {
            self.started_at = Some(now);
            self.count = 0;
        }
        self.count += 1;
        self.count <= self.limit.max_count
    }

    pub fn count(&self) -> u32 {
        self.count
    }
}

/// What to do with a datagram after rate checking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    Accept,
    /// Over the limit. Drop it; `warnings` is the count inside the window.
    Drop { warnings: usize },
    /// Too many warnings. Apply the penalty policy.
    Penalize,
}

#[derive(Debug, Clone)]
pub struct RateLimiter {
    reliable: SlidingWindow,
    unreliable: SlidingWindow,
    warnings: VecDeque<Instant>,
    warnings_window: Duration,
    max_warnings: usize,
}

impl RateLimiter {
    pub fn new(config: &RateLimitConfig) -> Self {
        Self {
            reliable: SlidingWindow::new(config.reliable),
            unreliable: SlidingWindow::new(config.unreliable),
            warnings: VecDeque::new(),
            warnings_window: config.warnings_window(),
            max_warnings: config.max_warnings,
        }
    }

    pub fn check(&mut self, class: TrafficClass, now: Instant) -> RateDecision {
        let window = match class {
            TrafficClass::Reliable => &mut self.reliable,
            TrafficClass::Unreliable => &mut self.unreliable,
        };
        if window.hit(now) {
            return RateDecision::Accept;
        }

        while let Some(&oldest) = self.warnings.front() {
            if now.saturating_duration_since(oldest) > self.warnings_window {
                self.warnings.pop_front();
            } else {
                break;
            }
        }
        self.warnings.push_back(now);

        if self.warnings.len() >= self.max_warnings {
            self.warnings.clear();
            RateDecision::Penalize
        } else {
            RateDecision::Drop {
                warnings: self.warnings.len(),
            }
        }
    }

    pub fn warning_count(&self) -> usize {
        self.warnings.len()
    }
}
