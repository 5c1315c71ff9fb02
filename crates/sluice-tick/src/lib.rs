//! Fixed-interval sweep timer for Sluice.
//!
//! The session layer needs one process-wide periodic pass over every live
//! session: resend overdue reliable packets, send keepalive pings, time out
//! unresponsive peers and purge expired bans. This crate provides the timer
//! that drives that pass, with overrun handling and budget monitoring.
//!
//! # Disabled mode
//!
//! When `interval` is zero, [`SweepScheduler::wait_for_sweep`] pends forever.
//! Nothing is ever retransmitted in that mode, which is only useful in tests
//! that drive sweeps by hand.
//!
//! # Integration
//!
//! The scheduler sits inside the server's `tokio::select!` loop:
//!
//! ```ignore
//! loop {
//!     tokio::select! {
//!         recv = socket.recv_from(&mut buf) => { /* handle datagram */ }
//!         _ = scheduler.wait_for_sweep() => {
//!             let visited = endpoint.session_count();
//!             let events = endpoint.sweep(Instant::now());
//!             scheduler.record_sweep_end(visited);
//!             /* dispatch events */
//!         }
//!     }
//! }
//! ```

use std::time::{Duration, Instant};

use rand::Rng;
use tokio::time::{self, Instant as TokioInstant};
use tracing::{debug, trace, warn};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// What to do when a sweep wakes up later than scheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MissedSweepPolicy {
    /// Schedule the next sweep one interval from now. Missed sweeps are
    /// counted but never run.
    #[default]
    Skip,
    /// Keep the original cadence. The next sweep fires at its originally
    /// scheduled time, which may be immediately.
    Keep,
}

/// Full configuration for the sweep scheduler.
#[derive(Debug, Clone)]
pub struct SweepConfig {
    /// Time between sweeps. Zero disables the timer.
    pub interval: Duration,
    /// Overrun handling policy.
    pub policy: MissedSweepPolicy,
    /// Fraction of `interval` (0.0–1.0) a sweep may take before a warning
    /// is logged. Default: 0.25.
    pub budget_warn_threshold: f64,
    /// Random jitter (0–max) added to the first sweep so several servers
    /// started together do not sweep in lockstep.
    pub initial_jitter: Duration,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(2000),
            policy: MissedSweepPolicy::default(),
            budget_warn_threshold: 0.25,
            initial_jitter: Duration::from_millis(50),
        }
    }
}

impl SweepConfig {
    /// Shortest interval accepted. Anything below is raised to this.
    pub const MIN_INTERVAL: Duration = Duration::from_millis(10);

    /// A config with the given interval and default settings otherwise.
    pub fn every(interval: Duration) -> Self {
        Self {
            interval,
            ..Default::default()
        }
    }

    /// A config whose timer never fires.
    pub fn disabled() -> Self {
        Self::every(Duration::ZERO)
    }

    /// Clamp out-of-range values so the config is safe to use.
    ///
    /// Called automatically by [`SweepScheduler::new`].
    pub fn validated(mut self) -> Self {
        if !self.interval.is_zero() && self.interval < Self::MIN_INTERVAL {
            warn!(
                interval_ms = self.interval.as_millis() as u64,
                min_ms = Self::MIN_INTERVAL.as_millis() as u64,
                "sweep interval below minimum, raising"
            );
            self.interval = Self::MIN_INTERVAL;
        }
        self.budget_warn_threshold = self.budget_warn_threshold.clamp(0.0, 1.0);
        self
    }

    pub fn is_disabled(&self) -> bool {
        self.interval.is_zero()
    }
}

// ---------------------------------------------------------------------------
// Sweep info
// ---------------------------------------------------------------------------

/// Returned by [`SweepScheduler::wait_for_sweep`] each time a sweep is due.
#[derive(Debug, Clone)]
pub struct SweepInfo {
    /// Monotonically increasing sweep number (starts at 1).
    pub sweep: u64,
    /// How late the timer woke up relative to its deadline.
    pub late_by: Duration,
    /// Sweeps that were due but skipped because the loop was behind.
    pub skipped: u64,
}

// ---------------------------------------------------------------------------
// Metrics
// ---------------------------------------------------------------------------

/// Runtime metrics for the sweep scheduler.
#[derive(Debug, Clone, Default)]
pub struct SweepMetrics {
    pub total_sweeps: u64,
    /// Sweeps that woke up more than a tenth of an interval late.
    pub total_overruns: u64,
    pub total_skipped: u64,
    /// Exponential moving average of sweep execution time (α = 0.1).
    pub avg_sweep_time: Duration,
    pub max_sweep_time: Duration,
    /// Sessions visited by the most recent sweep.
    pub last_sessions_visited: usize,
    /// Last sweep time divided by the interval.
    pub budget_utilization: f64,
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

/// Fixed-interval timer driving the retransmission sweep.
pub struct SweepScheduler {
    config: SweepConfig,
    sweep_count: u64,
    next_sweep: Option<TokioInstant>,
    /// Set by `wait_for_sweep`, consumed by `record_sweep_end`.
    sweep_start: Option<Instant>,
    metrics: SweepMetrics,
}

impl SweepScheduler {
    /// Create a new scheduler from config.
    pub fn new(config: SweepConfig) -> Self {
        let config = config.validated();

        let next_sweep = if config.is_disabled() {
            debug!("sweep scheduler created disabled");
            None
        } else {
            let jitter = if config.initial_jitter.is_zero() {
                Duration::ZERO
            } else {
                let max = config.initial_jitter.as_micros() as u64;
                Duration::from_micros(rand::rng().random_range(0..max.max(1)))
            };
            debug!(
                interval_ms = config.interval.as_millis() as u64,
                policy = ?config.policy,
                "sweep scheduler created"
            );
            Some(TokioInstant::now() + config.interval + jitter)
        };

        Self {
            config,
            sweep_count: 0,
            next_sweep,
            sweep_start: None,
            metrics: SweepMetrics::default(),
        }
    }

    /// Create a scheduler with the given interval and default settings.
    pub fn every(interval: Duration) -> Self {
        Self::new(SweepConfig::every(interval))
    }

    /// Wait until the next sweep is due.
    ///
    /// Cancel-safe: if the future is dropped by `select!` the deadline is
    /// unchanged and the next call waits for the same instant.
    pub async fn wait_for_sweep(&mut self) -> SweepInfo {
        let Some(next) = self.next_sweep else {
            return std::future::pending().await;
        };
        let interval = self.config.interval;

        time::sleep_until(next).await;

        let now = TokioInstant::now();
        self.sweep_count += 1;
        self.sweep_start = Some(Instant::now());

        let late_by = now.saturating_duration_since(next);
        let overrun = late_by > interval / 10;
        let mut skipped = 0u64;

        self.next_sweep = Some(match self.config.policy {
            MissedSweepPolicy::Skip => {
                if overrun {
                    skipped = (late_by.as_nanos() / interval.as_nanos()) as u64;
                    if skipped > 0 {
                        warn!(
                            sweep = self.sweep_count,
                            skipped,
                            late_ms = late_by.as_secs_f64() * 1000.0,
                            "sweep overrun, skipping ahead"
                        );
                    }
                }
                now + interval
            }
            MissedSweepPolicy::Keep => {
                if overrun {
                    warn!(
                        sweep = self.sweep_count,
                        late_ms = late_by.as_secs_f64() * 1000.0,
                        "sweep overrun, keeping cadence"
                    );
                }
                next + interval
            }
        });

        if overrun {
            self.metrics.total_overruns += 1;
        }
        self.metrics.total_skipped += skipped;
        self.metrics.total_sweeps += 1;

        trace!(sweep = self.sweep_count, overrun, "sweep due");

        SweepInfo {
            sweep: self.sweep_count,
            late_by,
            skipped,
        }
    }

    /// Record that the sweep for the current tick has finished.
    ///
    /// `sessions_visited` is reported in metrics and logs only.
    pub fn record_sweep_end(&mut self, sessions_visited: usize) {
        let Some(start) = self.sweep_start.take() else {
            return;
        };
        let elapsed = start.elapsed();
        self.metrics.last_sessions_visited = sessions_visited;

        if !self.config.is_disabled() {
            let utilization = elapsed.as_secs_f64() / self.config.interval.as_secs_f64();
            self.metrics.budget_utilization = utilization;
            if utilization >= self.config.budget_warn_threshold {
                warn!(
                    sweep = self.sweep_count,
                    sessions_visited,
                    elapsed_ms = elapsed.as_secs_f64() * 1000.0,
                    utilization_pct = format!("{:.1}", utilization * 100.0),
                    "sweep took a large share of its interval"
                );
            }
        }

        if elapsed > self.metrics.max_sweep_time {
            self.metrics.max_sweep_time = elapsed;
        }
        let alpha = 0.1;
        let prev = self.metrics.avg_sweep_time.as_secs_f64();
        self.metrics.avg_sweep_time =
            Duration::from_secs_f64(prev * (1.0 - alpha) + elapsed.as_secs_f64() * alpha);
    }

    pub fn is_disabled(&self) -> bool {
        self.next_sweep.is_none()
    }

    pub fn sweep_count(&self) -> u64 {
        self.sweep_count
    }

    pub fn interval(&self) -> Duration {
        self.config.interval
    }

    /// Snapshot of current metrics.
    pub fn metrics(&self) -> &SweepMetrics {
        &self.metrics
    }
}
