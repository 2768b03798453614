//! Per-task health state machine.
//!
//! The tracker decides what each probe outcome means: masked by the grace
//! period, reported, or escalated to a kill. It owns no timers; the monitor
//! loop feeds it outcomes together with the time elapsed since task start.

use std::time::Duration;

use tracing::{debug, warn};

use vigil_core::HealthCheck;

use crate::checker::ProbeOutcome;

/// Monitor lifecycle phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Waiting out the initial delay. No probes run.
    Pending,
    /// Probing every interval.
    Monitoring,
    /// Escalated. No further probes.
    Terminal,
}

/// What the monitor should do with a probe outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Failure inside the grace period before any success. Drop it.
    Masked,
    /// Report healthy.
    Healthy,
    /// Report unhealthy.
    Unhealthy { consecutive_failures: u32 },
    /// Report unhealthy, kill the task, then report termination.
    Escalate { consecutive_failures: u32 },
}

/// Tracks grace-period masking and consecutive failures for one task.
#[derive(Debug)]
pub struct HealthTracker {
    phase: Phase,
    delay: Duration,
    grace_period: Duration,
    /// Failures before escalation. 0 never escalates.
    threshold: u32,
    /// Sticky once set; ends grace-period masking.
    ever_succeeded: bool,
    consecutive_failures: u32,
    /// Last value reported. Informational only.
    last_reported_healthy: Option<bool>,
}

impl HealthTracker {
    /// Create a tracker for a validated health check.
    pub fn new(check: &HealthCheck) -> Self {
        Self::with_policy(check.delay, check.grace_period, check.consecutive_failures)
    }

    /// Create a tracker with explicit timing and threshold.
    pub fn with_policy(delay: Duration, grace_period: Duration, threshold: u32) -> Self {
        Self {
            phase: Phase::Pending,
            delay,
            grace_period,
            threshold,
            ever_succeeded: false,
            consecutive_failures: 0,
            last_reported_healthy: None,
        }
    }

    /// While pending, return how long to wait before the first probe.
    ///
    /// Moves to `Monitoring` once the delay has elapsed.
    pub fn pending_delay(&mut self, elapsed: Duration) -> Option<Duration> {
        if self.phase != Phase::Pending {
            return None;
        }
        if elapsed < self.delay {
            return Some(self.delay - elapsed);
        }
        self.phase = Phase::Monitoring;
        None
    }

    /// Whether a failure observed now would be masked.
    pub fn within_grace(&self, elapsed: Duration) -> bool {
        elapsed < self.grace_period && !self.ever_succeeded
    }

    /// Record a probe outcome observed `elapsed` after task start.
    ///
    /// Successes are never masked. Once the tracker is terminal every
    /// outcome is masked.
    pub fn record(&mut self, outcome: &ProbeOutcome, elapsed: Duration) -> Verdict {
        match self.phase {
            Phase::Terminal => return Verdict::Masked,
            Phase::Pending => self.phase = Phase::Monitoring,
            Phase::Monitoring => {}
        }

        if outcome.is_healthy() {
            if self.last_reported_healthy != Some(true) {
                debug!(
                    failures = self.consecutive_failures,
                    "task became healthy"
                );
            }
            self.ever_succeeded = true;
            self.consecutive_failures = 0;
            self.last_reported_healthy = Some(true);
            return Verdict::Healthy;
        }

        if self.within_grace(elapsed) {
            debug!(?elapsed, grace = ?self.grace_period, "failure masked by grace period");
            return Verdict::Masked;
        }

        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        self.last_reported_healthy = Some(false);

        if self.threshold > 0 && self.consecutive_failures >= self.threshold {
            warn!(
                failures = self.consecutive_failures,
                threshold = self.threshold,
                "consecutive failure threshold reached"
            );
            self.phase = Phase::Terminal;
            return Verdict::Escalate {
                consecutive_failures: self.consecutive_failures,
            };
        }

        Verdict::Unhealthy {
            consecutive_failures: self.consecutive_failures,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub fn ever_succeeded(&self) -> bool {
        self.ever_succeeded
    }

    pub fn last_reported_healthy(&self) -> Option<bool> {
        self.last_reported_healthy
    }

    pub fn is_terminal(&self) -> bool {
        self.phase == Phase::Terminal
    }
}
