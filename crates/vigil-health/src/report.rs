//! Health reports and the interfaces to the supervising process.
//!
//! The monitor consumes a [`TaskSupervisor`] (task start time, kill
//! directive) and emits every health determination to a [`StatusReporter`].

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Serialize, Serializer};
use tokio::sync::mpsc;

use crate::checker::ProbeOutcome;

/// One health determination for a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthReport {
    pub task_id: String,
    pub healthy: bool,
    /// Set only on the final report of a task killed by escalation.
    pub terminated: bool,
    pub consecutive_failures: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(serialize_with = "epoch_millis")]
    pub observed_at: SystemTime,
}

impl HealthReport {
    /// Report for an unmasked probe outcome.
    pub fn from_outcome(task_id: &str, outcome: &ProbeOutcome, consecutive_failures: u32) -> Self {
        Self {
            task_id: task_id.to_string(),
            healthy: outcome.is_healthy(),
            terminated: false,
            consecutive_failures,
            error: outcome.error().map(str::to_string),
            observed_at: outcome.observed_at(),
        }
    }

    /// Final report emitted after the kill directive.
    pub fn terminated(task_id: &str, consecutive_failures: u32, reason: &str) -> Self {
        Self {
            task_id: task_id.to_string(),
            healthy: false,
            terminated: true,
            consecutive_failures,
            error: Some(reason.to_string()),
            observed_at: SystemTime::now(),
        }
    }
}

fn epoch_millis<S: Serializer>(t: &SystemTime, s: S) -> Result<S::Ok, S::Error> {
    let millis = t.duration_since(UNIX_EPOCH).unwrap_or_default().as_millis();
    s.serialize_u64(u64::try_from(millis).unwrap_or(u64::MAX))
}

/// The process that owns a task's lifecycle.
pub trait TaskSupervisor: Send + Sync {
    /// When the task started running.
    fn started_at(&self) -> SystemTime;

    /// Kill the task. Fire-and-forget: the monitor neither waits for
    /// confirmation nor retries.
    fn kill_task(&self, reason: &str);
}

/// Receives every health determination.
pub trait StatusReporter: Send + Sync {
    fn on_health_report(&self, report: HealthReport);
}

impl StatusReporter for mpsc::UnboundedSender<HealthReport> {
    fn on_health_report(&self, report: HealthReport) {
        // The receiver going away means nobody is observing anymore.
        let _ = self.send(report);
    }
}
