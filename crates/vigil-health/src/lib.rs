//! vigil-health: health monitoring for supervised tasks.
//!
//! Runs a background task per supervised task that probes it with a
//! command, HTTP, or TCP check, masks early failures during the grace
//! period, and asks the supervisor to kill the task once consecutive
//! failures reach the configured threshold.
//!
//! # Architecture
//!
//! ```text
//! HealthMonitor
//!   ├── Per-task background task (run_health_loop)
//!   │   ├── HealthTracker (phase, grace masking, consecutive failures)
//!   │   ├── Prober::probe() → ProbeOutcome
//!   │   └── StatusReporter::on_health_report(HealthReport)
//!   └── TaskSupervisor (start time, kill directive)
//! ```
//!
//! # Escalation
//!
//! When a task reaches `consecutive_failures` unmasked failures in a row
//! the monitor reports the failure, issues a single kill directive, emits
//! a final `terminated` report, and stops. A threshold of 0 never kills.

pub mod checker;
pub mod monitor;
pub mod report;
pub mod tls;
pub mod tracker;

pub use checker::{CheckProber, ProbeOutcome, Prober};
pub use monitor::{HealthMonitor, MonitorOptions};
pub use report::{HealthReport, StatusReporter, TaskSupervisor};
pub use tracker::{HealthTracker, Phase, Verdict};
