//! Health monitor: background tasks that run health checks for tasks.
//!
//! The `HealthMonitor` spawns a background task per running task that
//! waits out the initial delay, probes every interval, and reports each
//! unmasked outcome. When consecutive failures reach the threshold it
//! asks the supervisor to kill the task and stops.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use tokio::sync::{watch, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use vigil_core::HealthCheck;

use crate::checker::{CheckProber, Prober};
use crate::report::{HealthReport, StatusReporter, TaskSupervisor};
use crate::tracker::{HealthTracker, Verdict};

/// Probe timeout used when a health check does not set one.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(20);

/// Settings shared by every monitor started from one `HealthMonitor`.
#[derive(Debug, Clone)]
pub struct MonitorOptions {
    /// Timeout for health checks without `timeout_seconds`.
    pub default_timeout: Duration,
}

impl Default for MonitorOptions {
    fn default() -> Self {
        Self {
            default_timeout: DEFAULT_TIMEOUT,
        }
    }
}

/// Per-task monitor state.
struct MonitorSlot {
    /// Handle to the background check task.
    handle: JoinHandle<()>,
    /// Shutdown signal for this monitor.
    shutdown_tx: watch::Sender<bool>,
}

/// Manages health check monitors for all running tasks.
pub struct HealthMonitor {
    reporter: Arc<dyn StatusReporter>,
    options: MonitorOptions,
    /// Active monitors: task_id → slot.
    monitors: Arc<RwLock<HashMap<String, MonitorSlot>>>,
}

impl HealthMonitor {
    /// Create a new health monitor reporting to `reporter`.
    pub fn new(reporter: Arc<dyn StatusReporter>) -> Self {
        Self {
            reporter,
            options: MonitorOptions::default(),
            monitors: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn with_options(mut self, options: MonitorOptions) -> Self {
        self.options = options;
        self
    }

    /// Start monitoring a task with its configured probe.
    pub async fn start_monitor(
        &self,
        task_id: &str,
        check: &HealthCheck,
        supervisor: Arc<dyn TaskSupervisor>,
    ) {
        let prober = CheckProber::new(check.check.clone());
        self.start_with_prober(task_id, check, prober, supervisor)
            .await;
    }

    /// Start monitoring a task with a custom prober.
    ///
    /// Replaces any monitor already running for `task_id`.
    pub async fn start_with_prober<P: Prober>(
        &self,
        task_id: &str,
        check: &HealthCheck,
        prober: P,
        supervisor: Arc<dyn TaskSupervisor>,
    ) {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let task_id_owned = task_id.to_string();
        let kind = check.kind();
        let timeout = check.timeout.unwrap_or(self.options.default_timeout);
        let check = check.clone();
        let reporter = self.reporter.clone();

        let handle = tokio::spawn(async move {
            run_health_loop(
                &task_id_owned,
                &check,
                &prober,
                timeout,
                supervisor.as_ref(),
                reporter.as_ref(),
                shutdown_rx,
            )
            .await;
        });

        let mut monitors = self.monitors.write().await;
        if let Some(old) = monitors.insert(
            task_id.to_string(),
            MonitorSlot {
                handle,
                shutdown_tx,
            },
        ) {
            // Stop the old monitor if one was running.
            let _ = old.shutdown_tx.send(true);
            old.handle.abort();
        }

        info!(%task_id, %kind, ?timeout, "health monitor started");
    }

    /// Stop monitoring a task. Any in-flight probe is cancelled.
    pub async fn stop_monitor(&self, task_id: &str) {
        let mut monitors = self.monitors.write().await;
        if let Some(slot) = monitors.remove(task_id) {
            let _ = slot.shutdown_tx.send(true);
            slot.handle.abort();
            info!(%task_id, "health monitor stopped");
        }
    }

    /// Wait for a task's monitor to finish on its own, i.e. after it
    /// escalated. Returns immediately if the task has no monitor.
    ///
    /// The monitor is removed from the registry.
    pub async fn wait(&self, task_id: &str) {
        let slot = self.monitors.write().await.remove(task_id);
        if let Some(slot) = slot {
            // Keep the sender alive so the loop is not told to shut down.
            let _shutdown_tx = slot.shutdown_tx;
            if let Err(e) = slot.handle.await {
                if !e.is_cancelled() {
                    warn!(%task_id, error = %e, "health monitor panicked");
                }
            }
        }
    }

    /// Stop all monitors (for graceful shutdown).
    pub async fn stop_all(&self) {
        let mut monitors = self.monitors.write().await;
        for (id, slot) in monitors.drain() {
            let _ = slot.shutdown_tx.send(true);
            slot.handle.abort();
            debug!(task_id = %id, "health monitor stopped");
        }
        info!("all health monitors stopped");
    }

    /// List task IDs whose monitors are still running.
    ///
    /// Monitors that escalated have finished and are not listed.
    pub async fn active_monitors(&self) -> Vec<String> {
        let monitors = self.monitors.read().await;
        monitors
            .iter()
            .filter(|(_, slot)| !slot.handle.is_finished())
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// Check if a task has a running monitor.
    pub async fn is_monitoring(&self, task_id: &str) -> bool {
        let monitors = self.monitors.read().await;
        monitors
            .get(task_id)
            .is_some_and(|slot| !slot.handle.is_finished())
    }
}

/// The health check loop for a single task.
///
/// Ticks are strictly sequential: the next probe is scheduled only after
/// the previous one, and its reports, have completed.
pub(crate) async fn run_health_loop<P: Prober>(
    task_id: &str,
    check: &HealthCheck,
    prober: &P,
    timeout: Duration,
    supervisor: &dyn TaskSupervisor,
    reporter: &dyn StatusReporter,
    mut shutdown: watch::Receiver<bool>,
) {
    let started_at = supervisor.started_at();
    let mut tracker = HealthTracker::new(check);
    let mut wait = Duration::ZERO;

    debug!(%task_id, kind = %check.kind(), "health loop starting");

    loop {
        if *shutdown.borrow() {
            break;
        }

        if wait.is_zero() {
            // Zero interval still yields so other tasks make progress.
            tokio::task::yield_now().await;
        } else {
            tokio::select! {
                _ = tokio::time::sleep(wait) => {}
                _ = shutdown.changed() => {
                    debug!(%task_id, "health loop shutting down");
                    break;
                }
            }
        }

        if let Some(remaining) = tracker.pending_delay(elapsed_since(started_at)) {
            wait = remaining;
            continue;
        }

        let outcome = tokio::select! {
            outcome = prober.probe(timeout) => outcome,
            _ = shutdown.changed() => {
                debug!(%task_id, "health loop shutting down, probe cancelled");
                break;
            }
        };

        match tracker.record(&outcome, elapsed_since(started_at)) {
            Verdict::Masked => {}
            Verdict::Healthy => {
                reporter.on_health_report(HealthReport::from_outcome(task_id, &outcome, 0));
            }
            Verdict::Unhealthy {
                consecutive_failures,
            } => {
                debug!(
                    %task_id,
                    failures = consecutive_failures,
                    error = outcome.error().unwrap_or_default(),
                    "health check failed"
                );
                reporter.on_health_report(HealthReport::from_outcome(
                    task_id,
                    &outcome,
                    consecutive_failures,
                ));
            }
            Verdict::Escalate {
                consecutive_failures,
            } => {
                reporter.on_health_report(HealthReport::from_outcome(
                    task_id,
                    &outcome,
                    consecutive_failures,
                ));

                let reason =
                    format!("health check failed {consecutive_failures} times consecutively");
                warn!(%task_id, %reason, "killing task");
                supervisor.kill_task(&reason);
                reporter.on_health_report(HealthReport::terminated(
                    task_id,
                    consecutive_failures,
                    &reason,
                ));
                break;
            }
        }

        wait = check.interval;
    }

    debug!(%task_id, phase = ?tracker.phase(), "health loop stopped");
}

fn elapsed_since(started_at: SystemTime) -> Duration {
    SystemTime::now()
        .duration_since(started_at)
        .unwrap_or_default()
}
