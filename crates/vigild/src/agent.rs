//! Agent mode: supervise one task described by a task file.
//!
//! In this mode, the daemon:
//! 1. Loads and validates the task file
//! 2. Runs `pre_launch` hooks, launches the task, runs `post_launch` hooks
//! 3. Starts the health monitor if a health check is configured
//! 4. Waits for the task to exit or for a shutdown signal
//! 5. Stops the monitor and runs `on_remove` hooks

use std::future::Future;
use std::path::Path;
use std::process::ExitStatus;
use std::sync::Arc;

use tracing::info;

use vigil_core::TaskFile;
use vigil_health::{HealthMonitor, StatusReporter, TaskSupervisor};
use vigil_hooks::{Hooks, TaskContext, TaskLifecycleHook};

use crate::reporter::JsonLinesReporter;
use crate::supervisor::LocalSupervisor;

/// Run the task file at `path` until the task exits or Ctrl-C.
pub async fn run_agent(path: &Path) -> anyhow::Result<ExitStatus> {
    let file = TaskFile::from_file(path)?;
    info!(path = %path.display(), task_id = %file.task.id(), "task file loaded");

    let task = TaskContext::new(file.task.id(), &file.task.name);
    let hooks = Arc::new(Hooks::from_config(&file.hooks));
    let reporter = Arc::new(JsonLinesReporter::stdout(task, hooks.clone()));

    run_task(&file, hooks, reporter, async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    })
    .await
}

pub async fn run_task(
    file: &TaskFile,
    hooks: Arc<Hooks>,
    reporter: Arc<dyn StatusReporter>,
    shutdown: impl Future<Output = ()>,
) -> anyhow::Result<ExitStatus> {
    let check = file.health_check()?;
    let task = TaskContext::new(file.task.id(), &file.task.name);

    // ── Launch ───────────────────────────────────────────────────
    hooks.pre_launch(&task);
    let (supervisor, mut child) = LocalSupervisor::launch(&file.task)?;
    let supervisor = Arc::new(supervisor);
    hooks.post_launch(&task);

    // ── Health monitor ───────────────────────────────────────────
    let monitor = HealthMonitor::new(reporter);
    match &check {
        Some(check) => {
            monitor
                .start_monitor(&task.id, check, supervisor.clone())
                .await;
        }
        None => info!(task_id = %task.id, "no health check configured"),
    }

    // ── Wait for exit or shutdown ────────────────────────────────
    tokio::pin!(shutdown);
    let status = tokio::select! {
        status = supervisor.wait(&mut child) => status?,
        _ = &mut shutdown => {
            info!("shutdown signal received");
            monitor.stop_monitor(&task.id).await;
            supervisor.kill_task("agent shutting down");
            supervisor.wait(&mut child).await?
        }
    };

    monitor.stop_all().await;
    hooks.on_remove(&task);

    info!(
        task_id = %task.id,
        %status,
        killed = supervisor.is_killed(),
        "task exited"
    );
    Ok(status)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::process::ExitStatusExt;
    use std::time::Duration;

    use tokio::sync::mpsc;
    use vigil_health::HealthReport;

    async fn run_with_channel(
        file: &TaskFile,
        shutdown: impl Future<Output = ()>,
    ) -> (ExitStatus, Vec<HealthReport>) {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let hooks = Arc::new(Hooks::from_config(&file.hooks));
        let status = tokio::time::timeout(
            Duration::from_secs(20),
            run_task(file, hooks, Arc::new(tx), shutdown),
        )
        .await
        .expect("task did not finish")
        .unwrap();

        let mut reports = Vec::new();
        while let Ok(report) = rx.try_recv() {
            reports.push(report);
        }
        (status, reports)
    }

    #[tokio::test]
    async fn failing_health_check_kills_task() {
        let file = TaskFile::parse(
            r#"
[task]
id = "web-1"
name = "web"
command = "sleep 120"
kill_grace_seconds = 1

[health_check]
type = "command"
delay_seconds = 0
interval_seconds = 0.1
grace_period_seconds = 0
consecutive_failures = 2
command = { value = "exit 1" }

[[hooks]]
type = "log"
"#,
        )
        .unwrap();

        let (status, reports) = run_with_channel(&file, std::future::pending()).await;

        assert_eq!(status.signal(), Some(libc::SIGTERM));
        assert_eq!(reports.len(), 3);
        assert_eq!(reports[0].consecutive_failures, 1);
        assert_eq!(reports[1].consecutive_failures, 2);
        assert!(reports[2].terminated);
        assert!(reports.iter().all(|r| r.task_id == "web-1" && !r.healthy));
    }

    #[tokio::test]
    async fn task_exit_stops_monitoring() {
        let file = TaskFile::parse(
            r#"
[task]
name = "short"
command = "exit 7"

[health_check]
type = "tcp"
delay_seconds = 60
tcp = { port = 1 }
"#,
        )
        .unwrap();

        let (status, reports) = run_with_channel(&file, std::future::pending()).await;
        assert_eq!(status.code(), Some(7));
        assert!(reports.is_empty());
    }

    #[tokio::test]
    async fn shutdown_kills_task() {
        let file = TaskFile::parse(
            r#"
[task]
name = "sleeper"
command = "sleep 120"
"#,
        )
        .unwrap();

        let shutdown = tokio::time::sleep(Duration::from_millis(200));
        let (status, reports) = run_with_channel(&file, shutdown).await;
        assert!(!status.success());
        assert!(reports.is_empty());
    }
}
