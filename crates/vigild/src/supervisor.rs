//! Local task supervisor.
//!
//! Launches the workload as a shell command in its own process group and
//! kills the whole group on request: SIGTERM first, then SIGKILL once the
//! kill grace period has passed.

use std::io;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, SystemTime};

use anyhow::Context;
use tokio::process::{Child, Command};
use tracing::{debug, error, info, warn};

use vigil_core::TaskConfig;
use vigil_health::TaskSupervisor;

pub struct LocalSupervisor {
    task_id: String,
    pgid: libc::pid_t,
    started_at: SystemTime,
    kill_grace: Duration,
    killed: AtomicBool,
    /// Set once the task has been reaped. Its pgid may be reused after that.
    exited: Arc<AtomicBool>,
}

impl LocalSupervisor {
    /// Launch the task's command. The caller owns the child and must wait on
    /// it through [`LocalSupervisor::wait`].
    pub fn launch(task: &TaskConfig) -> anyhow::Result<(Self, Child)> {
        let child = Command::new("/bin/sh")
            .arg("-c")
            .arg(&task.command)
            .envs(&task.env)
            .stdin(Stdio::null())
            .process_group(0)
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("failed to launch '{}'", task.command))?;

        let pid = child
            .id()
            .context("task exited before its pid was read")?;
        let pgid = libc::pid_t::try_from(pid).context("task pid out of range")?;

        info!(task_id = %task.id(), pid, command = %task.command, "task launched");

        let supervisor = Self {
            task_id: task.id().to_string(),
            pgid,
            started_at: SystemTime::now(),
            kill_grace: task.kill_grace(),
            killed: AtomicBool::new(false),
            exited: Arc::new(AtomicBool::new(false)),
        };
        Ok((supervisor, child))
    }

    pub fn is_killed(&self) -> bool {
        self.killed.load(Ordering::SeqCst)
    }

    /// Wait for the task to exit and record that it has been reaped.
    pub async fn wait(&self, child: &mut Child) -> io::Result<ExitStatus> {
        let status = child.wait().await;
        if status.is_ok() {
            self.exited.store(true, Ordering::SeqCst);
        }
        status
    }

    pub fn has_exited(&self) -> bool {
        self.exited.load(Ordering::SeqCst)
    }
}

/// Signal the task's process group unless the task has been reaped.
///
/// Returns whether a signal was sent.
fn signal_group(pgid: libc::pid_t, exited: &AtomicBool, signal: libc::c_int) -> io::Result<bool> {
    if exited.load(Ordering::SeqCst) {
        return Ok(false);
    }
    // SAFETY: kill(2) with a negative pid signals the process group we
    // created at launch; it has no memory-safety preconditions.
    let rc = unsafe { libc::kill(-pgid, signal) };
    if rc == 0 {
        Ok(true)
    } else {
        Err(io::Error::last_os_error())
    }
}

impl TaskSupervisor for LocalSupervisor {
    fn started_at(&self) -> SystemTime {
        self.started_at
    }

    fn kill_task(&self, reason: &str) {
        if self.killed.swap(true, Ordering::SeqCst) {
            debug!(task_id = %self.task_id, "kill already in progress");
            return;
        }

        warn!(task_id = %self.task_id, %reason, grace = ?self.kill_grace, "killing task");
        match signal_group(self.pgid, &self.exited, libc::SIGTERM) {
            Ok(true) => {}
            Ok(false) => return,
            Err(e) if e.raw_os_error() == Some(libc::ESRCH) => return,
            Err(e) => error!(task_id = %self.task_id, error = %e, "failed to send SIGTERM"),
        }

        let task_id = self.task_id.clone();
        let pgid = self.pgid;
        let grace = self.kill_grace;
        let exited = self.exited.clone();
        tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            match signal_group(pgid, &exited, libc::SIGKILL) {
                Ok(true) => info!(%task_id, "task did not exit within grace period, sent SIGKILL"),
                Ok(false) => debug!(%task_id, "task exited within grace period"),
                Err(e) if e.raw_os_error() == Some(libc::ESRCH) => {}
                Err(e) => error!(%task_id, error = %e, "failed to send SIGKILL"),
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::os::unix::process::ExitStatusExt;

    fn task(command: &str, kill_grace_seconds: f64) -> TaskConfig {
        TaskConfig {
            id: Some("task-1".into()),
            name: "test".into(),
            command: command.into(),
            env: HashMap::new(),
            kill_grace_seconds: Some(kill_grace_seconds),
        }
    }

    async fn wait(supervisor: &LocalSupervisor, child: &mut Child) -> ExitStatus {
        tokio::time::timeout(Duration::from_secs(10), supervisor.wait(child))
            .await
            .expect("task did not exit")
            .unwrap()
    }

    #[tokio::test]
    async fn launch_passes_environment() {
        let mut config = task("test \"$VIGIL_TEST\" = yes", 1.0);
        config.env.insert("VIGIL_TEST".into(), "yes".into());

        let (supervisor, mut child) = LocalSupervisor::launch(&config).unwrap();
        assert!(wait(&supervisor, &mut child).await.success());
    }

    #[tokio::test]
    async fn kill_sends_sigterm() {
        let (supervisor, mut child) = LocalSupervisor::launch(&task("sleep 120", 5.0)).unwrap();
        assert!(supervisor.started_at() <= SystemTime::now());

        supervisor.kill_task("test");
        assert!(supervisor.is_killed());

        let status = wait(&supervisor, &mut child).await;
        assert_eq!(status.signal(), Some(libc::SIGTERM));
    }

    #[tokio::test]
    async fn kill_escalates_to_sigkill() {
        let (supervisor, mut child) =
            LocalSupervisor::launch(&task("trap '' TERM; sleep 120 & wait", 0.2)).unwrap();
        // Let the shell install its trap.
        tokio::time::sleep(Duration::from_millis(200)).await;

        supervisor.kill_task("test");
        let status = wait(&supervisor, &mut child).await;
        assert_eq!(status.signal(), Some(libc::SIGKILL));
    }

    #[tokio::test]
    async fn second_kill_is_ignored() {
        let (supervisor, mut child) = LocalSupervisor::launch(&task("sleep 120", 5.0)).unwrap();
        supervisor.kill_task("first");
        supervisor.kill_task("second");
        assert!(!wait(&supervisor, &mut child).await.success());
    }

    #[tokio::test]
    async fn kill_after_exit_is_harmless() {
        let (supervisor, mut child) = LocalSupervisor::launch(&task("exit 0", 0.1)).unwrap();
        assert!(!supervisor.has_exited());
        assert!(wait(&supervisor, &mut child).await.success());
        assert!(supervisor.has_exited());

        supervisor.kill_task("late");
        assert!(supervisor.is_killed());
        tokio::time::sleep(Duration::from_millis(200)).await;
    }

    #[tokio::test]
    async fn reaped_group_is_never_signalled() {
        let (supervisor, mut child) = LocalSupervisor::launch(&task("exit 0", 0.1)).unwrap();
        wait(&supervisor, &mut child).await;

        // The pgid may already belong to another process group.
        let sent = signal_group(supervisor.pgid, &supervisor.exited, libc::SIGKILL).unwrap();
        assert!(!sent);
    }

    #[tokio::test]
    async fn live_group_is_signalled() {
        let (supervisor, mut child) = LocalSupervisor::launch(&task("sleep 120", 0.1)).unwrap();
        let sent = signal_group(supervisor.pgid, &supervisor.exited, libc::SIGKILL).unwrap();
        assert!(sent);
        assert_eq!(wait(&supervisor, &mut child).await.signal(), Some(libc::SIGKILL));
    }
}
