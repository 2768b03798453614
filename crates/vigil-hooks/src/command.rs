//! Post-launch command hook.
//!
//! Runs `<cmd> <task name>` through the shell once a task has launched.
//! The hook never blocks the launch: the command runs in the background and
//! a failure is only logged.

use std::process::Stdio;

use tokio::process::Command;
use tracing::{info, warn};

use crate::error::{HookError, HookResult};
use crate::{TaskContext, TaskLifecycleHook};

pub const DEFAULT_POST_LAUNCH_COMMAND: &str = "/usr/local/bin/linkerconfig";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostLaunchCommand {
    cmd: String,
}

impl PostLaunchCommand {
    pub fn new(cmd: impl Into<String>) -> Self {
        Self { cmd: cmd.into() }
    }

    pub fn cmd(&self) -> &str {
        &self.cmd
    }

    /// Run the command for `task_name` and wait for it to exit.
    pub async fn run(&self, task_name: &str) -> HookResult<()> {
        let cmd = format!("{} {}", self.cmd, task_name);
        info!(%cmd, "running post-launch command");

        let output = Command::new("/bin/sh")
            .arg("-c")
            .arg(&cmd)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|source| HookError::Spawn {
                cmd: cmd.clone(),
                source,
            })?;

        if output.status.success() {
            return Ok(());
        }

        let status = match output.status.code() {
            Some(code) => code.to_string(),
            None => output.status.to_string(),
        };
        Err(HookError::Failed {
            cmd,
            status,
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

impl Default for PostLaunchCommand {
    fn default() -> Self {
        Self::new(DEFAULT_POST_LAUNCH_COMMAND)
    }
}

impl TaskLifecycleHook for PostLaunchCommand {
    fn post_launch(&self, task: &TaskContext) {
        let hook = self.clone();
        let task_id = task.id.clone();
        let task_name = task.name.clone();
        tokio::spawn(async move {
            if let Err(e) = hook.run(&task_name).await {
                warn!(%task_id, error = %e, "post-launch hook failed");
            }
        });
    }
}
