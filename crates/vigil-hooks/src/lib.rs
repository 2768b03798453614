//! vigil-hooks: task lifecycle hooks.
//!
//! Hooks run at a fixed set of points in a task's life: before launch,
//! after launch, on each health report, and on removal. The set of hook
//! strategies is closed; each is configured in the task file and built
//! into a [`Hook`] at startup.

pub mod command;
pub mod error;

use tracing::info;

use vigil_core::HookConfig;
use vigil_health::HealthReport;

pub use command::PostLaunchCommand;
pub use error::{HookError, HookResult};

/// The task a hook is invoked for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskContext {
    pub id: String,
    pub name: String,
}

impl TaskContext {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

/// Lifecycle hook points. Every method defaults to a no-op.
///
/// Hooks must not block: long-running work is spawned onto the runtime.
pub trait TaskLifecycleHook: Send + Sync {
    fn pre_launch(&self, _task: &TaskContext) {}

    fn post_launch(&self, _task: &TaskContext) {}

    fn on_status(&self, _task: &TaskContext, _report: &HealthReport) {}

    fn on_remove(&self, _task: &TaskContext) {}
}

/// Logs every lifecycle event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LogHook;

impl TaskLifecycleHook for LogHook {
    fn pre_launch(&self, task: &TaskContext) {
        info!(task_id = %task.id, name = %task.name, "launching task");
    }

    fn post_launch(&self, task: &TaskContext) {
        info!(task_id = %task.id, name = %task.name, "task launched");
    }

    fn on_status(&self, task: &TaskContext, report: &HealthReport) {
        info!(
            task_id = %task.id,
            healthy = report.healthy,
            terminated = report.terminated,
            failures = report.consecutive_failures,
            "task health"
        );
    }

    fn on_remove(&self, task: &TaskContext) {
        info!(task_id = %task.id, name = %task.name, "task removed");
    }
}

/// A built-in hook strategy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Hook {
    PostLaunchCommand(PostLaunchCommand),
    Log(LogHook),
}

impl From<&HookConfig> for Hook {
    fn from(config: &HookConfig) -> Self {
        match config {
            HookConfig::PostLaunchCommand { cmd: Some(cmd) } => {
                Hook::PostLaunchCommand(PostLaunchCommand::new(cmd.clone()))
            }
            HookConfig::PostLaunchCommand { cmd: None } => {
                Hook::PostLaunchCommand(PostLaunchCommand::default())
            }
            HookConfig::Log => Hook::Log(LogHook),
        }
    }
}

impl Hook {
    fn inner(&self) -> &dyn TaskLifecycleHook {
        match self {
            Hook::PostLaunchCommand(hook) => hook,
            Hook::Log(hook) => hook,
        }
    }
}

impl TaskLifecycleHook for Hook {
    fn pre_launch(&self, task: &TaskContext) {
        self.inner().pre_launch(task);
    }

    fn post_launch(&self, task: &TaskContext) {
        self.inner().post_launch(task);
    }

    fn on_status(&self, task: &TaskContext, report: &HealthReport) {
        self.inner().on_status(task, report);
    }

    fn on_remove(&self, task: &TaskContext) {
        self.inner().on_remove(task);
    }
}

/// The hooks configured for one task, invoked in configuration order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Hooks {
    hooks: Vec<Hook>,
}

impl Hooks {
    pub fn from_config(configs: &[HookConfig]) -> Self {
        Self {
            hooks: configs.iter().map(Hook::from).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Hook> {
        self.hooks.iter()
    }
}

impl TaskLifecycleHook for Hooks {
    fn pre_launch(&self, task: &TaskContext) {
        self.hooks.iter().for_each(|h| h.pre_launch(task));
    }

    fn post_launch(&self, task: &TaskContext) {
        self.hooks.iter().for_each(|h| h.post_launch(task));
    }

    fn on_status(&self, task: &TaskContext, report: &HealthReport) {
        self.hooks.iter().for_each(|h| h.on_status(task, report));
    }

    fn on_remove(&self, task: &TaskContext) {
        self.hooks.iter().for_each(|h| h.on_remove(task));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vigil_health::ProbeOutcome;

    #[test]
    fn hooks_built_from_config() {
        let hooks = Hooks::from_config(&[
            HookConfig::PostLaunchCommand { cmd: None },
            HookConfig::PostLaunchCommand {
                cmd: Some("/bin/true".into()),
            },
            HookConfig::Log,
        ]);

        let built: Vec<&Hook> = hooks.iter().collect();
        assert_eq!(
            built,
            vec![
                &Hook::PostLaunchCommand(PostLaunchCommand::default()),
                &Hook::PostLaunchCommand(PostLaunchCommand::new("/bin/true")),
                &Hook::Log(LogHook),
            ]
        );
    }

    #[test]
    fn empty_hooks_are_noops() {
        let hooks = Hooks::from_config(&[]);
        assert!(hooks.is_empty());

        let task = TaskContext::new("web-1", "web");
        let report = HealthReport::from_outcome("web-1", &ProbeOutcome::healthy(), 0);
        hooks.pre_launch(&task);
        hooks.post_launch(&task);
        hooks.on_status(&task, &report);
        hooks.on_remove(&task);
    }

    #[test]
    fn log_hook_handles_every_event() {
        let hooks = Hooks::from_config(&[HookConfig::Log]);
        assert_eq!(hooks.len(), 1);

        let task = TaskContext::new("web-1", "web");
        let report = HealthReport::terminated("web-1", 3, "health check failed 3 times");
        hooks.pre_launch(&task);
        hooks.post_launch(&task);
        hooks.on_status(&task, &report);
        hooks.on_remove(&task);
    }
}
