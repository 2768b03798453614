//! Task file parser.
//!
//! A task file describes one workload launched by `vigild`: the command to
//! run, its health check, and the lifecycle hooks to invoke.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use crate::error::{ConfigError, ConfigResult, ValidationError};
use crate::health::{CheckType, CommandConfig, HealthCheck, HealthCheckConfig};

/// Seconds between SIGTERM and SIGKILL when a task is killed.
pub const DEFAULT_KILL_GRACE_SECS: f64 = 3.0;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskFile {
    pub task: TaskConfig,
    pub health_check: Option<HealthCheckConfig>,
    #[serde(default)]
    pub hooks: Vec<HookConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskConfig {
    /// Task identifier used in reports. Defaults to `name`.
    pub id: Option<String>,
    pub name: String,
    /// Shell command that runs the workload.
    pub command: String,
    #[serde(default)]
    pub env: HashMap<String, String>,
    pub kill_grace_seconds: Option<f64>,
}

/// A lifecycle hook entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HookConfig {
    /// Run `<cmd> <task name>` once the task has launched.
    PostLaunchCommand { cmd: Option<String> },
    /// Log every lifecycle event.
    Log,
}

impl TaskConfig {
    pub fn id(&self) -> &str {
        self.id.as_deref().unwrap_or(&self.name)
    }

    pub fn kill_grace(&self) -> Duration {
        self.kill_grace_seconds
            .and_then(|s| Duration::try_from_secs_f64(s).ok())
            .unwrap_or_else(|| Duration::from_secs_f64(DEFAULT_KILL_GRACE_SECS))
    }
}

impl TaskFile {
    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content)
    }

    /// Parse a task file and validate its health check.
    pub fn parse(content: &str) -> ConfigResult<Self> {
        let file: TaskFile = toml::from_str(content)?;
        if file.task.command.trim().is_empty() {
            return Err(ConfigError::EmptyCommand);
        }
        if let Some(grace) = file.task.kill_grace_seconds {
            if !grace.is_finite() || grace < 0.0 {
                return Err(ConfigError::InvalidKillGrace(grace));
            }
        }
        file.health_check()?;
        Ok(file)
    }

    /// The validated health check, if the task has one.
    pub fn health_check(&self) -> Result<Option<HealthCheck>, ValidationError> {
        self.health_check
            .clone()
            .map(HealthCheck::try_from)
            .transpose()
    }

    pub fn to_toml_string(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }

    /// Scaffold a minimal task file with a command health check.
    pub fn scaffold(name: &str, command: &str) -> Self {
        TaskFile {
            task: TaskConfig {
                id: None,
                name: name.to_string(),
                command: command.to_string(),
                env: HashMap::new(),
                kill_grace_seconds: Some(DEFAULT_KILL_GRACE_SECS),
            },
            health_check: Some(HealthCheckConfig {
                kind: Some(CheckType::Command),
                delay_seconds: Some(0.0),
                interval_seconds: Some(5.0),
                grace_period_seconds: Some(10.0),
                timeout_seconds: Some(2.0),
                consecutive_failures: Some(3),
                command: Some(CommandConfig {
                    value: Some("exit 0".to_string()),
                    ..Default::default()
                }),
                http: None,
                tcp: None,
            }),
            hooks: Vec::new(),
        }
    }
}
