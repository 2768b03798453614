//! Error types for health check validation and task file loading.

use std::path::PathBuf;

use thiserror::Error;

use crate::health::CheckKind;

/// A health check rejected at admission time.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("health check type must be set")]
    MissingType,

    #[error("unknown health check type '{0}'")]
    UnknownType(String),

    #[error("'{field}' must be a non-negative number of seconds, got {value}")]
    InvalidDuration { field: &'static str, value: f64 },

    #[error("expected '{0}' to be set for {0} health check")]
    MissingPayload(CheckKind),

    #[error("'{payload}' must not be set for {kind} health check")]
    UnexpectedPayload { kind: CheckKind, payload: CheckKind },

    #[error("command health check must specify 'command.value'")]
    MissingCommandValue,

    #[error("{0} health check must specify a port")]
    MissingPort(CheckKind),

    #[error("unsupported HTTP health check scheme '{0}'")]
    InvalidScheme(String),

    #[error("HTTP health check path '{0}' must start with '/'")]
    InvalidPath(String),
}

/// Errors loading a task file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse task file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("task command must not be empty")]
    EmptyCommand,

    #[error("'kill_grace_seconds' must be a non-negative number of seconds, got {0}")]
    InvalidKillGrace(f64),

    #[error("invalid health check: {0}")]
    Invalid(#[from] ValidationError),
}

pub type ConfigResult<T> = Result<T, ConfigError>;
