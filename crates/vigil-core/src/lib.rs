//! vigil-core: shared types for Vigil task health monitoring.
//!
//! - [`health`]: raw and validated health check specs
//! - [`validation`]: admission-time checks for health check configs
//! - [`config`]: the TOML task file read by `vigild`

pub mod config;
pub mod error;
pub mod health;
pub mod validation;

pub use config::{HookConfig, TaskConfig, TaskFile};
pub use error::{ConfigError, ConfigResult, ValidationError};
pub use health::*;
pub use validation::validate;
