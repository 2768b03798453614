//! Health check specifications.
//!
//! [`HealthCheckConfig`] is the raw shape accepted from task files and API
//! payloads: every field is optional so that an unset type or payload can be
//! reported by the validator instead of failing deserialization.
//! [`HealthCheck`] is the validated form consumed by the health monitor and
//! can only be obtained through `HealthCheck::try_from(config)`.

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::validation::validate;

/// Seconds to wait after task start before the first probe.
pub const DEFAULT_DELAY_SECS: f64 = 15.0;
/// Seconds between the end of one probe and the start of the next.
pub const DEFAULT_INTERVAL_SECS: f64 = 10.0;
/// Seconds during which failures are masked until the first success.
pub const DEFAULT_GRACE_PERIOD_SECS: f64 = 10.0;
/// Consecutive failures before the task is killed.
pub const DEFAULT_CONSECUTIVE_FAILURES: u32 = 3;

// ── Raw configuration ─────────────────────────────────────────────

/// The `type` field of a health check as written in configuration.
///
/// Unrecognized strings are kept as [`CheckType::Unknown`] so the validator
/// can reject them with the offending value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum CheckType {
    Command,
    Http,
    Tcp,
    Unknown(String),
}

impl CheckType {
    /// The validated kind, or `None` for unknown types.
    pub fn kind(&self) -> Option<CheckKind> {
        match self {
            CheckType::Command => Some(CheckKind::Command),
            CheckType::Http => Some(CheckKind::Http),
            CheckType::Tcp => Some(CheckKind::Tcp),
            CheckType::Unknown(_) => None,
        }
    }
}

impl From<String> for CheckType {
    fn from(s: String) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "command" => CheckType::Command,
            "http" => CheckType::Http,
            "tcp" => CheckType::Tcp,
            _ => CheckType::Unknown(s),
        }
    }
}

impl From<CheckType> for String {
    fn from(t: CheckType) -> Self {
        match t {
            CheckType::Command => "command".to_string(),
            CheckType::Http => "http".to_string(),
            CheckType::Tcp => "tcp".to_string(),
            CheckType::Unknown(s) => s,
        }
    }
}

/// Health check parameters as supplied at task launch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HealthCheckConfig {
    /// Probe kind: "command", "http" or "tcp".
    #[serde(rename = "type")]
    pub kind: Option<CheckType>,
    pub delay_seconds: Option<f64>,
    pub interval_seconds: Option<f64>,
    pub grace_period_seconds: Option<f64>,
    /// Per-probe timeout. Falls back to the monitor default when unset.
    pub timeout_seconds: Option<f64>,
    /// Consecutive failures before escalation. 0 disables escalation.
    pub consecutive_failures: Option<u32>,
    pub command: Option<CommandConfig>,
    pub http: Option<HttpConfig>,
    pub tcp: Option<TcpConfig>,
}

/// Command probe payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CommandConfig {
    pub value: Option<String>,
    /// Run `value` through `/bin/sh -c`. Defaults to true.
    pub shell: Option<bool>,
    /// Full argv for non-shell commands, `arguments[0]` being argv[0].
    pub arguments: Vec<String>,
    /// Variables merged over the agent's own environment.
    pub environment: HashMap<String, String>,
}

/// HTTP probe payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub port: Option<u16>,
    pub scheme: Option<String>,
    pub path: Option<String>,
}

/// TCP probe payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TcpConfig {
    pub port: Option<u16>,
}

// ── Validated spec ────────────────────────────────────────────────

/// The kind of probe a validated health check runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckKind {
    Command,
    Http,
    Tcp,
}

impl CheckKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckKind::Command => "command",
            CheckKind::Http => "http",
            CheckKind::Tcp => "tcp",
        }
    }
}

impl fmt::Display for CheckKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A validated health check.
#[derive(Debug, Clone, PartialEq)]
pub struct HealthCheck {
    pub delay: Duration,
    pub interval: Duration,
    pub grace_period: Duration,
    pub timeout: Option<Duration>,
    pub consecutive_failures: u32,
    pub check: CheckPayload,
}

impl HealthCheck {
    pub fn kind(&self) -> CheckKind {
        self.check.kind()
    }

    /// Whether consecutive failures can ever kill the task.
    pub fn escalates(&self) -> bool {
        self.consecutive_failures > 0
    }
}

/// What to probe. Exactly one variant per [`CheckKind`].
#[derive(Debug, Clone, PartialEq)]
pub enum CheckPayload {
    Command(CommandCheck),
    Http(HttpCheck),
    Tcp(TcpCheck),
}

impl CheckPayload {
    pub fn kind(&self) -> CheckKind {
        match self {
            CheckPayload::Command(_) => CheckKind::Command,
            CheckPayload::Http(_) => CheckKind::Http,
            CheckPayload::Tcp(_) => CheckKind::Tcp,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CommandCheck {
    pub value: String,
    pub shell: bool,
    pub arguments: Vec<String>,
    pub environment: HashMap<String, String>,
}

impl CommandCheck {
    /// A shell command with no extra environment.
    pub fn shell(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            shell: true,
            arguments: Vec::new(),
            environment: HashMap::new(),
        }
    }
}

/// URL scheme of an HTTP probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HttpScheme {
    #[default]
    Http,
    Https,
}

impl HttpScheme {
    /// Parse a configured scheme. Only "http" and "https" are accepted.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "http" => Some(HttpScheme::Http),
            "https" => Some(HttpScheme::Https),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            HttpScheme::Http => "http",
            HttpScheme::Https => "https",
        }
    }
}

impl fmt::Display for HttpScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct HttpCheck {
    pub port: u16,
    pub scheme: HttpScheme,
    pub path: Option<String>,
}

impl HttpCheck {
    /// Request path, `/` when unset.
    pub fn path(&self) -> &str {
        self.path.as_deref().unwrap_or("/")
    }

    /// The URL probed on the task's own host.
    pub fn url(&self) -> String {
        format!("{}://localhost:{}{}", self.scheme, self.port, self.path())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TcpCheck {
    pub port: u16,
}

impl TryFrom<HealthCheckConfig> for HealthCheck {
    type Error = ValidationError;

    fn try_from(config: HealthCheckConfig) -> Result<Self, Self::Error> {
        validate(&config)?;

        let kind = match &config.kind {
            Some(t) => t.kind().ok_or_else(|| ValidationError::UnknownType(t.clone().into()))?,
            None => return Err(ValidationError::MissingType),
        };

        let check = match kind {
            CheckKind::Command => {
                let cmd = config
                    .command
                    .ok_or(ValidationError::MissingPayload(kind))?;
                CheckPayload::Command(CommandCheck {
                    value: cmd.value.ok_or(ValidationError::MissingCommandValue)?,
                    shell: cmd.shell.unwrap_or(true),
                    arguments: cmd.arguments,
                    environment: cmd.environment,
                })
            }
            CheckKind::Http => {
                let http = config.http.ok_or(ValidationError::MissingPayload(kind))?;
                let scheme = match http.scheme {
                    Some(s) => HttpScheme::parse(&s).ok_or(ValidationError::InvalidScheme(s))?,
                    None => HttpScheme::Http,
                };
                CheckPayload::Http(HttpCheck {
                    port: http.port.ok_or(ValidationError::MissingPort(kind))?,
                    scheme,
                    path: http.path,
                })
            }
            CheckKind::Tcp => {
                let tcp = config.tcp.ok_or(ValidationError::MissingPayload(kind))?;
                CheckPayload::Tcp(TcpCheck {
                    port: tcp.port.ok_or(ValidationError::MissingPort(kind))?,
                })
            }
        };

        Ok(HealthCheck {
            delay: seconds("delay_seconds", config.delay_seconds.unwrap_or(DEFAULT_DELAY_SECS))?,
            interval: seconds(
                "interval_seconds",
                config.interval_seconds.unwrap_or(DEFAULT_INTERVAL_SECS),
            )?,
            grace_period: seconds(
                "grace_period_seconds",
                config.grace_period_seconds.unwrap_or(DEFAULT_GRACE_PERIOD_SECS),
            )?,
            timeout: config
                .timeout_seconds
                .map(|t| seconds("timeout_seconds", t))
                .transpose()?,
            consecutive_failures: config
                .consecutive_failures
                .unwrap_or(DEFAULT_CONSECUTIVE_FAILURES),
            check,
        })
    }
}

fn seconds(field: &'static str, value: f64) -> Result<Duration, ValidationError> {
    Duration::try_from_secs_f64(value).map_err(|_| ValidationError::InvalidDuration { field, value })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn command_config(value: &str) -> HealthCheckConfig {
        HealthCheckConfig {
            kind: Some(CheckType::Command),
            command: Some(CommandConfig {
                value: Some(value.to_string()),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[test]
    fn defaults_applied_when_unset() {
        let check = HealthCheck::try_from(command_config("exit 0")).unwrap();
        assert_eq!(check.delay, Duration::from_secs(15));
        assert_eq!(check.interval, Duration::from_secs(10));
        assert_eq!(check.grace_period, Duration::from_secs(10));
        assert_eq!(check.timeout, None);
        assert_eq!(check.consecutive_failures, 3);
        assert!(check.escalates());
        match check.check {
            CheckPayload::Command(cmd) => {
                assert!(cmd.shell);
                assert_eq!(cmd.value, "exit 0");
            }
            other => panic!("expected command payload, got {other:?}"),
        }
    }

    #[test]
    fn fractional_seconds() {
        let mut config = command_config("true");
        config.interval_seconds = Some(0.25);
        config.timeout_seconds = Some(1.5);
        config.consecutive_failures = Some(0);

        let check = HealthCheck::try_from(config).unwrap();
        assert_eq!(check.interval, Duration::from_millis(250));
        assert_eq!(check.timeout, Some(Duration::from_millis(1500)));
        assert!(!check.escalates());
    }

    #[test]
    fn http_url_defaults_path() {
        let config = HealthCheckConfig {
            kind: Some(CheckType::Http),
            http: Some(HttpConfig {
                port: Some(8080),
                ..Default::default()
            }),
            ..Default::default()
        };
        let check = HealthCheck::try_from(config).unwrap();
        match check.check {
            CheckPayload::Http(http) => {
                assert_eq!(http.scheme, HttpScheme::Http);
                assert_eq!(http.url(), "http://localhost:8080/");
            }
            other => panic!("expected http payload, got {other:?}"),
        }
    }

    #[test]
    fn https_url_keeps_path() {
        let http = HttpCheck {
            port: 8443,
            scheme: HttpScheme::Https,
            path: Some("/healthz".to_string()),
        };
        assert_eq!(http.url(), "https://localhost:8443/healthz");
    }

    #[test]
    fn check_type_from_json() {
        let config: HealthCheckConfig =
            serde_json::from_str(r#"{"type": "tcp", "tcp": {"port": 6379}}"#).unwrap();
        assert_eq!(config.kind, Some(CheckType::Tcp));

        let config: HealthCheckConfig =
            serde_json::from_str(r#"{"type": "grpc"}"#).unwrap();
        assert_eq!(config.kind, Some(CheckType::Unknown("grpc".to_string())));
    }

    #[test]
    fn rejected_config_does_not_convert() {
        let err = HealthCheck::try_from(HealthCheckConfig::default()).unwrap_err();
        assert_eq!(err, ValidationError::MissingType);
    }
}
