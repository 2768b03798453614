//! Static validation of health check configuration.
//!
//! Runs once when a task is admitted. A task whose health check fails
//! validation is never launched; there is no per-probe validation.

use crate::error::ValidationError;
use crate::health::{CheckKind, HealthCheckConfig, HttpScheme};

/// Validate a health check, returning the first violation found.
///
/// Rules are checked in order: type, durations, payload presence,
/// then the payload fields of the selected kind.
pub fn validate(config: &HealthCheckConfig) -> Result<(), ValidationError> {
    let kind = match &config.kind {
        None => return Err(ValidationError::MissingType),
        Some(t) => match t.kind() {
            Some(kind) => kind,
            None => return Err(ValidationError::UnknownType(t.clone().into())),
        },
    };

    let durations = [
        ("delay_seconds", config.delay_seconds),
        ("interval_seconds", config.interval_seconds),
        ("grace_period_seconds", config.grace_period_seconds),
        ("timeout_seconds", config.timeout_seconds),
    ];
    for (field, value) in durations {
        if let Some(value) = value {
            if !value.is_finite() || value < 0.0 {
                return Err(ValidationError::InvalidDuration { field, value });
            }
        }
    }

    let present = [
        (CheckKind::Command, config.command.is_some()),
        (CheckKind::Http, config.http.is_some()),
        (CheckKind::Tcp, config.tcp.is_some()),
    ];
    for (payload, is_set) in present {
        if payload == kind && !is_set {
            return Err(ValidationError::MissingPayload(kind));
        }
        if payload != kind && is_set {
            return Err(ValidationError::UnexpectedPayload { kind, payload });
        }
    }

    match kind {
        CheckKind::Command => {
            let value = config.command.as_ref().and_then(|c| c.value.as_deref());
            if value.is_none_or(str::is_empty) {
                return Err(ValidationError::MissingCommandValue);
            }
        }
        CheckKind::Http => {
            if let Some(http) = &config.http {
                if http.port.is_none() {
                    return Err(ValidationError::MissingPort(kind));
                }
                if let Some(scheme) = &http.scheme {
                    if HttpScheme::parse(scheme).is_none() {
                        return Err(ValidationError::InvalidScheme(scheme.clone()));
                    }
                }
                if let Some(path) = &http.path {
                    if !path.starts_with('/') {
                        return Err(ValidationError::InvalidPath(path.clone()));
                    }
                }
            }
        }
        CheckKind::Tcp => {
            if config.tcp.as_ref().and_then(|t| t.port).is_none() {
                return Err(ValidationError::MissingPort(kind));
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::health::{CheckType, CommandConfig, HttpConfig, TcpConfig};

    fn with_type(kind: CheckType) -> HealthCheckConfig {
        HealthCheckConfig {
            kind: Some(kind),
            ..Default::default()
        }
    }

    fn http_only_port() -> HealthCheckConfig {
        HealthCheckConfig {
            http: Some(HttpConfig {
                port: Some(8080),
                ..Default::default()
            }),
            ..with_type(CheckType::Http)
        }
    }

    #[test]
    fn type_must_be_set() {
        let err = validate(&HealthCheckConfig::default()).unwrap_err();
        assert_eq!(err, ValidationError::MissingType);
    }

    #[test]
    fn type_must_be_known() {
        let err = validate(&with_type(CheckType::Unknown("unknown".into()))).unwrap_err();
        assert_eq!(err, ValidationError::UnknownType("unknown".into()));
    }

    #[test]
    fn payload_must_match_type() {
        for (kind, t) in [
            (CheckKind::Command, CheckType::Command),
            (CheckKind::Http, CheckType::Http),
            (CheckKind::Tcp, CheckType::Tcp),
        ] {
            let err = validate(&with_type(t)).unwrap_err();
            assert_eq!(err, ValidationError::MissingPayload(kind));
        }
    }

    #[test]
    fn payload_of_other_kind_rejected() {
        let config = HealthCheckConfig {
            tcp: Some(TcpConfig { port: Some(80) }),
            ..http_only_port()
        };
        let err = validate(&config).unwrap_err();
        assert_eq!(
            err,
            ValidationError::UnexpectedPayload {
                kind: CheckKind::Http,
                payload: CheckKind::Tcp,
            }
        );
    }

    #[test]
    fn command_requires_value() {
        let mut config = HealthCheckConfig {
            command: Some(CommandConfig::default()),
            ..with_type(CheckType::Command)
        };
        assert_eq!(validate(&config), Err(ValidationError::MissingCommandValue));

        config.command = Some(CommandConfig {
            value: Some(String::new()),
            ..Default::default()
        });
        assert_eq!(validate(&config), Err(ValidationError::MissingCommandValue));

        config.command = Some(CommandConfig {
            value: Some("exit 0".into()),
            ..Default::default()
        });
        assert_eq!(validate(&config), Ok(()));
    }

    #[test]
    fn http_with_only_port_is_valid() {
        assert_eq!(validate(&http_only_port()), Ok(()));
    }

    #[test]
    fn http_scheme_must_be_known() {
        let mut config = http_only_port();
        if let Some(http) = config.http.as_mut() {
            http.scheme = Some("ftp".into());
        }
        assert_eq!(
            validate(&config),
            Err(ValidationError::InvalidScheme("ftp".into()))
        );
    }

    #[test]
    fn http_path_must_be_absolute() {
        let mut config = http_only_port();
        if let Some(http) = config.http.as_mut() {
            http.scheme = Some("https".into());
            http.path = Some("healthz".into());
        }
        assert_eq!(
            validate(&config),
            Err(ValidationError::InvalidPath("healthz".into()))
        );

        if let Some(http) = config.http.as_mut() {
            http.path = Some("/healthz".into());
        }
        assert_eq!(validate(&config), Ok(()));
    }

    #[test]
    fn http_requires_port() {
        let config = HealthCheckConfig {
            http: Some(HttpConfig::default()),
            ..with_type(CheckType::Http)
        };
        assert_eq!(
            validate(&config),
            Err(ValidationError::MissingPort(CheckKind::Http))
        );
    }

    #[test]
    fn tcp_requires_port() {
        let mut config = HealthCheckConfig {
            tcp: Some(TcpConfig::default()),
            ..with_type(CheckType::Tcp)
        };
        assert_eq!(
            validate(&config),
            Err(ValidationError::MissingPort(CheckKind::Tcp))
        );

        config.tcp = Some(TcpConfig { port: Some(5432) });
        assert_eq!(validate(&config), Ok(()));
    }

    #[test]
    fn negative_or_nan_durations_rejected() {
        let mut config = http_only_port();
        config.interval_seconds = Some(-1.0);
        assert!(matches!(
            validate(&config),
            Err(ValidationError::InvalidDuration {
                field: "interval_seconds",
                ..
            })
        ));

        config.interval_seconds = Some(0.0);
        config.timeout_seconds = Some(f64::NAN);
        assert!(matches!(
            validate(&config),
            Err(ValidationError::InvalidDuration {
                field: "timeout_seconds",
                ..
            })
        ));
    }

    #[test]
    fn zero_threshold_is_valid() {
        let mut config = http_only_port();
        config.consecutive_failures = Some(0);
        config.grace_period_seconds = Some(0.0);
        assert_eq!(validate(&config), Ok(()));
    }
}
