//! Gateway configuration.
//!
//! Every knob is an environment variable with a typed default; invalid
//! values fail startup with a [`ConfigError`] naming the variable. Tests use
//! [`GatewayConfig::from_lookup`] to avoid touching process environment.

use relay_types::SelectionPolicy;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value {value:?} for {key}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

/// Minimum log verbosity, used to seed the tracing filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogLevel {
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "debug" => Ok(Self::Debug),
            "info" => Ok(Self::Info),
            "warn" => Ok(Self::Warn),
            "error" => Ok(Self::Error),
            other => Err(format!(
                "unknown log level {other:?} (expected debug, info, warn, or error)"
            )),
        }
    }
}

/// Fully-resolved gateway configuration.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub port: u16,
    pub cors_origin: String,
    pub log_level: LogLevel,
    pub selection_policy: SelectionPolicy,
    pub failure_threshold: u32,
    pub cooldown: Duration,
    pub probes_to_close: u32,
    pub upstream_base_url: String,
    pub upstream_api_version: String,
    pub upstream_timeout: Duration,
    pub retry_count: u32,
    pub retry_delay: Duration,
    pub body_size_limit: usize,
    pub health_check_path: String,
    pub stats_path: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            cors_origin: "*".to_string(),
            log_level: LogLevel::Info,
            selection_policy: SelectionPolicy::RoundRobin,
            failure_threshold: 3,
            cooldown: Duration::from_secs(60),
            probes_to_close: 3,
            upstream_base_url: "https://generativelanguage.googleapis.com".to_string(),
            upstream_api_version: "v1beta".to_string(),
            upstream_timeout: Duration::from_secs(30),
            retry_count: 2,
            retry_delay: Duration::from_secs(1),
            body_size_limit: 1024 * 1024,
            health_check_path: "/health".to_string(),
            stats_path: "/stats".to_string(),
        }
    }
}

impl GatewayConfig {
    /// Load from process environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from an arbitrary lookup function.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(raw) = lookup("PORT") {
            config.port = parse("PORT", &raw)?;
        }
        if let Some(raw) = lookup("CORS_ORIGIN") {
            config.cors_origin = raw;
        }
        if let Some(raw) = lookup("LOG_LEVEL") {
            config.log_level = raw
                .parse()
                .map_err(|reason| invalid("LOG_LEVEL", &raw, reason))?;
        }
        if let Some(raw) = lookup("SELECTION_POLICY") {
            config.selection_policy = raw
                .parse()
                .map_err(|e: relay_types::ParsePolicyError| {
                    invalid("SELECTION_POLICY", &raw, e.to_string())
                })?;
        }
        if let Some(raw) = lookup("FAILURE_THRESHOLD") {
            config.failure_threshold =
                parse_bounded("FAILURE_THRESHOLD", &raw, 1, "must be at least 1")?;
        }
        if let Some(raw) = lookup("COOLDOWN_DURATION_MS") {
            let ms: u64 = parse_bounded("COOLDOWN_DURATION_MS", &raw, 1000, "must be >= 1000")?;
            config.cooldown = Duration::from_millis(ms);
        }
        if let Some(raw) = lookup("PROBES_TO_CLOSE") {
            config.probes_to_close = parse_bounded("PROBES_TO_CLOSE", &raw, 1, "must be at least 1")?;
        }
        if let Some(raw) = lookup("UPSTREAM_BASE_URL") {
            config.upstream_base_url = raw.trim_end_matches('/').to_string();
        }
        if let Some(raw) = lookup("UPSTREAM_API_VERSION") {
            config.upstream_api_version = raw;
        }
        if let Some(raw) = lookup("UPSTREAM_TIMEOUT_MS") {
            let ms: u64 = parse_bounded("UPSTREAM_TIMEOUT_MS", &raw, 1000, "must be >= 1000")?;
            config.upstream_timeout = Duration::from_millis(ms);
        }
        if let Some(raw) = lookup("RETRY_COUNT") {
            config.retry_count = parse("RETRY_COUNT", &raw)?;
        }
        if let Some(raw) = lookup("RETRY_DELAY_MS") {
            let ms: u64 = parse("RETRY_DELAY_MS", &raw)?;
            config.retry_delay = Duration::from_millis(ms);
        }
        if let Some(raw) = lookup("BODY_SIZE_LIMIT") {
            config.body_size_limit = parse("BODY_SIZE_LIMIT", &raw)?;
        }
        if let Some(raw) = lookup("HEALTH_CHECK_PATH") {
            config.health_check_path = validated_path("HEALTH_CHECK_PATH", raw)?;
        }
        if let Some(raw) = lookup("STATS_PATH") {
            config.stats_path = validated_path("STATS_PATH", raw)?;
        }

        Ok(config)
    }
}

fn invalid(key: &'static str, value: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        key,
        value: value.to_string(),
        reason: reason.into(),
    }
}

fn parse<T>(key: &'static str, raw: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse()
        .map_err(|e: T::Err| invalid(key, raw, e.to_string()))
}

fn parse_bounded<T>(
    key: &'static str,
    raw: &str,
    min: T,
    reason: &str,
) -> Result<T, ConfigError>
where
    T: FromStr + PartialOrd,
    T::Err: std::fmt::Display,
{
    let value: T = parse(key, raw)?;
    if value < min {
        return Err(invalid(key, raw, reason));
    }
    Ok(value)
}

fn validated_path(key: &'static str, raw: String) -> Result<String, ConfigError> {
    if raw.starts_with('/') && raw.len() > 1 {
        Ok(raw)
    } else {
        Err(invalid(key, &raw, "must start with '/'"))
    }
}
