//! Engine configuration
//!
//! Layered: built-in defaults, then an optional TOML file, then `ESCALATE_*`
//! environment variables. The binary applies command-line flags last.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::evaluator::MAX_THRESHOLD_HOURS;

/// Errors raised while loading configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config {path}: {message}")]
    Parse { path: String, message: String },

    #[error("invalid value for {key}: {value:?}")]
    InvalidEnv { key: String, value: String },

    #[error("{0}")]
    Invalid(String),
}

/// Retry and timeout policy for notification delivery
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
    /// Attempts per recipient, including the first
    pub max_attempts: u32,
    /// Backoff before the second attempt; doubled for each later one
    pub initial_backoff_ms: u64,
    /// Upper bound on a single gateway call
    pub timeout_ms: u64,
    /// Optional HTTP endpoint for the webhook gateway
    pub webhook_url: Option<String>,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 500,
            timeout_ms: 10_000,
            webhook_url: None,
        }
    }
}

impl NotificationConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Sleep before attempt `attempt` (1-indexed; attempt 1 never waits).
    pub fn backoff_before(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::ZERO;
        }
        let factor = 2u64.saturating_pow(attempt - 2);
        Duration::from_millis(self.initial_backoff_ms.saturating_mul(factor))
    }
}

/// Top-level engine configuration
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Hours before the escalation deadline at which warnings start
    pub warning_threshold_hours: f64,
    /// Tighter sub-threshold that marks a warning as critical
    pub critical_threshold_hours: f64,
    /// Per-complaint pipelines allowed in flight at once
    pub max_parallel: usize,
    pub notifications: NotificationConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            warning_threshold_hours: 2.0,
            critical_threshold_hours: 1.0,
            max_parallel: 8,
            notifications: NotificationConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Defaults overlaid with a TOML file, when given.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        toml::from_str(&raw).map_err(|e| ConfigError::Parse {
            path: path.display().to_string(),
            message: e.to_string(),
        })
    }

    /// Apply `ESCALATE_*` overrides from the process environment.
    pub fn with_env_overrides(self) -> Result<Self, ConfigError> {
        self.with_overrides_from(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary lookup (the environment in production).
    pub fn with_overrides_from(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        if let Some(v) = lookup("ESCALATE_WARNING_THRESHOLD_HOURS") {
            self.warning_threshold_hours = parse_env("ESCALATE_WARNING_THRESHOLD_HOURS", &v)?;
        }
        if let Some(v) = lookup("ESCALATE_CRITICAL_THRESHOLD_HOURS") {
            self.critical_threshold_hours = parse_env("ESCALATE_CRITICAL_THRESHOLD_HOURS", &v)?;
        }
        if let Some(v) = lookup("ESCALATE_MAX_PARALLEL") {
            self.max_parallel = parse_env("ESCALATE_MAX_PARALLEL", &v)?;
        }
        if let Some(v) = lookup("ESCALATE_WEBHOOK_URL") {
            self.notifications.webhook_url = Some(v);
        }
        Ok(self)
    }

    /// Check ranges and clamp the critical sub-threshold under the warning one.
    pub fn validated(mut self) -> Result<Self, ConfigError> {
        check_threshold("warning_threshold_hours", self.warning_threshold_hours)?;
        check_threshold("critical_threshold_hours", self.critical_threshold_hours)?;
        self.critical_threshold_hours = self
            .critical_threshold_hours
            .min(self.warning_threshold_hours);
        self.max_parallel = self.max_parallel.max(1);
        self.notifications.max_attempts = self.notifications.max_attempts.max(1);
        Ok(self)
    }
}

fn check_threshold(key: &str, hours: f64) -> Result<(), ConfigError> {
    if hours.is_finite() && (0.0..=MAX_THRESHOLD_HOURS).contains(&hours) {
        return Ok(());
    }
    Err(ConfigError::Invalid(format!(
        "{key} must be between 0 and {MAX_THRESHOLD_HOURS} hours, got {hours}"
    )))
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidEnv {
        key: key.to_string(),
        value: value.to_string(),
    })
}
