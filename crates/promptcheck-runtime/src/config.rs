//! Engine configuration.
//!
//! Durations accept milliseconds or human-readable strings (`"30s"`,
//! `"250ms"`), so a suite's `settings` block reads naturally:
//!
//! ```yaml
//! settings:
//!   concurrency: 8
//!   attempt_timeout: 20s
//!   max_attempts: 4
//!   suite_deadline: 5m
//!   backoff: { base: 500ms, multiplier: 2.0, max_delay: 8s, jitter: 0.1 }
//! ```

use promptcheck_core::durations;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid settings: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid setting '{field}': {reason}")]
    Invalid { field: &'static str, reason: String },
}

impl ConfigError {
    fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field,
            reason: reason.into(),
        }
    }
}

/// Exponential backoff between attempts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BackoffConfig {
    /// Delay before the second attempt
    #[serde(with = "durations::human")]
    pub base: Duration,

    /// Growth factor per attempt (>= 1)
    pub multiplier: f64,

    /// Cap on any single delay, before the retry-after floor
    #[serde(with = "durations::human")]
    pub max_delay: Duration,

    /// Each delay is scaled by a random factor in `[1 - jitter, 1 + jitter]`
    pub jitter: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base: Duration::from_millis(250),
            multiplier: 2.0,
            max_delay: Duration::from_secs(10),
            jitter: 0.2,
        }
    }
}

/// Configuration for one engine run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Worker pool size
    pub concurrency: usize,

    /// Default per-attempt timeout; a case's `timeout` overrides it
    #[serde(with = "durations::human")]
    pub attempt_timeout: Duration,

    /// Attempts per case, including the first
    pub max_attempts: u32,

    pub backoff: BackoffConfig,

    /// Overall deadline; no attempt starts after it elapses
    #[serde(
        with = "durations::human_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub suite_deadline: Option<Duration>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            concurrency: 4,
            attempt_timeout: Duration::from_secs(30),
            max_attempts: 3,
            backoff: BackoffConfig::default(),
            suite_deadline: None,
        }
    }
}

impl EngineConfig {
    /// Read a suite `settings` value. `null` yields the defaults.
    pub fn from_settings(settings: &JsonValue) -> Result<Self, ConfigError> {
        let config: Self = if settings.is_null() {
            Self::default()
        } else {
            serde_json::from_value(settings.clone())?
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.concurrency == 0 {
            return Err(ConfigError::invalid("concurrency", "must be at least 1"));
        }
        if self.max_attempts == 0 {
            return Err(ConfigError::invalid("max_attempts", "must be at least 1"));
        }
        if self.attempt_timeout.is_zero() {
            return Err(ConfigError::invalid("attempt_timeout", "must be positive"));
        }
        if !(self.backoff.multiplier >= 1.0 && self.backoff.multiplier.is_finite()) {
            return Err(ConfigError::invalid(
                "backoff.multiplier",
                format!("must be a finite number >= 1, got {}", self.backoff.multiplier),
            ));
        }
        if !(0.0..=1.0).contains(&self.backoff.jitter) {
            return Err(ConfigError::invalid(
                "backoff.jitter",
                format!("must be within [0, 1], got {}", self.backoff.jitter),
            ));
        }
        if self.backoff.max_delay < self.backoff.base {
            return Err(ConfigError::invalid(
                "backoff.max_delay",
                "must not be shorter than backoff.base",
            ));
        }
        if matches!(self.suite_deadline, Some(d) if d.is_zero()) {
            return Err(ConfigError::invalid("suite_deadline", "must be positive"));
        }
        Ok(())
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn with_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = timeout;
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn with_backoff(mut self, backoff: BackoffConfig) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn with_suite_deadline(mut self, deadline: Duration) -> Self {
        self.suite_deadline = Some(deadline);
        self
    }
}

impl fmt::Display for EngineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "concurrency={} attempt_timeout={} max_attempts={} backoff={}x{} (max {}, jitter {})",
            self.concurrency,
            humantime::format_duration(self.attempt_timeout),
            self.max_attempts,
            humantime::format_duration(self.backoff.base),
            self.backoff.multiplier,
            humantime::format_duration(self.backoff.max_delay),
            self.backoff.jitter,
        )?;
        if let Some(deadline) = self.suite_deadline {
            write!(f, " deadline={}", humantime::format_duration(deadline))?;
        }
        Ok(())
    }
}
