//! Typed failures a model backend can report for one dispatch.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Failure of a single dispatch to a provider gateway.
///
/// Gateways never retry; the retry controller decides what happens next
/// based on [`DispatchError::is_retryable`].
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DispatchError {
    #[error("Authentication rejected by provider")]
    Unauthorized,

    #[error("Rate limit exceeded, retry after {retry_after:?}")]
    RateLimited {
        #[serde(default, with = "crate::durations::millis_option")]
        retry_after: Option<Duration>,
    },

    #[error("Attempt timed out")]
    Timeout,

    #[error("Transport failure: {detail}")]
    Transport { detail: String },

    #[error("Malformed response: {detail}")]
    MalformedResponse { detail: String },
}

impl DispatchError {
    pub fn rate_limited(retry_after: Option<Duration>) -> Self {
        Self::RateLimited { retry_after }
    }

    pub fn transport(detail: impl Into<String>) -> Self {
        Self::Transport {
            detail: detail.into(),
        }
    }

    pub fn malformed(detail: impl Into<String>) -> Self {
        Self::MalformedResponse {
            detail: detail.into(),
        }
    }

    /// Whether another attempt could succeed.
    ///
    /// Credential and protocol mismatches are terminal.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::RateLimited { .. } | Self::Timeout | Self::Transport { .. }
        )
    }

    /// Provider-supplied floor for the next backoff interval.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }

    /// Short stable name, used in logs and reports.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Unauthorized => "unauthorized",
            Self::RateLimited { .. } => "rate_limited",
            Self::Timeout => "timeout",
            Self::Transport { .. } => "transport",
            Self::MalformedResponse { .. } => "malformed_response",
        }
    }
}
