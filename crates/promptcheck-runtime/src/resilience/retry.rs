//! Retry/timeout controller around a single gateway.
//!
//! | DispatchError | Action |
//! |---------------|--------|
//! | `RateLimited` | retry, retry-after hint is a floor for the delay |
//! | `Timeout`, `Transport` | retry up to the attempt cap |
//! | `Unauthorized`, `MalformedResponse` | stop immediately |
//!
//! Every attempt runs under a hard deadline. The suite deadline is checked
//! before each attempt and before each backoff sleep; an attempt already in
//! flight always runs to completion.

use promptcheck_core::{DispatchError, ModelResponse};
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tokio::time::Instant;

use super::backoff::BackoffSchedule;
use crate::config::{BackoffConfig, EngineConfig};
use crate::providers::{ExecutionRequest, ProviderGateway};

/// Why the controller gave up without a response.
#[derive(Debug, Clone, PartialEq)]
pub enum RetryFailure {
    /// Terminal error, or the last error once attempts ran out
    Dispatch(DispatchError),

    /// The suite deadline stopped further attempts
    DeadlineReached { last_error: Option<DispatchError> },
}

/// Result of driving one request to completion.
#[derive(Debug)]
pub struct Attempted {
    pub result: Result<ModelResponse, RetryFailure>,

    /// Dispatch calls actually made
    pub attempts: u32,
}

#[derive(Debug, Clone)]
pub struct RetryController {
    max_attempts: u32,
    backoff: BackoffConfig,
}

impl RetryController {
    pub fn new(max_attempts: u32, backoff: BackoffConfig) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff,
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(config.max_attempts, config.backoff.clone())
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Dispatch `request` until it succeeds, fails terminally, runs out of
    /// attempts or reaches `deadline`.
    pub async fn run(
        &self,
        gateway: &dyn ProviderGateway,
        request: &ExecutionRequest,
        deadline: Option<Instant>,
    ) -> Attempted {
        let attempts = AtomicU32::new(0);
        let result = self.run_tracked(gateway, request, deadline, &attempts).await;
        Attempted {
            result,
            attempts: attempts.into_inner(),
        }
    }

    /// [`RetryController::run`] with the attempt count kept in `attempts`,
    /// which is bumped before each dispatch. The count stays readable when
    /// the future unwinds or is dropped mid-attempt.
    pub async fn run_tracked(
        &self,
        gateway: &dyn ProviderGateway,
        request: &ExecutionRequest,
        deadline: Option<Instant>,
        attempts: &AtomicU32,
    ) -> Result<ModelResponse, RetryFailure> {
        let mut schedule = BackoffSchedule::new(&self.backoff, (self.max_attempts - 1) as usize);
        let mut last_error: Option<DispatchError> = None;

        loop {
            if deadline.is_some_and(|d| Instant::now() >= d) {
                return Err(RetryFailure::DeadlineReached { last_error });
            }

            let attempt_no = attempts.fetch_add(1, Ordering::SeqCst) + 1;
            let error = match attempt(gateway, request).await {
                Ok(response) => {
                    tracing::debug!(
                        case = %request.case_id,
                        provider = gateway.name(),
                        attempt = attempt_no,
                        "Dispatch succeeded"
                    );
                    return Ok(response);
                }
                Err(e) => e,
            };

            if !error.is_retryable() {
                tracing::warn!(
                    case = %request.case_id,
                    provider = gateway.name(),
                    attempt = attempt_no,
                    error = %error,
                    "Dispatch failed terminally"
                );
                return Err(RetryFailure::Dispatch(error));
            }

            let Some(delay) = schedule.next_delay(error.retry_after()) else {
                tracing::warn!(
                    case = %request.case_id,
                    provider = gateway.name(),
                    attempt = attempt_no,
                    error = %error,
                    "Dispatch attempts exhausted"
                );
                return Err(RetryFailure::Dispatch(error));
            };

            // A delay too large to represent lands past any deadline.
            if deadline.is_some_and(|d| Instant::now().checked_add(delay).map_or(true, |t| t >= d)) {
                tracing::warn!(
                    case = %request.case_id,
                    attempt = attempt_no,
                    error = %error,
                    "Suite deadline reached, not retrying"
                );
                return Err(RetryFailure::DeadlineReached {
                    last_error: Some(error),
                });
            }

            tracing::warn!(
                case = %request.case_id,
                provider = gateway.name(),
                attempt = attempt_no,
                error = %error,
                delay = ?delay,
                "Dispatch failed, retrying"
            );
            tokio::time::sleep(delay).await;
            last_error = Some(error);
        }
    }
}

/// One dispatch under the request's hard timeout.
async fn attempt(
    gateway: &dyn ProviderGateway,
    request: &ExecutionRequest,
) -> Result<ModelResponse, DispatchError> {
    let limit: Duration = request.timeout;
    match tokio::time::timeout(limit, gateway.dispatch(request)).await {
        Ok(result) => result,
        Err(_) => Err(DispatchError::Timeout),
    }
}
