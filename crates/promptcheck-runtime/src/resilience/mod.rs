//! Resilience patterns for dispatching:
//! - Per-attempt hard timeouts
//! - Exponential backoff with jitter
//! - Retry classification by dispatch error kind

mod backoff;
mod retry;

pub use backoff::{jittered, BackoffSchedule};
pub use retry::{Attempted, RetryController, RetryFailure};
