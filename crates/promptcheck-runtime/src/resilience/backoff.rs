//! Exponential backoff with proportional jitter.

use backon::{BackoffBuilder, ExponentialBackoff, ExponentialBuilder};
use rand::Rng;
use std::time::Duration;

use crate::config::BackoffConfig;

/// Delays between the attempts of one case.
///
/// Yields at most `retries` delays. Each is the exponential step scaled by a
/// random factor in `[1 - jitter, 1 + jitter]`, capped at `max_delay`, and
/// then raised to any provider retry-after hint.
pub struct BackoffSchedule {
    steps: ExponentialBackoff,
    jitter: f64,
    max_delay: Duration,
}

impl BackoffSchedule {
    pub fn new(config: &BackoffConfig, retries: usize) -> Self {
        let steps = ExponentialBuilder::default()
            .with_min_delay(config.base)
            .with_max_delay(config.max_delay)
            .with_factor(config.multiplier as f32)
            .with_max_times(retries)
            .build();

        Self {
            steps,
            jitter: config.jitter,
            max_delay: config.max_delay,
        }
    }

    /// The next delay, or `None` once the retry budget is spent.
    pub fn next_delay(&mut self, retry_after: Option<Duration>) -> Option<Duration> {
        let step = self.steps.next()?;
        let delay = jittered(step, self.jitter, &mut rand::thread_rng()).min(self.max_delay);
        Some(match retry_after {
            Some(floor) => delay.max(floor),
            None => delay,
        })
    }
}

/// Scale `delay` by a uniform factor in `[1 - jitter, 1 + jitter]`.
pub fn jittered<R: Rng + ?Sized>(delay: Duration, jitter: f64, rng: &mut R) -> Duration {
    if jitter <= 0.0 || delay.is_zero() {
        return delay;
    }
    let factor = rng.gen_range((1.0 - jitter)..=(1.0 + jitter));
    delay.mul_f64(factor.max(0.0))
}
