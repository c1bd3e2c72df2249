//! Retry delay policies
//!
//! Every retry loop in the agent asks a [`Backoff`] for its next delay, so the
//! policy can be swapped without touching the loops themselves.

use std::time::Duration;
use udpu_shared::timing;

/// Source of delays between retry attempts
pub trait Backoff: Send {
    /// Delay to wait before the next attempt
    fn next_delay(&mut self) -> Duration;

    /// Forget accumulated state after a success
    fn reset(&mut self);
}

/// Same delay every time
#[derive(Debug, Clone)]
pub struct ConstantBackoff {
    delay: Duration,
}

impl ConstantBackoff {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

impl Default for ConstantBackoff {
    fn default() -> Self {
        Self::new(Duration::from_millis(timing::RETRY_DELAY_MS))
    }
}

impl Backoff for ConstantBackoff {
    fn next_delay(&mut self) -> Duration {
        self.delay
    }

    fn reset(&mut self) {}
}

/// Doubling delay with an upper bound
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    initial: Duration,
    max: Duration,
    current: Duration,
}

impl ExponentialBackoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            max,
            current: initial,
        }
    }
}

impl Backoff for ExponentialBackoff {
    fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = std::cmp::min(self.current.saturating_mul(2), self.max);
        delay
    }

    fn reset(&mut self) {
        self.current = self.initial;
    }
}
