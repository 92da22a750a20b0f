//! Exponential retry delay for the device read loop.

use std::time::Duration;

/// Smallest delay ever returned.
const MIN_DELAY: Duration = Duration::from_millis(1);

/// Doubling delay, capped at `max`, reset after a successful read.
#[derive(Clone, Debug)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    current: Option<Duration>,
}

impl Backoff {
    /// Start at `initial`, never exceed `max`.
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial: initial.clamp(MIN_DELAY, max.max(MIN_DELAY)),
            max: max.max(MIN_DELAY),
            current: None,
        }
    }

    /// Delay to wait before the next retry.
    pub fn next_delay(&mut self) -> Duration {
        let next = match self.current {
            None => self.initial,
            Some(prev) => prev.saturating_mul(2).min(self.max),
        };
        self.current = Some(next);
        next
    }

    /// Forget previous failures.
    pub fn reset(&mut self) {
        self.current = None;
    }
}
