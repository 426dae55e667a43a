use std::time::Duration;

/// Exponential delay between polls of one saved search.
///
/// After `n` consecutive failures the delay is `base * 2^n`, capped at
/// `max`. Any success resets it to `base`, the regular poll interval.
#[derive(Debug, Clone)]
pub struct Backoff {
    base: Duration,
    max: Duration,
    failures: u32,
}

impl Backoff {
    pub fn new(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max: max.max(base),
            failures: 0,
        }
    }

    /// Delay before the next poll given the failures recorded so far.
    pub fn current(&self) -> Duration {
        // 2^31 already saturates any realistic base.
        let factor = 2u32.saturating_pow(self.failures.min(31));
        self.base.saturating_mul(factor).min(self.max)
    }

    /// Record a failure and return the delay before the retry.
    pub fn failure(&mut self) -> Duration {
        self.failures = self.failures.saturating_add(1);
        self.current()
    }

    /// Record a success and return the regular poll interval.
    pub fn reset(&mut self) -> Duration {
        self.failures = 0;
        self.base
    }
}
