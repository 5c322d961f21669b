use std::time::Duration;

const BACKOFF_FACTOR: u32 = 2;

/// Tick delay for a background poll, stretched by consecutive failures.
#[derive(Debug, Clone)]
pub struct RetryState {
    base_delay: Duration,
    max_delay: Duration,
    backoff: bool,
    consecutive_failures: u32,
}

impl RetryState {
    pub fn new(base_delay: Duration, max_delay: Duration, backoff: bool) -> Self {
        Self {
            base_delay,
            max_delay: max_delay.max(base_delay),
            backoff,
            consecutive_failures: 0,
        }
    }

    pub fn fixed(delay: Duration) -> Self {
        Self::new(delay, delay, false)
    }

    pub fn record_success(&mut self) {
        self.consecutive_failures = 0;
    }

    pub fn record_failure(&mut self) {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
    }

    pub fn current_delay(&self) -> Duration {
        if !self.backoff || self.consecutive_failures == 0 {
            return self.base_delay;
        }

        let exponent = (self.consecutive_failures - 1).min(31);
        let factor = BACKOFF_FACTOR.saturating_pow(exponent);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub fn is_in_backoff(&self) -> bool {
        self.backoff && self.consecutive_failures > 0
    }
}
