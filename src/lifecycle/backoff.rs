use std::time::Duration;

const DEFAULT_MAX_ATTEMPTS: u32 = 5;
const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(5);
const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(30);
const DEFAULT_MULTIPLIER: f64 = 1.5;

/// Bounds of a connection campaign.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Attempts per campaign, including the first one.
    pub max_attempts: u32,
    /// Wait before the second attempt.
    pub base_delay: Duration,
    /// Upper bound for any single wait.
    pub max_delay: Duration,
    /// Growth factor applied after each failed attempt.
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
            multiplier: DEFAULT_MULTIPLIER,
        }
    }
}

impl RetryPolicy {
    /// Grow `current` by the multiplier, never past `max_delay`.
    pub fn next_delay(&self, current: Duration) -> Duration {
        let grown = current.as_secs_f64() * self.multiplier;
        if !grown.is_finite() || grown >= self.max_delay.as_secs_f64() {
            return self.max_delay;
        }
        current.mul_f64(self.multiplier).min(self.max_delay)
    }
}

/// Mutable backoff position within a single campaign.
#[derive(Debug, Clone)]
pub struct Backoff {
    current: Duration,
}

impl Backoff {
    /// Start a fresh campaign at the base delay.
    pub fn new(policy: &RetryPolicy) -> Self {
        Self {
            current: policy.base_delay.min(policy.max_delay),
        }
    }

    /// Delay the next wait will use.
    pub fn current(&self) -> Duration {
        self.current
    }

    /// Return the wait to perform now and advance to the next one.
    pub fn advance(&mut self, policy: &RetryPolicy) -> Duration {
        let wait = self.current;
        self.current = policy.next_delay(wait);
        wait
    }

    /// Rewind to the base delay.
    pub fn reset(&mut self, policy: &RetryPolicy) {
        self.current = policy.base_delay.min(policy.max_delay);
    }
}
