//! Reconnect policy shared by the chat transport and the notification stream.
//!
//! The delay before retry attempt `n` (zero-based) is
//! `min(base_delay * multiplier^n, max_delay)`. A policy with
//! `max_attempts = Some(k)` gives up after `k` consecutive failures; the
//! counter resets whenever a connection is established.

use std::time::Duration;

/// Default delay before the first retry.
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(1);

/// Default upper bound on any single retry delay.
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(30);

/// Retry budget of the notification stream.
pub const NOTIFICATION_MAX_ATTEMPTS: u32 = 5;

/// Exponential backoff parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Delay before the first retry
    pub base_delay: Duration,
    /// Growth factor per attempt (1 gives a fixed interval)
    pub multiplier: u32,
    /// Cap on any single delay
    pub max_delay: Duration,
    /// Consecutive failures tolerated. `None` retries forever.
    pub max_attempts: Option<u32>,
}

impl ReconnectPolicy {
    /// Policy for the notification stream: doubling, bounded budget.
    pub fn notifications() -> Self {
        Self {
            base_delay: DEFAULT_BASE_DELAY,
            multiplier: 2,
            max_delay: DEFAULT_MAX_DELAY,
            max_attempts: Some(NOTIFICATION_MAX_ATTEMPTS),
        }
    }

    /// Policy for the chat socket: doubling, unbounded.
    ///
    /// A chat window stays open while the user looks at it, so the socket
    /// keeps trying at the capped interval.
    pub fn chat() -> Self {
        Self {
            base_delay: DEFAULT_BASE_DELAY,
            multiplier: 2,
            max_delay: DEFAULT_MAX_DELAY,
            max_attempts: None,
        }
    }

    /// Fixed-interval policy.
    pub fn fixed(delay: Duration, max_attempts: Option<u32>) -> Self {
        Self { base_delay: delay, multiplier: 1, max_delay: delay, max_attempts }
    }

    /// Delay before zero-based attempt `attempt`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.multiplier
            .checked_pow(attempt)
            .and_then(|factor| self.base_delay.checked_mul(factor))
            .map_or(self.max_delay, |delay| delay.min(self.max_delay))
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::notifications()
    }
}

/// Attempt counter driven by a [`ReconnectPolicy`].
#[derive(Debug, Clone)]
pub struct Backoff {
    policy: ReconnectPolicy,
    attempt: u32,
}

impl Backoff {
    /// Create a counter at attempt zero.
    pub fn new(policy: ReconnectPolicy) -> Self {
        Self { policy, attempt: 0 }
    }

    /// Policy in use.
    pub fn policy(&self) -> &ReconnectPolicy {
        &self.policy
    }

    /// Failures recorded since the last reset.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Whether the retry budget is spent.
    pub fn is_exhausted(&self) -> bool {
        self.policy.max_attempts.is_some_and(|max| self.attempt >= max)
    }

    /// Consume one attempt and return its delay. `None` once exhausted.
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.is_exhausted() {
            return None;
        }
        let delay = self.policy.delay_for(self.attempt);
        self.attempt = self.attempt.saturating_add(1);
        Some(delay)
    }

    /// Back to attempt zero (call after a successful connection).
    pub fn reset(&mut self) {
        self.attempt = 0;
    }
}
