//! Exponential reconnect backoff with bounded jitter.
//!
//! [`ReconnectBackoff::next_delay`] is the pure schedule; [`BackoffState`]
//! layers attempt counting and jitter on top for the reconnect loop.

use std::time::Duration;

/// Backoff policy for re-opening the chat event stream.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectBackoff {
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Upper bound for any single delay, jitter included.
    pub max_delay: Duration,
    /// Growth factor between consecutive attempts (values below 2 are raised to 2).
    pub multiplier: u32,
    /// Fraction of the base delay added as random jitter, clamped to `0.0..=0.9`.
    pub jitter_ratio: f64,
    /// Consecutive failed attempts tolerated before giving up (`None` = unlimited).
    pub max_attempts: Option<u32>,
}

impl Default for ReconnectBackoff {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(60),
            multiplier: 2,
            jitter_ratio: 0.5,
            max_attempts: None,
        }
    }
}

impl ReconnectBackoff {
    /// Base delay before retry number `attempt` (1-based), without jitter.
    ///
    /// Attempt 0 is treated as attempt 1. The result never exceeds `max_delay`.
    pub fn next_delay(&self, attempt: u32) -> Duration {
        let multiplier = self.multiplier.max(2);
        let mut delay = self.initial_delay.min(self.max_delay);
        for _ in 1..attempt.max(1) {
            delay = delay.saturating_mul(multiplier);
            if delay >= self.max_delay {
                return self.max_delay;
            }
        }
        delay
    }

    /// Delay for `attempt` with jitter `unit` (expected in `0.0..1.0`) applied.
    ///
    /// Below the cap, jittered delays are strictly increasing in `attempt`
    /// because the jitter never reaches the gap to the next base delay.
    pub fn jittered_delay(&self, attempt: u32, unit: f64) -> Duration {
        let base = self.next_delay(attempt);
        let unit = if unit.is_finite() {
            unit.clamp(0.0, 1.0)
        } else {
            0.0
        };
        let ratio = if self.jitter_ratio.is_finite() {
            self.jitter_ratio.clamp(0.0, 0.9)
        } else {
            0.0
        };
        base.saturating_add(base.mul_f64(ratio * unit))
            .min(self.max_delay)
    }

    /// Returns true when `attempt` consecutive failures exceed `max_attempts`.
    pub fn is_exhausted(&self, attempt: u32) -> bool {
        matches!(self.max_attempts, Some(limit) if attempt > limit)
    }
}

fn random_unit() -> f64 {
    rand::random::<f64>()
}

/// Tracks consecutive failures for one reconnect sequence.
#[derive(Debug, Clone)]
pub struct BackoffState {
    policy: ReconnectBackoff,
    attempt: u32,
    last_delay: Option<Duration>,
    jitter: fn() -> f64,
}

impl BackoffState {
    pub fn new(policy: ReconnectBackoff) -> Self {
        Self::with_jitter(policy, random_unit)
    }

    /// Builds a state with a custom jitter source returning values in `0.0..1.0`.
    pub fn with_jitter(policy: ReconnectBackoff, jitter: fn() -> f64) -> Self {
        Self {
            policy,
            attempt: 0,
            last_delay: None,
            jitter,
        }
    }

    /// Records a failed attempt and returns the delay to wait before the next
    /// one, or `None` once the policy's attempt limit is reached.
    pub fn record_failure(&mut self) -> Option<Duration> {
        self.attempt = self.attempt.saturating_add(1);
        if self.policy.is_exhausted(self.attempt) {
            return None;
        }
        let delay = self.policy.jittered_delay(self.attempt, (self.jitter)());
        self.last_delay = Some(delay);
        Some(delay)
    }

    /// Resets the sequence after a successful connection.
    pub fn record_success(&mut self) {
        self.attempt = 0;
        self.last_delay = None;
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn last_delay(&self) -> Option<Duration> {
        self.last_delay
    }

    pub fn policy(&self) -> &ReconnectBackoff {
        &self.policy
    }
}
