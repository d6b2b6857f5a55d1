//! # Backoff between hardware retry attempts.
//!
//! [`BackoffPolicy`] computes how long the retry executor sleeps after a failed
//! attempt. The delay after attempt `n` (1-based) is `first × factor^(n-1)`,
//! clamped to `max`. Each delay is derived from the attempt index alone, so a
//! slow attempt never stretches the following waits.
//!
//! # Example
//! ```rust
//! use std::time::Duration;
//! use radiovisor::BackoffPolicy;
//!
//! let backoff = BackoffPolicy::default();
//!
//! // 1s, 3s, 9s ...
//! assert_eq!(backoff.after_attempt(1), Duration::from_secs(1));
//! assert_eq!(backoff.after_attempt(2), Duration::from_secs(3));
//! assert_eq!(backoff.after_attempt(3), Duration::from_secs(9));
//! ```

use std::time::Duration;

/// Exponential retry backoff.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BackoffPolicy {
    /// Delay after the first failed attempt.
    pub first: Duration,
    /// Upper bound for any single delay.
    pub max: Duration,
    /// Multiplicative growth factor.
    pub factor: f64,
}

impl Default for BackoffPolicy {
    /// Returns a strategy with:
    /// - `first = 1s`;
    /// - `factor = 3.0`;
    /// - `max = 60s`.
    fn default() -> Self {
        Self {
            first: Duration::from_secs(1),
            max: Duration::from_secs(60),
            factor: 3.0,
        }
    }
}

impl BackoffPolicy {
    /// Creates a policy with the given first delay and factor, capped at one minute.
    pub fn new(first: Duration, factor: f64) -> Self {
        Self {
            first,
            factor,
            ..Self::default()
        }
    }

    /// Delay to wait after failed attempt number `attempt` (1-based).
    ///
    /// `attempt = 0` is treated as `1`. Non-finite or negative results clamp to [`BackoffPolicy::max`].
    pub fn after_attempt(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let secs = self.first.as_secs_f64() * self.factor.powi(exp);

        if !secs.is_finite() || secs < 0.0 || secs > self.max.as_secs_f64() {
            self.max
        } else {
            Duration::from_secs_f64(secs)
        }
    }
}
