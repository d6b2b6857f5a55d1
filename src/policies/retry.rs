//! # Retry policy for hardware operations.
//!
//! [`RetryPolicy`] bundles how many times an operation is attempted, how long to
//! wait between attempts and the optional per-attempt deadline. Deadlines are
//! per attempt, never cumulative across retries.

use std::time::Duration;

use crate::policies::BackoffPolicy;

/// Attempt budget for one call site.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RetryPolicy {
    /// Maximum attempts (`0` is clamped to `1`).
    pub attempts: u32,
    /// Delay between attempts.
    pub backoff: BackoffPolicy,
    /// Deadline for each individual attempt (`None` = unbounded).
    pub timeout: Option<Duration>,
}

impl Default for RetryPolicy {
    /// Three attempts, default backoff, no deadline.
    fn default() -> Self {
        Self {
            attempts: 3,
            backoff: BackoffPolicy::default(),
            timeout: None,
        }
    }
}

impl RetryPolicy {
    /// Returns the attempt budget clamped to a minimum of 1.
    #[inline]
    pub fn max_attempts(&self) -> u32 {
        self.attempts.max(1)
    }

    /// Returns a copy with a per-attempt deadline.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout).filter(|d| !d.is_zero());
        self
    }
}
