//! # Runtime tuning.
//!
//! Provides [`Config`], the centralized timing and threshold settings shared by
//! every poller and the reset coordinator.
//!
//! ## Sentinel values
//! - `retry_attempts = 0` → clamped to one attempt
//! - `bus_capacity = 0` → clamped to 1
//! - `connect_timeout = 0s` → no per-attempt connect deadline
//!
//! # Example
//! ```
//! use std::time::Duration;
//! use radiovisor::Config;
//!
//! let mut cfg = Config::default();
//! cfg.measurement_interval = Duration::from_secs(12);
//!
//! // Failed cycles retry at half the interval, but never faster than the floor.
//! assert_eq!(cfg.failure_interval(), Duration::from_secs(10));
//! ```

use std::time::Duration;

use crate::policies::{BackoffPolicy, RetryPolicy};

/// Timing and threshold settings for the polling runtime.
///
/// ## Field semantics
/// - `measurement_interval`: pause after a successful cycle
/// - `min_retry_interval`: lower bound of the pause after a failed cycle
/// - `notification_window`: how long a subscription is held per cycle
/// - `failure_threshold`: consecutive failures that request a radio reset
/// - `failure_cap`: consecutive-failure value at which the counter is halved
/// - `reset_*`: reset coordinator cadence and deadlines
#[derive(Clone, Debug)]
pub struct Config {
    /// Pause between successful cycles of one device.
    pub measurement_interval: Duration,

    /// Lower bound for the pause after a failed cycle.
    pub min_retry_interval: Duration,

    /// Attempts for connect/discover/subscribe/unsubscribe.
    pub retry_attempts: u32,

    /// Delay growth between attempts.
    pub retry_backoff: BackoffPolicy,

    /// Deadline for a single connect attempt.
    pub connect_timeout: Duration,

    /// How long a subscription stays open to collect notifications.
    pub notification_window: Duration,

    /// Consecutive failures (per device) that request a global radio reset.
    ///
    /// Applies to both the per-operation tally and the per-cycle counter.
    pub failure_threshold: u32,

    /// Per-cycle failure counter value at which it is halved.
    pub failure_cap: u32,

    /// Pause after a poller requested a reset, giving the coordinator time to rebuild.
    pub reset_grace: Duration,

    /// How often the reset coordinator checks the reset flag.
    pub reset_poll_interval: Duration,

    /// How long the coordinator waits for the radio lock before force-reclaiming.
    pub reset_lock_timeout: Duration,

    /// Extra pause after a failed rebuild before the coordinator tries again.
    pub rebuild_backoff: Duration,

    /// Start delay added per poller index to spread the initial acquisitions.
    pub stagger: Duration,

    /// Wait before constructing the first radio handle.
    pub startup_delay: Duration,

    /// Capacity of the lifecycle event bus ring buffer.
    pub bus_capacity: usize,
}

impl Config {
    /// Returns the retry policy for discover/subscribe/unsubscribe.
    #[inline]
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            attempts: self.retry_attempts,
            backoff: self.retry_backoff,
            timeout: None,
        }
    }

    /// Returns the retry policy for connect (with per-attempt deadline).
    #[inline]
    pub fn connect_policy(&self) -> RetryPolicy {
        self.retry_policy().with_timeout(self.connect_timeout)
    }

    /// Pause after a failed cycle: half the measurement interval, floored at `min_retry_interval`.
    #[inline]
    pub fn failure_interval(&self) -> Duration {
        (self.measurement_interval / 2).max(self.min_retry_interval)
    }

    /// Initial start delay for the poller at `index`.
    #[inline]
    pub fn stagger_for(&self, index: usize) -> Duration {
        self.stagger
            .saturating_mul(u32::try_from(index).unwrap_or(u32::MAX))
    }

    /// Returns a bus capacity clamped to a minimum of 1.
    #[inline]
    pub fn bus_capacity_clamped(&self) -> usize {
        self.bus_capacity.max(1)
    }
}

impl Default for Config {
    /// Default configuration:
    ///
    /// - `measurement_interval = 60s`, `min_retry_interval = 10s`
    /// - `retry_attempts = 3`, backoff `1s × 3^n`, `connect_timeout = 30s`
    /// - `notification_window = 6s`
    /// - `failure_threshold = 3`, `failure_cap = 5`, `reset_grace = 10s`
    /// - `reset_poll_interval = 5s`, `reset_lock_timeout = 10s`, `rebuild_backoff = 10s`
    /// - `stagger = 2s`, `startup_delay = 5s`, `bus_capacity = 1024`
    fn default() -> Self {
        Self {
            measurement_interval: Duration::from_secs(60),
            min_retry_interval: Duration::from_secs(10),
            retry_attempts: 3,
            retry_backoff: BackoffPolicy::default(),
            connect_timeout: Duration::from_secs(30),
            notification_window: Duration::from_secs(6),
            failure_threshold: 3,
            failure_cap: 5,
            reset_grace: Duration::from_secs(10),
            reset_poll_interval: Duration::from_secs(5),
            reset_lock_timeout: Duration::from_secs(10),
            rebuild_backoff: Duration::from_secs(10),
            stagger: Duration::from_secs(2),
            startup_delay: Duration::from_secs(5),
            bus_capacity: 1024,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_interval_is_half_with_floor() {
        let mut cfg = Config::default();
        assert_eq!(cfg.failure_interval(), Duration::from_secs(30));

        cfg.measurement_interval = Duration::from_secs(8);
        assert_eq!(cfg.failure_interval(), Duration::from_secs(10));
    }

    #[test]
    fn connect_policy_carries_deadline() {
        let cfg = Config::default();
        assert_eq!(cfg.connect_policy().timeout, Some(Duration::from_secs(30)));
        assert_eq!(cfg.retry_policy().timeout, None);
        assert_eq!(cfg.retry_policy().max_attempts(), 3);
    }

    #[test]
    fn stagger_grows_with_index() {
        let cfg = Config::default();
        assert_eq!(cfg.stagger_for(0), Duration::ZERO);
        assert_eq!(cfg.stagger_for(3), Duration::from_secs(6));
    }
}
