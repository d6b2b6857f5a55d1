//! # Bounded retry of one hardware call.
//!
//! [`attempt`] runs a fallible call up to [`RetryPolicy::max_attempts`] times.
//!
//! ```text
//! for n in 1..=max:
//!   ├─► call()                       (wrapped in per-attempt timeout, if any)
//!   │     ├─ Ok(v)  → return Some(v)
//!   │     └─ Err(e) → progress(Failed { n, e })
//!   └─► if n < max:
//!         ├─► progress(Retrying { n, delay })
//!         └─► sleep(backoff.after_attempt(n))   (cancellable)
//! return None
//! ```
//!
//! ## Rules
//! - The callback sees every failed attempt, including the last one.
//! - No sleep follows the last attempt.
//! - A cancelled token ends the loop at the next sleep and yields `None`.

use std::future::Future;
use std::time::Duration;

use tokio::{select, time};
use tokio_util::sync::CancellationToken;

use crate::error::TransportError;
use crate::policies::RetryPolicy;
use crate::radio::Operation;

/// Progress report passed to the [`attempt`] callback.
#[derive(Debug)]
pub enum Progress<'e> {
    /// Attempt `attempt` (1-based) failed with `error`.
    Failed {
        attempt: u32,
        error: &'e TransportError,
    },
    /// Attempt `attempt + 1` follows after `delay`.
    Retrying { attempt: u32, delay: Duration },
}

/// Runs `call` until it succeeds or the attempt budget is spent.
///
/// Returns the first successful value, or `None` when every attempt failed or
/// `token` was cancelled.
pub async fn attempt<T, F, Fut, P>(
    op: Operation,
    policy: &RetryPolicy,
    token: &CancellationToken,
    mut call: F,
    mut progress: P,
) -> Option<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, TransportError>>,
    P: FnMut(Progress<'_>),
{
    let max = policy.max_attempts();

    for n in 1..=max {
        let res = match policy.timeout {
            Some(timeout) => match time::timeout(timeout, call()).await {
                Ok(r) => r,
                Err(_elapsed) => Err(TransportError::Timeout { op, timeout }),
            },
            None => call().await,
        };

        let error = match res {
            Ok(v) => return Some(v),
            Err(e) => e,
        };
        progress(Progress::Failed { attempt: n, error: &error });

        if n == max {
            break;
        }
        let delay = policy.backoff.after_attempt(n);
        progress(Progress::Retrying { attempt: n, delay });

        select! {
            _ = time::sleep(delay) => {}
            _ = token.cancelled() => return None,
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use tokio::time::Instant;

    use super::*;

    fn failing_until(calls: &AtomicU32, ok_at: u32) -> Result<u32, TransportError> {
        let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
        if n >= ok_at {
            Ok(n)
        } else {
            Err(TransportError::failed(Operation::Subscribe, "busy"))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_on_third_attempt_after_backoff() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let mut failures = Vec::new();
        let mut delays = Vec::new();
        let started = Instant::now();

        let res = attempt(
            Operation::Subscribe,
            &RetryPolicy::default(),
            &CancellationToken::new(),
            move || async move { failing_until(counter, 3) },
            |p| match p {
                Progress::Failed { attempt, .. } => failures.push(attempt),
                Progress::Retrying { delay, .. } => delays.push(delay),
            },
        )
        .await;

        assert_eq!(res, Some(3));
        assert_eq!(failures, vec![1, 2]);
        assert_eq!(delays, vec![Duration::from_secs(1), Duration::from_secs(3)]);
        assert_eq!(started.elapsed(), Duration::from_secs(4));
    }

    #[tokio::test(start_paused = true)]
    async fn exhaustion_reports_every_failure_and_no_trailing_sleep() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let mut failures = 0;
        let started = Instant::now();

        let res = attempt(
            Operation::Connect,
            &RetryPolicy::default(),
            &CancellationToken::new(),
            move || async move { failing_until(counter, u32::MAX) },
            |p| {
                if let Progress::Failed { .. } = p {
                    failures += 1;
                }
            },
        )
        .await;

        assert_eq!(res, None);
        assert_eq!(failures, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(started.elapsed(), Duration::from_secs(4));
    }

    #[tokio::test(start_paused = true)]
    async fn per_attempt_timeout_is_a_failure() {
        let policy = RetryPolicy {
            attempts: 2,
            ..RetryPolicy::default()
        }
        .with_timeout(Duration::from_secs(30));
        let mut errors = Vec::new();

        let res: Option<()> = attempt(
            Operation::Connect,
            &policy,
            &CancellationToken::new(),
            || std::future::pending(),
            |p| {
                if let Progress::Failed { error, .. } = p {
                    errors.push(error.as_label());
                }
            },
        )
        .await;

        assert_eq!(res, None);
        assert_eq!(errors, vec!["transport_timeout", "transport_timeout"]);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_stops_between_attempts() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let token = CancellationToken::new();
        token.cancel();

        let res = attempt(
            Operation::Discover,
            &RetryPolicy::default(),
            &token,
            move || async move { failing_until(counter, u32::MAX) },
            |_| {},
        )
        .await;

        assert_eq!(res, None);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
