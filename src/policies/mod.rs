//! Retry policies.
//!
//! This module groups the knobs that control **how often** a hardware call is
//! attempted and **how long** to wait between attempts.
//!
//! ## Contents
//! - [`RetryPolicy`]   attempt budget + per-attempt deadline for one call site
//! - [`BackoffPolicy`] how delays evolve (first / factor / max)
//!
//! ## Quick wiring
//! ```text
//! Config::retry_policy() / Config::connect_policy()
//!      └─► core::retry::attempt uses:
//!           - max_attempts() to bound the loop
//!           - timeout to wrap each attempt
//!           - backoff.after_attempt(n) to sleep before attempt n+1
//! ```

mod backoff;
mod retry;

pub use backoff::BackoffPolicy;
pub use retry::RetryPolicy;
