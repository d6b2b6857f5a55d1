//! # Failure tally and reset flag.
//!
//! ```text
//!  Poller ── increment(device) ──► tallies[device] += 1 ──(≥ threshold)──► ResetFlag::request()
//!  Poller ── reset(device) ──────► tallies[device] = 0
//!  Coordinator ── reset_all() ───► every tally = 0
//!  Coordinator ── ResetFlag::clear() after a successful rebuild
//! ```
//!
//! The tally map has its own short-held lock, separate from the radio lock, and
//! is never held across an `.await`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use crate::events::{Bus, Event, EventKind};

/// Process-wide "rebuild the radio" request.
///
/// Raising an already raised flag is a no-op; clearing is idempotent.
#[derive(Debug, Default)]
pub struct ResetFlag {
    requested: AtomicBool,
    raised: AtomicU64,
}

impl ResetFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raises the flag. Returns `true` only if it was clear before.
    pub fn request(&self) -> bool {
        let newly = !self.requested.swap(true, Ordering::AcqRel);
        if newly {
            self.raised.fetch_add(1, Ordering::AcqRel);
        }
        newly
    }

    /// Clears the flag.
    pub fn clear(&self) {
        self.requested.store(false, Ordering::Release);
    }

    /// True while a rebuild is pending or in progress.
    pub fn is_requested(&self) -> bool {
        self.requested.load(Ordering::Acquire)
    }

    /// How many times the flag went from clear to set.
    pub fn times_raised(&self) -> u64 {
        self.raised.load(Ordering::Acquire)
    }
}

/// Per-device consecutive error counts.
pub struct FailureTracker {
    tallies: Mutex<HashMap<Arc<str>, u32>>,
    threshold: u32,
    reset: Arc<ResetFlag>,
    bus: Bus,
}

impl FailureTracker {
    /// Creates a tracker that raises `reset` when any tally reaches `threshold` (min 1).
    pub fn new(threshold: u32, reset: Arc<ResetFlag>, bus: Bus) -> Self {
        Self {
            tallies: Mutex::new(HashMap::new()),
            threshold: threshold.max(1),
            reset,
            bus,
        }
    }

    /// Counts one failed operation for `device` and returns the new tally.
    ///
    /// Reaching the threshold requests a global reset.
    pub fn increment(&self, device: &Arc<str>) -> u32 {
        let count = {
            let mut tallies = self.tallies.lock().unwrap_or_else(PoisonError::into_inner);
            let count = tallies.entry(Arc::clone(device)).or_insert(0);
            *count = count.saturating_add(1);
            *count
        };

        if count >= self.threshold {
            self.bus.publish(
                Event::new(EventKind::DeviceUnhealthy)
                    .with_device(Arc::clone(device))
                    .with_attempt(count),
            );
            request_reset(
                &self.reset,
                &self.bus,
                device,
                format!("{count} consecutive errors"),
            );
        }
        count
    }

    /// Sets the tally of `device` to zero.
    pub fn reset(&self, device: &str) {
        let mut tallies = self.tallies.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(count) = tallies.get_mut(device) {
            *count = 0;
        }
    }

    /// Sets every tally to zero.
    pub fn reset_all(&self) {
        let mut tallies = self.tallies.lock().unwrap_or_else(PoisonError::into_inner);
        tallies.values_mut().for_each(|count| *count = 0);
    }

    /// Current tally of `device` (zero if never counted).
    pub fn get(&self, device: &str) -> u32 {
        self.tallies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(device)
            .copied()
            .unwrap_or(0)
    }

    /// The flag this tracker escalates to.
    pub fn reset_flag(&self) -> &Arc<ResetFlag> {
        &self.reset
    }
}

/// Raises `flag` on behalf of `device`, publishing `ResetRequested` on the clear→set edge.
pub(crate) fn request_reset(flag: &ResetFlag, bus: &Bus, device: &Arc<str>, reason: String) {
    if flag.request() {
        bus.publish(
            Event::new(EventKind::ResetRequested)
                .with_device(Arc::clone(device))
                .with_reason(reason),
        );
    }
}
