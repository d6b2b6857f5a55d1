//! # Lifecycle events emitted by pollers, the reset coordinator and subscriber workers.
//!
//! The [`EventKind`] enum classifies events across four groups:
//! - **Cycle events**: one poll cycle of one device (starting, succeeded, failed)
//! - **Operation events**: individual hardware calls (failed attempt, retry scheduled, dropped reading)
//! - **Reset events**: escalation and rebuild of the shared radio
//! - **Subscriber events**: overflow and panic reports from the fan-out workers
//!
//! The [`Event`] struct carries the optional metadata (device, operation, attempt,
//! delay, reason, radio generation).
//!
//! ## Ordering guarantees
//! Each event has a globally unique sequence number (`seq`) that increases monotonically.
//! Use `seq` to restore the exact order when events are delivered out of order.
//!
//! ## Example
//! ```rust
//! use std::time::Duration;
//! use radiovisor::events::{Event, EventKind};
//! use radiovisor::radio::Operation;
//!
//! let ev = Event::new(EventKind::RetryScheduled)
//!     .with_device("kitchen")
//!     .with_op(Operation::Connect)
//!     .with_attempt(1)
//!     .with_delay(Duration::from_secs(1));
//!
//! assert_eq!(ev.device.as_deref(), Some("kitchen"));
//! assert_eq!(ev.delay_ms, Some(1000));
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::{Duration, SystemTime};

use crate::radio::Operation;

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of runtime events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    // === Cycle events ===
    /// Poller holds the radio lease and is about to connect.
    ///
    /// Sets: `device`, `generation`
    CycleStarting,

    /// Connect, discovery and subscription all succeeded.
    ///
    /// Sets: `device`, `delay_ms` (pause before the next cycle)
    CycleSucceeded,

    /// The cycle failed at some step; disconnect and release still ran.
    ///
    /// Sets: `device`, `op` (failed step), `attempt` (consecutive failed cycles),
    /// `delay_ms` (pause before the next cycle)
    CycleFailed,

    // === Operation events ===
    /// One attempt of a hardware call failed.
    ///
    /// Sets: `device`, `op`, `attempt`, `reason`
    OperationFailed,

    /// Another attempt follows after a backoff delay.
    ///
    /// Sets: `device`, `op`, `attempt` (the failed one), `delay_ms`
    RetryScheduled,

    /// A notification payload could not be decoded; no metric was updated.
    ///
    /// Sets: `device`, `reason`
    ReadingDropped,

    // === Reset events ===
    /// A device crossed the failure threshold.
    ///
    /// Sets: `device`, `attempt` (failure count that crossed it)
    DeviceUnhealthy,

    /// The global reset flag went from clear to set.
    ///
    /// Sets: `device` (who raised it), `reason`
    ResetRequested,

    /// A new radio handle is installed and the reset flag cleared.
    ///
    /// Sets: `generation`
    RebuildCompleted,

    /// Constructing the new radio handle failed; the flag stays set.
    ///
    /// Sets: `reason`, `delay_ms` (backoff before the next check)
    RebuildFailed,

    /// The radio lock was not acquired in time; the handle is stopped underneath its holder.
    ///
    /// Sets: `timeout_ms` (lock wait that elapsed), `generation` (handle being stopped)
    ForcedReclaim,

    // === Subscriber events ===
    /// Subscriber dropped an event (queue full or worker closed).
    ///
    /// Sets: `reason`
    SubscriberOverflow,

    /// Subscriber panicked during event processing.
    ///
    /// Sets: `reason`
    SubscriberPanicked,
}

/// Runtime event with optional metadata.
///
/// - `seq`: monotonic global sequence for ordering
/// - `at`: wall-clock timestamp (for logs)
/// - other optional fields are set depending on the [`EventKind`]
#[derive(Clone, Debug)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Event classification.
    pub kind: EventKind,

    /// Device name, if applicable.
    pub device: Option<Arc<str>>,
    /// Hardware operation, if applicable.
    pub op: Option<Operation>,
    /// Attempt or failure count (starting from 1).
    pub attempt: Option<u32>,
    /// Delay before the next attempt or cycle in milliseconds (compact).
    pub delay_ms: Option<u32>,
    /// Timeout in milliseconds (compact).
    pub timeout_ms: Option<u32>,
    /// Radio handle generation.
    pub generation: Option<u64>,
    /// Human-readable reason (errors, overflow details, etc.).
    pub reason: Option<Arc<str>>,
}

impl Event {
    /// Creates a new event of the given kind with current timestamp and next sequence number.
    pub fn new(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            device: None,
            op: None,
            attempt: None,
            delay_ms: None,
            timeout_ms: None,
            generation: None,
            reason: None,
        }
    }

    /// Attaches a device name.
    #[inline]
    pub fn with_device(mut self, device: impl Into<Arc<str>>) -> Self {
        self.device = Some(device.into());
        self
    }

    /// Attaches the hardware operation.
    #[inline]
    pub fn with_op(mut self, op: Operation) -> Self {
        self.op = Some(op);
        self
    }

    /// Attaches an attempt count.
    #[inline]
    pub fn with_attempt(mut self, n: u32) -> Self {
        self.attempt = Some(n);
        self
    }

    /// Attaches a delay (stored as milliseconds).
    #[inline]
    pub fn with_delay(mut self, d: Duration) -> Self {
        self.delay_ms = Some(compact_ms(d));
        self
    }

    /// Attaches a timeout (stored as milliseconds).
    #[inline]
    pub fn with_timeout(mut self, d: Duration) -> Self {
        self.timeout_ms = Some(compact_ms(d));
        self
    }

    /// Attaches a radio handle generation.
    #[inline]
    pub fn with_generation(mut self, generation: u64) -> Self {
        self.generation = Some(generation);
        self
    }

    /// Attaches a human-readable reason.
    #[inline]
    pub fn with_reason(mut self, reason: impl Into<Arc<str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Creates a subscriber overflow event.
    #[inline]
    pub fn subscriber_overflow(subscriber: &'static str, reason: &'static str) -> Self {
        Event::new(EventKind::SubscriberOverflow)
            .with_reason(format!("subscriber={subscriber} reason={reason}"))
    }

    /// Creates a subscriber panic event.
    #[inline]
    pub fn subscriber_panicked(subscriber: &'static str, info: String) -> Self {
        Event::new(EventKind::SubscriberPanicked)
            .with_reason(format!("subscriber={subscriber} panic={info}"))
    }

    /// True for events emitted by the subscriber workers themselves.
    #[inline]
    pub fn is_subscriber_report(&self) -> bool {
        matches!(
            self.kind,
            EventKind::SubscriberOverflow | EventKind::SubscriberPanicked
        )
    }
}

fn compact_ms(d: Duration) -> u32 {
    u32::try_from(d.as_millis()).unwrap_or(u32::MAX)
}
