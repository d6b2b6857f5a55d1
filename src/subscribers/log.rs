//! # Logging subscriber.
//!
//! [`LogWriter`] renders lifecycle events through `tracing`, so they follow the
//! process-wide filter (`RUST_LOG`).
//!
//! ## Output (fmt layer)
//! ```text
//! INFO  cycle starting device=kitchen generation=1
//! WARN  operation failed device=kitchen op=subscribe attempt=2 reason="subscribe failed: gatt busy"
//! WARN  reset requested device=kitchen reason="3 consecutive errors"
//! WARN  forced radio reclaim timeout_ms=10000 generation=1
//! INFO  radio rebuilt generation=2
//! ```

use async_trait::async_trait;

use crate::events::{Event, EventKind};
use crate::subscribers::Subscribe;

/// Writes every event to `tracing` at a level matching its severity.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogWriter;

impl LogWriter {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Subscribe for LogWriter {
    async fn on_event(&self, e: &Event) {
        let device = e.device.as_deref().unwrap_or("-");
        let op = e.op.map(|op| op.as_str()).unwrap_or("-");
        let reason = e.reason.as_deref().unwrap_or("");

        match e.kind {
            EventKind::CycleStarting => {
                tracing::debug!(device, generation = e.generation, "cycle starting");
            }
            EventKind::CycleSucceeded => {
                tracing::info!(device, next_ms = e.delay_ms, "cycle succeeded");
            }
            EventKind::CycleFailed => {
                tracing::warn!(
                    device,
                    op,
                    failures = e.attempt,
                    next_ms = e.delay_ms,
                    "cycle failed"
                );
            }
            EventKind::OperationFailed => {
                tracing::warn!(device, op, attempt = e.attempt, reason, "operation failed");
            }
            EventKind::RetryScheduled => {
                tracing::debug!(
                    device,
                    op,
                    attempt = e.attempt,
                    delay_ms = e.delay_ms,
                    "retry scheduled"
                );
            }
            EventKind::ReadingDropped => {
                tracing::warn!(device, reason, "reading dropped");
            }
            EventKind::DeviceUnhealthy => {
                tracing::warn!(device, failures = e.attempt, "device unhealthy");
            }
            EventKind::ResetRequested => {
                tracing::warn!(device, reason, "reset requested");
            }
            EventKind::RebuildCompleted => {
                tracing::info!(generation = e.generation, "radio rebuilt");
            }
            EventKind::RebuildFailed => {
                tracing::error!(reason, retry_in_ms = e.delay_ms, "radio rebuild failed");
            }
            EventKind::ForcedReclaim => {
                tracing::warn!(
                    timeout_ms = e.timeout_ms,
                    generation = e.generation,
                    "forced radio reclaim"
                );
            }
            EventKind::SubscriberOverflow => {
                tracing::warn!(reason, "subscriber dropped event");
            }
            EventKind::SubscriberPanicked => {
                tracing::error!(reason, "subscriber panicked");
            }
        }
    }

    fn name(&self) -> &'static str {
        "log"
    }
}
