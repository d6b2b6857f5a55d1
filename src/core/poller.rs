//! # Device poller: one long-running task per sensor.
//!
//! ## State machine
//! ```text
//!        ┌──────────────────────────────────────────────────────────────────┐
//!        ▼                                                                  │
//!      Idle ─► Acquiring ─► Connecting ─► Publishing ─► Subscribing ─► Waiting
//!                              │                           │  (discover     │
//!                              │ retries exhausted         │   + subscribe) ▼
//!                              │                           └──────────► Unsubscribing
//!                              │                              failure       │
//!                              ▼                                            ▼
//!                            (release) ◄──────────────────────────── Disconnecting
//! ```
//!
//! ## One cycle
//! 1. Wait for the radio lease (no timeout; normal contention).
//! 2. Connect (retried, per-attempt deadline). Exhaustion marks the device's
//!    connection gauge and ends the cycle.
//! 3. Write the notify trigger; failures are logged only, a missing target is skipped.
//! 4. Discover the profile, then subscribe to the reading characteristic (both
//!    retried). A missing or non-notifying characteristic fails the cycle.
//! 5. Hold the subscription for the notification window, then unsubscribe
//!    (retried, best effort).
//! 6. Disconnect whenever connect succeeded, then release the lease.
//! 7. Update the consecutive-failure counter, escalate to a global reset when it
//!    reaches the threshold or disconnect failed, halve it at the cap.
//! 8. Sleep the measurement interval (or the shorter failure interval) and repeat.
//!
//! Every failed connect/discover/subscribe/unsubscribe attempt is also counted
//! by the shared [`FailureTracker`](crate::core::FailureTracker); every
//! successful one zeroes that device's tally.

use std::sync::Arc;
use std::time::Duration;

use tokio::{select, time};
use tokio_util::sync::CancellationToken;

use crate::core::context::Context;
use crate::core::retry::{self, Progress};
use crate::core::tracker::request_reset;
use crate::devices::Device;
use crate::error::TransportError;
use crate::events::{Event, EventKind};
use crate::radio::{
    CLIENT_CONFIG_UUID, Link, NOTIFY_TRIGGER, NotificationHandler, Operation, READING_UUID,
    RadioLease,
};
use crate::reading::decode;

/// Where a poller currently is within its cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollState {
    Idle,
    Acquiring,
    Connecting,
    Publishing,
    /// Profile discovery and subscription.
    Subscribing,
    Waiting,
    Unsubscribing,
    Disconnecting,
}

/// Result of one cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleOutcome {
    /// Step that failed, if any.
    pub failed_at: Option<Operation>,
    /// Disconnect returned an error.
    pub disconnect_failed: bool,
}

impl CycleOutcome {
    pub fn is_success(&self) -> bool {
        self.failed_at.is_none()
    }
}

/// Polls one device forever (or until cancelled).
pub struct Poller {
    device: Device,
    name: Arc<str>,
    ctx: Arc<Context>,
    state: PollState,
    consecutive: u32,
}

impl Poller {
    pub fn new(device: Device, ctx: Arc<Context>) -> Self {
        Self {
            name: device.name_arc(),
            device,
            ctx,
            state: PollState::Idle,
            consecutive: 0,
        }
    }

    /// Current state.
    pub fn state(&self) -> PollState {
        self.state
    }

    /// Consecutive failed cycles (after halving).
    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive
    }

    /// Runs cycles until `token` is cancelled, starting after the stagger for `index`.
    pub async fn run(mut self, index: usize, token: CancellationToken) {
        let stagger = self.ctx.config().stagger_for(index);
        if !pause(stagger, &token).await {
            return;
        }

        while !token.is_cancelled() {
            let Some(outcome) = self.run_cycle(&token).await else {
                break;
            };
            let next = self.settle(outcome, &token).await;
            if !pause(next, &token).await {
                break;
            }
        }
        tracing::debug!(device = %self.name, "poller stopped");
    }

    /// Runs steps 1 to 6 of one cycle. Returns `None` if cancelled while waiting for the lease.
    pub async fn run_cycle(&mut self, token: &CancellationToken) -> Option<CycleOutcome> {
        self.enter(PollState::Acquiring);
        let lease = select! {
            lease = self.ctx.radio().acquire() => Some(lease),
            _ = token.cancelled() => None,
        };
        let Some(lease) = lease else {
            self.enter(PollState::Idle);
            return None;
        };
        self.ctx.bus().publish(
            Event::new(EventKind::CycleStarting)
                .with_device(Arc::clone(&self.name))
                .with_generation(lease.generation()),
        );

        let mut outcome = CycleOutcome::default();
        self.enter(PollState::Connecting);
        match self.connect(&lease, token).await {
            Some(link) => {
                outcome.failed_at = self.session(link.as_ref(), token).await.err();

                self.enter(PollState::Disconnecting);
                if let Err(e) = link.disconnect().await {
                    self.note_failure(Operation::Disconnect, 1, &e);
                    outcome.disconnect_failed = true;
                }
            }
            None => outcome.failed_at = Some(Operation::Connect),
        }

        self.ctx.radio().release(lease);
        self.enter(PollState::Idle);
        Some(outcome)
    }

    async fn connect(
        &self,
        lease: &RadioLease,
        token: &CancellationToken,
    ) -> Option<Box<dyn Link>> {
        let address = self.device.address();
        let link = retry::attempt(
            Operation::Connect,
            &self.ctx.config().connect_policy(),
            token,
            move || async move { lease.radio()?.connect(address).await },
            |p| self.report(Operation::Connect, p),
        )
        .await;

        self.ctx
            .sink()
            .set_connection_failed(&self.name, link.is_none());
        if link.is_some() {
            self.ctx.tracker().reset(&self.name);
        }
        link
    }

    /// Publish, discover, subscribe, wait, unsubscribe. Errors name the failed step.
    async fn session(
        &mut self,
        link: &dyn Link,
        token: &CancellationToken,
    ) -> Result<(), Operation> {
        self.enter(PollState::Publishing);
        match link.write(CLIENT_CONFIG_UUID, &NOTIFY_TRIGGER).await {
            Ok(()) => {}
            Err(TransportError::NotFound { uuid }) => {
                tracing::debug!(
                    device = %self.name,
                    %uuid,
                    "no notify trigger target, skipping publish"
                );
            }
            Err(e) => self.note_failure(Operation::Publish, 1, &e),
        }

        self.enter(PollState::Subscribing);
        let policy = self.ctx.config().retry_policy();
        let profile = retry::attempt(
            Operation::Discover,
            &policy,
            token,
            move || link.discover_profile(),
            |p| self.report(Operation::Discover, p),
        )
        .await
        .ok_or(Operation::Discover)?;
        self.ctx.tracker().reset(&self.name);

        let characteristic = match profile.find(READING_UUID) {
            Some(c) if c.can_subscribe() => *c,
            Some(_) => {
                self.unusable(TransportError::NotSubscribable { uuid: READING_UUID });
                return Err(Operation::Subscribe);
            }
            None => {
                self.unusable(TransportError::NotFound { uuid: READING_UUID });
                return Err(Operation::Subscribe);
            }
        };
        let characteristic = &characteristic;

        let handler = self.handler();
        retry::attempt(
            Operation::Subscribe,
            &policy,
            token,
            move || link.subscribe(characteristic, Arc::clone(&handler)),
            |p| self.report(Operation::Subscribe, p),
        )
        .await
        .ok_or(Operation::Subscribe)?;
        self.ctx.tracker().reset(&self.name);

        self.enter(PollState::Waiting);
        pause(self.ctx.config().notification_window, token).await;

        self.enter(PollState::Unsubscribing);
        let unsubscribed = retry::attempt(
            Operation::Unsubscribe,
            &policy,
            token,
            move || link.unsubscribe(characteristic),
            |p| self.report(Operation::Unsubscribe, p),
        )
        .await;
        if unsubscribed.is_some() {
            self.ctx.tracker().reset(&self.name);
        }
        Ok(())
    }

    /// Callback that decodes each notification and pushes it to the metrics sink.
    fn handler(&self) -> NotificationHandler {
        let device = Arc::clone(&self.name);
        let sink = Arc::clone(self.ctx.sink());
        let bus = self.ctx.bus().clone();

        Arc::new(move |payload: &[u8]| match decode(payload) {
            Ok(reading) => {
                tracing::info!(device = %device, %reading, battery = reading.battery_percent(), "reading");
                sink.record_reading(&device, &reading);
            }
            Err(e) => bus.publish(
                Event::new(EventKind::ReadingDropped)
                    .with_device(Arc::clone(&device))
                    .with_reason(format!("{e} ({payload:02x?})")),
            ),
        })
    }

    /// Step 7: consecutive-failure bookkeeping. Returns the pause before the next cycle.
    async fn settle(&mut self, outcome: CycleOutcome, token: &CancellationToken) -> Duration {
        let cfg = self.ctx.config();

        let next = match outcome.failed_at {
            None => {
                self.consecutive = 0;
                self.ctx.bus().publish(
                    Event::new(EventKind::CycleSucceeded)
                        .with_device(Arc::clone(&self.name))
                        .with_delay(cfg.measurement_interval),
                );
                cfg.measurement_interval
            }
            Some(op) => {
                self.consecutive = self.consecutive.saturating_add(1);
                self.ctx.bus().publish(
                    Event::new(EventKind::CycleFailed)
                        .with_device(Arc::clone(&self.name))
                        .with_op(op)
                        .with_attempt(self.consecutive)
                        .with_delay(cfg.failure_interval()),
                );
                cfg.failure_interval()
            }
        };

        if self.consecutive >= cfg.failure_threshold || outcome.disconnect_failed {
            let reason = if outcome.disconnect_failed {
                "disconnect failed".to_string()
            } else {
                format!("{} consecutive failed cycles", self.consecutive)
            };
            request_reset(self.ctx.reset_flag(), self.ctx.bus(), &self.name, reason);
            pause(cfg.reset_grace, token).await;
        }
        if self.consecutive >= cfg.failure_cap {
            self.consecutive /= 2;
        }
        next
    }

    fn report(&self, op: Operation, progress: Progress<'_>) {
        match progress {
            Progress::Failed { attempt, error } => self.note_failure(op, attempt, error),
            Progress::Retrying { attempt, delay } => self.ctx.bus().publish(
                Event::new(EventKind::RetryScheduled)
                    .with_device(Arc::clone(&self.name))
                    .with_op(op)
                    .with_attempt(attempt)
                    .with_delay(delay),
            ),
        }
    }

    fn note_failure(&self, op: Operation, attempt: u32, error: &TransportError) {
        self.ctx.bus().publish(
            Event::new(EventKind::OperationFailed)
                .with_device(Arc::clone(&self.name))
                .with_op(op)
                .with_attempt(attempt)
                .with_reason(error.to_string()),
        );
        if counts_toward_tally(op) {
            self.ctx.tracker().increment(&self.name);
        }
    }

    fn unusable(&self, error: TransportError) {
        tracing::warn!(device = %self.name, error = %error, "reading characteristic unusable");
    }

    fn enter(&mut self, state: PollState) {
        tracing::trace!(device = %self.name, from = ?self.state, to = ?state, "poll state");
        self.state = state;
    }
}

fn counts_toward_tally(op: Operation) -> bool {
    matches!(
        op,
        Operation::Connect | Operation::Discover | Operation::Subscribe | Operation::Unsubscribe
    )
}

/// Sleeps for `d`; returns `false` if `token` was cancelled first.
pub(crate) async fn pause(d: Duration, token: &CancellationToken) -> bool {
    select! {
        _ = time::sleep(d) => true,
        _ = token.cancelled() => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::metrics::MemorySink;
    use crate::radio::mock::MockFactory;
    use crate::radio::{Characteristic, Profile, RadioManager};

    const REFERENCE: [u8; 5] = [0xE8, 0x03, 0x32, 0x88, 0x13];

    async fn setup(factory: &MockFactory) -> (Poller, Arc<Context>, Arc<MemorySink>) {
        let sink = Arc::new(MemorySink::new());
        let radio = RadioManager::new(Arc::new(factory.clone())).await.unwrap();
        let ctx = Arc::new(Context::new(Config::default(), radio, sink.clone()));
        let poller = Poller::new(Device::new("kitchen", "A4:C1:38:00:00:01"), Arc::clone(&ctx));
        (poller, ctx, sink)
    }

    #[tokio::test(start_paused = true)]
    async fn successful_cycle_records_reading_and_cleans_up() {
        let factory = MockFactory::new();
        factory.set_payloads(vec![REFERENCE.to_vec()]);
        let (mut poller, ctx, sink) = setup(&factory).await;

        let outcome = poller.run_cycle(&CancellationToken::new()).await.unwrap();

        assert!(outcome.is_success());
        assert_eq!(poller.state(), PollState::Idle);
        let snap = sink.snapshot("kitchen").unwrap();
        assert_eq!(snap.reading.map(|r| r.humidity), Some(50.0));
        assert!(!snap.connection_failed);
        assert_eq!(factory.calls(Operation::Publish), 1);
        assert_eq!(factory.calls(Operation::Unsubscribe), 1);
        assert_eq!(factory.open_links(), 0);
        assert!(ctx.radio().acquire_timeout(Duration::from_millis(1)).await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn three_subscribe_failures_raise_flag_once_and_still_disconnect() {
        let factory = MockFactory::new();
        factory.fail_next(Operation::Subscribe, 3);
        let (mut poller, ctx, _sink) = setup(&factory).await;

        let outcome = poller.run_cycle(&CancellationToken::new()).await.unwrap();

        assert_eq!(outcome.failed_at, Some(Operation::Subscribe));
        assert_eq!(ctx.tracker().get("kitchen"), 3);
        assert!(ctx.reset_flag().is_requested());
        assert_eq!(ctx.reset_flag().times_raised(), 1);
        assert_eq!(factory.calls(Operation::Disconnect), 1);
        assert_eq!(factory.open_links(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_connect_marks_gauge_and_skips_session() {
        let factory = MockFactory::new();
        factory.fail_next(Operation::Connect, 3);
        let (mut poller, _ctx, sink) = setup(&factory).await;

        let outcome = poller.run_cycle(&CancellationToken::new()).await.unwrap();

        assert_eq!(outcome.failed_at, Some(Operation::Connect));
        assert!(sink.snapshot("kitchen").unwrap().connection_failed);
        assert_eq!(factory.calls(Operation::Publish), 0);
        assert_eq!(factory.calls(Operation::Disconnect), 0);

        poller.run_cycle(&CancellationToken::new()).await.unwrap();
        assert!(!sink.snapshot("kitchen").unwrap().connection_failed);
    }

    #[tokio::test(start_paused = true)]
    async fn short_payload_is_dropped_without_failing_the_cycle() {
        let factory = MockFactory::new();
        factory.set_payloads(vec![vec![0xE8, 0x03, 0x32, 0x88]]);
        let (mut poller, ctx, sink) = setup(&factory).await;
        let mut rx = ctx.bus().subscribe();

        let outcome = poller.run_cycle(&CancellationToken::new()).await.unwrap();

        assert!(outcome.is_success());
        assert!(sink.snapshot("kitchen").and_then(|s| s.reading).is_none());
        assert_eq!(ctx.tracker().get("kitchen"), 0);

        let mut dropped = None;
        while let Ok(ev) = rx.try_recv() {
            if ev.kind == EventKind::ReadingDropped {
                dropped = ev.reason.clone();
            }
        }
        let reason = dropped.unwrap();
        assert!(reason.contains("[e8, 03, 32, 88]"), "{reason}");
    }

    #[tokio::test(start_paused = true)]
    async fn non_notifying_characteristic_fails_without_tally() {
        let factory = MockFactory::new();
        factory.set_profile(Profile {
            characteristics: vec![Characteristic {
                uuid: READING_UUID,
                notify: true,
                config_descriptor: false,
            }],
        });
        let (mut poller, ctx, _sink) = setup(&factory).await;

        let outcome = poller.run_cycle(&CancellationToken::new()).await.unwrap();

        assert_eq!(outcome.failed_at, Some(Operation::Subscribe));
        assert_eq!(factory.calls(Operation::Subscribe), 0);
        assert_eq!(ctx.tracker().get("kitchen"), 0);
        assert_eq!(factory.calls(Operation::Disconnect), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_cycles_escalate_and_counter_is_halved_at_cap() {
        let factory = MockFactory::new();
        let (mut poller, ctx, _sink) = setup(&factory).await;
        let token = CancellationToken::new();
        let failed = CycleOutcome {
            failed_at: Some(Operation::Discover),
            disconnect_failed: false,
        };

        assert_eq!(poller.settle(failed, &token).await, Duration::from_secs(30));
        poller.settle(failed, &token).await;
        assert!(!ctx.reset_flag().is_requested());

        poller.settle(failed, &token).await;
        assert!(ctx.reset_flag().is_requested());

        poller.settle(failed, &token).await;
        poller.settle(failed, &token).await;
        assert_eq!(poller.consecutive_failures(), 2);

        let ok = CycleOutcome::default();
        assert_eq!(poller.settle(ok, &token).await, Duration::from_secs(60));
        assert_eq!(poller.consecutive_failures(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn disconnect_error_requests_reset() {
        let factory = MockFactory::new();
        factory.fail_next(Operation::Disconnect, 1);
        let (mut poller, ctx, _sink) = setup(&factory).await;
        let token = CancellationToken::new();

        let outcome = poller.run_cycle(&token).await.unwrap();
        assert!(outcome.is_success());
        assert!(outcome.disconnect_failed);

        poller.settle(outcome, &token).await;
        assert!(ctx.reset_flag().is_requested());
        assert_eq!(poller.consecutive_failures(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_while_acquiring_returns_none() {
        let factory = MockFactory::new();
        let (mut poller, ctx, _sink) = setup(&factory).await;
        let held = ctx.radio().acquire().await;
        let token = CancellationToken::new();
        token.cancel();

        assert!(poller.run_cycle(&token).await.is_none());
        assert_eq!(poller.state(), PollState::Idle);
        drop(held);
    }

    fn failures_of(rx: &mut tokio::sync::broadcast::Receiver<Event>, op: Operation) -> usize {
        let mut n = 0;
        while let Ok(ev) = rx.try_recv() {
            if ev.kind == EventKind::OperationFailed && ev.op == Some(op) {
                n += 1;
            }
        }
        n
    }

    #[tokio::test(start_paused = true)]
    async fn healthy_cycle_reports_no_publish_failure() {
        let factory = MockFactory::new();
        factory.set_payloads(vec![REFERENCE.to_vec()]);
        let (mut poller, ctx, _sink) = setup(&factory).await;
        let mut rx = ctx.bus().subscribe();

        let outcome = poller.run_cycle(&CancellationToken::new()).await.unwrap();

        assert!(outcome.is_success());
        assert_eq!(factory.calls(Operation::Publish), 1);
        assert_eq!(failures_of(&mut rx, Operation::Publish), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn missing_trigger_target_is_skipped_silently() {
        let factory = MockFactory::new();
        factory.set_profile(Profile::default());
        let (mut poller, ctx, _sink) = setup(&factory).await;
        let mut rx = ctx.bus().subscribe();

        poller.run_cycle(&CancellationToken::new()).await.unwrap();

        assert_eq!(factory.calls(Operation::Publish), 1);
        assert_eq!(failures_of(&mut rx, Operation::Publish), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn publish_failure_is_reported_but_not_retried_or_tallied() {
        let factory = MockFactory::new();
        factory.set_payloads(vec![REFERENCE.to_vec()]);
        factory.fail_next(Operation::Publish, 1);
        let (mut poller, ctx, sink) = setup(&factory).await;
        let mut rx = ctx.bus().subscribe();

        let outcome = poller.run_cycle(&CancellationToken::new()).await.unwrap();

        assert!(outcome.is_success());
        assert_eq!(factory.calls(Operation::Publish), 1);
        assert_eq!(ctx.tracker().get("kitchen"), 0);
        assert!(sink.snapshot("kitchen").unwrap().reading.is_some());
        assert_eq!(failures_of(&mut rx, Operation::Publish), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_discover_fails_cycle_and_still_disconnects() {
        let factory = MockFactory::new();
        factory.fail_next(Operation::Discover, 3);
        let (mut poller, ctx, _sink) = setup(&factory).await;

        let outcome = poller.run_cycle(&CancellationToken::new()).await.unwrap();

        assert_eq!(outcome.failed_at, Some(Operation::Discover));
        assert_eq!(factory.calls(Operation::Discover), 3);
        assert_eq!(factory.calls(Operation::Subscribe), 0);
        assert_eq!(factory.calls(Operation::Disconnect), 1);
        assert_eq!(factory.open_links(), 0);
        assert_eq!(ctx.tracker().get("kitchen"), 3);
        assert!(ctx.reset_flag().is_requested());
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_unsubscribe_is_best_effort_but_tallied() {
        let factory = MockFactory::new();
        factory.set_payloads(vec![REFERENCE.to_vec()]);
        factory.fail_next(Operation::Unsubscribe, 3);
        let (mut poller, ctx, sink) = setup(&factory).await;

        let outcome = poller.run_cycle(&CancellationToken::new()).await.unwrap();

        assert!(outcome.is_success());
        assert!(sink.snapshot("kitchen").unwrap().reading.is_some());
        assert_eq!(factory.calls(Operation::Unsubscribe), 3);
        assert_eq!(factory.calls(Operation::Disconnect), 1);
        assert_eq!(ctx.tracker().get("kitchen"), 3);
        assert!(ctx.reset_flag().is_requested());
        assert_eq!(ctx.reset_flag().times_raised(), 1);
    }
}
