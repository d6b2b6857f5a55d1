//! # Supervisor: wires pollers, the reset coordinator and event delivery.
//!
//! ## High-level architecture
//! ```text
//! Inputs:
//!   Context (radio + tallies + reset flag + sink + bus) ──► Supervisor::new(ctx, subscribers)
//!   Vec<Device>                                         ──► Supervisor::run(devices, token)
//!
//! Preparation:
//!   subscriber_listener(): Bus.subscribe() ─► SubscriberSet::emit(&Event)   (fire-and-forget)
//!
//! Spawn (one JoinSet, one child token each):
//!   Coordinator::run(child)
//!   Poller[0].run(0, child)   Poller[1].run(1, child)  ...  Poller[N-1].run(N-1, child)
//!        │ (starts immediately)   │ (after 1 × stagger)          │ (after (N-1) × stagger)
//!
//! Event flow:
//!   Poller / Tracker / Coordinator ── publish ──► Bus ──► listener ──► SubscriberSet
//!                                                               ┌──────────┴──────────┐
//!                                                               ▼                     ▼
//!                                                           LogWriter           MetricsWriter
//! ```
//!
//! `run` returns only once every task has stopped, which happens only after
//! `token` is cancelled. The binary never cancels it.

use std::sync::Arc;

use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::core::context::Context;
use crate::core::coordinator::Coordinator;
use crate::core::poller::Poller;
use crate::devices::Device;
use crate::subscribers::{Subscribe, SubscriberSet};

/// Owns the shared context and the subscriber fan-out.
pub struct Supervisor {
    ctx: Arc<Context>,
    subs: Arc<SubscriberSet>,
}

impl Supervisor {
    /// Creates a supervisor; spawns one worker per subscriber, so call it inside a runtime.
    pub fn new(ctx: Context, subscribers: Vec<Arc<dyn Subscribe>>) -> Self {
        let subs = Arc::new(SubscriberSet::new(subscribers, ctx.bus().clone()));
        Self {
            ctx: Arc::new(ctx),
            subs,
        }
    }

    /// Shared context.
    pub fn context(&self) -> &Arc<Context> {
        &self.ctx
    }

    /// Polls `devices` until `token` is cancelled.
    pub async fn run(&self, devices: Vec<Device>, token: CancellationToken) {
        self.subscriber_listener(token.child_token());

        let mut set = JoinSet::new();
        set.spawn(Coordinator::new(Arc::clone(&self.ctx)).run(token.child_token()));
        for (index, device) in devices.into_iter().enumerate() {
            tracing::info!(device = %device, index, "starting poller");
            let poller = Poller::new(device, Arc::clone(&self.ctx));
            set.spawn(poller.run(index, token.child_token()));
        }

        while let Some(res) = set.join_next().await {
            if let Err(e) = res {
                tracing::error!(error = %e, "supervised task aborted");
            }
        }
    }

    /// Subscribes to the bus and forwards events to the subscriber set.
    fn subscriber_listener(&self, token: CancellationToken) {
        let mut rx = self.ctx.bus().subscribe();
        let set = Arc::clone(&self.subs);
        tokio::spawn(async move {
            loop {
                let ev = tokio::select! {
                    ev = rx.recv() => ev,
                    _ = token.cancelled() => break,
                };
                match ev {
                    Ok(ev) => set.emit(&ev),
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "event listener lagged");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;
    use crate::config::Config;
    use crate::events::{Event, EventKind};
    use crate::metrics::MemorySink;
    use crate::radio::RadioManager;
    use crate::radio::mock::MockFactory;

    #[derive(Default)]
    struct Kinds(Mutex<Vec<EventKind>>);

    #[async_trait]
    impl Subscribe for Kinds {
        async fn on_event(&self, ev: &Event) {
            self.0.lock().unwrap().push(ev.kind);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn pollers_report_through_subscribers() {
        let factory = MockFactory::new();
        factory.set_payloads(vec![vec![0xE8, 0x03, 0x32, 0x88, 0x13]]);
        let sink = Arc::new(MemorySink::new());
        let radio = RadioManager::new(Arc::new(factory.clone())).await.unwrap();
        let ctx = Context::new(Config::default(), radio, sink.clone());

        let kinds = Arc::new(Kinds::default());
        let sup = Supervisor::new(ctx, vec![kinds.clone() as Arc<dyn Subscribe>]);
        let devices = vec![
            Device::new("kitchen", "A4:C1:38:00:00:01"),
            Device::new("bedroom", "A4:C1:38:00:00:02"),
        ];

        let token = CancellationToken::new();
        let stopper = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(30)).await;
            stopper.cancel();
        });
        sup.run(devices, token).await;

        assert!(sink.snapshot("kitchen").unwrap().reading.is_some());
        assert!(sink.snapshot("bedroom").unwrap().reading.is_some());
        assert_eq!(factory.peak_links(), 1);

        let kinds = kinds.0.lock().unwrap();
        assert!(kinds.contains(&EventKind::CycleStarting));
        assert!(kinds.contains(&EventKind::CycleSucceeded));
    }
}
