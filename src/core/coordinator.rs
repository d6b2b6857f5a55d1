//! # Reset coordinator: rebuilds the shared radio when asked to.
//!
//! ```text
//! loop {
//!   sleep(reset_poll_interval)
//!   if !flag { continue }
//!   acquire_timeout(reset_lock_timeout)
//!     ├─ Ok(lease)     → reset_all() → rebuild(&mut lease) → release → clear flag
//!     └─ Contention    → ForcedReclaim → force_rebuild()   → clear flag → reset_all()
//!   on construction failure: RebuildFailed, flag stays set, sleep(rebuild_backoff)
//! }
//! ```
//!
//! The contention branch stops the handle while a poller may still be using it.
//! That poller's remaining calls fail with `Stopped`; it then disconnects and
//! releases as usual. See [`RadioManager::force_rebuild`](crate::radio::RadioManager::force_rebuild).

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::core::context::Context;
use crate::core::poller::pause;
use crate::error::ResourceError;
use crate::events::{Event, EventKind};

/// Background task owning the rebuild sequence.
pub struct Coordinator {
    ctx: Arc<Context>,
}

impl Coordinator {
    pub fn new(ctx: Arc<Context>) -> Self {
        Self { ctx }
    }

    /// Watches the reset flag until `token` is cancelled.
    pub async fn run(self, token: CancellationToken) {
        let cfg = self.ctx.config();

        while pause(cfg.reset_poll_interval, &token).await {
            if !self.ctx.reset_flag().is_requested() {
                continue;
            }
            if let Err(e) = self.rebuild().await {
                self.ctx.bus().publish(
                    Event::new(EventKind::RebuildFailed)
                        .with_reason(e.to_string())
                        .with_delay(cfg.rebuild_backoff),
                );
                if !pause(cfg.rebuild_backoff, &token).await {
                    break;
                }
            }
        }
        tracing::debug!("reset coordinator stopped");
    }

    /// Runs one rebuild attempt and returns the new handle generation.
    ///
    /// On error the reset flag is left set so the next iteration retries.
    pub async fn rebuild(&self) -> Result<u64, ResourceError> {
        let radio = self.ctx.radio();
        let timeout = self.ctx.config().reset_lock_timeout;

        match radio.acquire_timeout(timeout).await {
            Ok(mut lease) => {
                self.ctx.tracker().reset_all();
                radio.rebuild(&mut lease).await?;
                let generation = lease.generation();
                radio.release(lease);
                Ok(self.complete(generation))
            }
            Err(ResourceError::Contention { timeout }) => {
                self.ctx.bus().publish(
                    Event::new(EventKind::ForcedReclaim)
                        .with_timeout(timeout)
                        .with_generation(radio.generation()),
                );
                radio.force_rebuild().await?;
                let generation = self.complete(radio.generation());
                self.ctx.tracker().reset_all();
                Ok(generation)
            }
            Err(e) => Err(e),
        }
    }

    fn complete(&self, generation: u64) -> u64 {
        self.ctx.reset_flag().clear();
        self.ctx
            .bus()
            .publish(Event::new(EventKind::RebuildCompleted).with_generation(generation));
        generation
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::config::Config;
    use crate::error::TransportError;
    use crate::metrics::MemorySink;
    use crate::radio::RadioManager;
    use crate::radio::mock::MockFactory;

    async fn context(factory: &MockFactory) -> Arc<Context> {
        let radio = RadioManager::new(Arc::new(factory.clone())).await.unwrap();
        Arc::new(Context::new(
            Config::default(),
            radio,
            Arc::new(MemorySink::new()),
        ))
    }

    #[tokio::test(start_paused = true)]
    async fn orderly_rebuild_clears_flag_and_tallies() {
        let factory = MockFactory::new();
        let ctx = context(&factory).await;
        let device: Arc<str> = Arc::from("kitchen");
        for _ in 0..3 {
            ctx.tracker().increment(&device);
        }
        assert!(ctx.reset_flag().is_requested());

        let generation = Coordinator::new(Arc::clone(&ctx)).rebuild().await.unwrap();

        assert_eq!(generation, 2);
        assert!(!ctx.reset_flag().is_requested());
        assert_eq!(ctx.tracker().get("kitchen"), 0);
        assert_eq!(factory.stopped(), 1);
        assert_eq!(factory.created(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn contention_forces_reclaim_under_the_holder() {
        let factory = MockFactory::new();
        let ctx = context(&factory).await;
        ctx.reset_flag().request();

        let held = ctx.radio().acquire().await;
        let stale = Arc::clone(held.radio().unwrap());
        let mut rx = ctx.bus().subscribe();

        let generation = Coordinator::new(Arc::clone(&ctx)).rebuild().await.unwrap();

        assert_eq!(generation, 2);
        assert!(!ctx.reset_flag().is_requested());
        assert!(matches!(
            stale.connect("A4:C1:38:00:00:01").await,
            Err(TransportError::Stopped)
        ));
        assert!(ctx.radio().current().unwrap().connect("A4:C1:38:00:00:01").await.is_ok());
        assert_eq!(rx.recv().await.unwrap().kind, EventKind::ForcedReclaim);
        assert_eq!(rx.recv().await.unwrap().kind, EventKind::RebuildCompleted);
        drop(held);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_construction_after_forced_reclaim_keeps_flag() {
        let factory = MockFactory::new();
        let ctx = context(&factory).await;
        ctx.reset_flag().request();
        let held = ctx.radio().acquire().await;
        factory.fail_creations(1);

        let err = Coordinator::new(Arc::clone(&ctx)).rebuild().await.unwrap_err();

        assert!(matches!(err, ResourceError::Creation { .. }));
        assert!(ctx.reset_flag().is_requested());
        assert!(ctx.radio().current().is_none());
        assert_eq!(factory.stopped(), 1);
        drop(held);

        Coordinator::new(Arc::clone(&ctx)).rebuild().await.unwrap();
        assert!(!ctx.reset_flag().is_requested());
    }

    #[tokio::test(start_paused = true)]
    async fn failed_construction_keeps_flag_and_retries() {
        let factory = MockFactory::new();
        let ctx = context(&factory).await;
        factory.fail_creations(1);
        ctx.reset_flag().request();

        let token = CancellationToken::new();
        let task = tokio::spawn(Coordinator::new(Arc::clone(&ctx)).run(token.clone()));

        // first check at 5s fails
        tokio::time::sleep(Duration::from_secs(6)).await;
        assert!(ctx.reset_flag().is_requested());
        assert!(ctx.radio().current().is_none());

        // backoff 10s, poll 5s, rebuild succeeds
        tokio::time::sleep(Duration::from_secs(15)).await;
        assert!(!ctx.reset_flag().is_requested());
        assert!(ctx.radio().current().is_some());

        token.cancel();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn idle_flag_means_no_rebuild() {
        let factory = MockFactory::new();
        let ctx = context(&factory).await;
        let token = CancellationToken::new();
        let task = tokio::spawn(Coordinator::new(Arc::clone(&ctx)).run(token.clone()));

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(factory.created(), 1);

        token.cancel();
        task.await.unwrap();
    }
}
