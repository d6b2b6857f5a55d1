//! # Demo: flaky_radio
//!
//! Runs three pollers against a scripted radio that fails a third of all
//! operations, with every interval shrunk to milliseconds. Watch the failure
//! tallies climb until a poller requests a reset and the coordinator rebuilds
//! the radio handle.
//!
//! ## Flow
//! ```text
//! Poller (kitchen) ── connect ✗ ── connect ✗ ── connect ✗ ──► tally = 3
//!                                                               │
//!                                           DeviceUnhealthy ◄───┤
//!                                           ResetRequested  ◄───┘
//! Coordinator ── flag set ── acquire_timeout ── rebuild ──► RebuildCompleted
//! ```
//!
//! ## Run
//! ```bash
//! RUST_LOG=info cargo run --example flaky_radio
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use radiovisor::devices::Device;
use radiovisor::events::{Event, EventKind};
use radiovisor::metrics::MemorySink;
use radiovisor::radio::{RadioManager, mock::MockFactory};
use radiovisor::subscribers::{LogWriter, MetricsWriter, Subscribe};
use radiovisor::{BackoffPolicy, Config, Context, Supervisor, init_logging};
use tokio_util::sync::CancellationToken;

/// Counts rebuilds and prints each one.
#[derive(Default)]
struct RebuildCounter {
    rebuilds: AtomicU64,
}

#[async_trait]
impl Subscribe for RebuildCounter {
    async fn on_event(&self, ev: &Event) {
        match ev.kind {
            EventKind::RebuildCompleted => {
                let n = self.rebuilds.fetch_add(1, Ordering::Relaxed) + 1;
                println!("rebuild #{n} -> generation {:?}", ev.generation);
            }
            EventKind::ForcedReclaim => println!("radio reclaimed from a stuck poller"),
            _ => {}
        }
    }

    fn name(&self) -> &'static str {
        "rebuild-counter"
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging()?;

    // 1. Shrink every interval so a few seconds cover many cycles.
    let mut cfg = Config::default();
    cfg.measurement_interval = Duration::from_millis(400);
    cfg.min_retry_interval = Duration::from_millis(100);
    cfg.retry_backoff = BackoffPolicy::new(Duration::from_millis(20), 2.0);
    cfg.connect_timeout = Duration::from_millis(200);
    cfg.notification_window = Duration::from_millis(50);
    cfg.reset_grace = Duration::from_millis(200);
    cfg.reset_poll_interval = Duration::from_millis(100);
    cfg.reset_lock_timeout = Duration::from_millis(300);
    cfg.rebuild_backoff = Duration::from_millis(200);
    cfg.stagger = Duration::from_millis(50);

    // 2. A radio that fails a third of the time.
    let factory = MockFactory::new().with_failure_rate(0.33);
    factory.set_payloads(vec![vec![0x2E, 0x09, 0x2D, 0x2C, 0x0B]]);
    let radio = RadioManager::new(Arc::new(factory.clone())).await?;

    // 3. Keep readings in memory instead of Prometheus.
    let sink = Arc::new(MemorySink::new());
    let ctx = Context::new(cfg, radio, sink.clone());

    let counter = Arc::new(RebuildCounter::default());
    let subs: Vec<Arc<dyn Subscribe>> = vec![
        Arc::new(LogWriter::new()),
        Arc::new(MetricsWriter::new(sink.clone())),
        counter.clone(),
    ];
    let sup = Supervisor::new(ctx, subs);

    let devices = vec![
        Device::new("kitchen", "A4:C1:38:00:00:01"),
        Device::new("bedroom", "A4:C1:38:00:00:02"),
        Device::new("attic", "A4:C1:38:00:00:03"),
    ];

    // 4. Run for five seconds.
    let token = CancellationToken::new();
    let stop = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(5)).await;
        stop.cancel();
    });
    sup.run(devices, token).await;

    for name in ["kitchen", "bedroom", "attic"] {
        if let Some(s) = sink.snapshot(name) {
            println!(
                "{name:8} readings={:3} errors={:3} last={:?}",
                s.readings, s.errors, s.reading
            );
        }
    }
    println!(
        "handles built={} stopped={} peak concurrent links={}",
        factory.created(),
        factory.stopped(),
        factory.peak_links()
    );
    Ok(())
}
