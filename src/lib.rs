//! # radiovisor
//!
//! **Radiovisor** polls battery-powered BLE thermometers that all share one
//! flaky radio adapter, and exports their readings as Prometheus metrics.
//!
//! Every device gets its own poller task. The pollers take turns on the
//! adapter, count their failures, and ask for a global adapter reset when a
//! device keeps failing. A single coordinator task performs that reset, taking
//! the adapter away from a stuck poller if it has to.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!     ┌──────────────┐   ┌──────────────┐   ┌──────────────┐
//!     │    Device    │   │    Device    │   │    Device    │
//!     │  (kitchen)   │   │  (bedroom)   │   │   (attic)    │
//!     └──────┬───────┘   └──────┬───────┘   └──────┬───────┘
//!            ▼                  ▼                  ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │  Supervisor                                                       │
//! │  - Context: RadioManager, FailureTracker, ResetFlag, sink, Bus    │
//! │  - SubscriberSet (fans events out to LogWriter / MetricsWriter)   │
//! └──────┬──────────────────┬──────────────────┬───────────────┬──────┘
//!        ▼                  ▼                  ▼               ▼
//!     ┌──────────────┐   ┌──────────────┐   ┌──────────────┐ ┌─────────────┐
//!     │    Poller    │   │    Poller    │   │    Poller    │ │ Coordinator │
//!     │ (cycle loop) │   │ (cycle loop) │   │ (cycle loop) │ │ (rebuilds)  │
//!     └┬─────────────┘   └┬─────────────┘   └┬─────────────┘ └┬────────────┘
//!      │  acquire / release (one holder at a time)            │ acquire_timeout
//!      ▼                  ▼                  ▼                ▼ or force_rebuild
//! ┌───────────────────────────────────────────────────────────────────┐
//! │        RadioManager (Mutex<Option<Arc<dyn Radio>>> + generation)  │
//! └───────────────────────────────────────────────────────────────────┘
//!
//!   Poller / FailureTracker / Coordinator ── publish ──► Bus ──► SubscriberSet
//!                                                          ┌────────┴────────┐
//!                                                          ▼                 ▼
//!                                                      LogWriter       MetricsWriter
//!                                                     (tracing)       (error counter)
//! ```
//!
//! ### One poll cycle
//! ```text
//! acquire radio
//!   ├─► connect(address)          retried, per-attempt deadline
//!   ├─► write notify trigger      best effort
//!   ├─► discover_profile()        retried
//!   ├─► subscribe(reading, cb)    retried; cb decodes and records readings
//!   ├─► hold notification window
//!   ├─► unsubscribe()             retried, best effort
//!   └─► disconnect()              always, once connected
//! release radio
//!   ├─ success ─► sleep(measurement_interval)
//!   └─ failure ─► consecutive += 1
//!                 ├─ consecutive ≥ threshold ─► request reset, sleep(reset_grace)
//!                 └─ sleep(failure_interval)
//! ```
//!
//! ## Modules
//! | Area              | Description                                               | Key types                                 |
//! |-------------------|-----------------------------------------------------------|-------------------------------------------|
//! | **Supervision**   | Pollers, reset coordinator and their shared state.        | [`Supervisor`], [`Context`], [`Poller`]   |
//! | **Radio**         | Hardware seam, shared handle, mock and BLE backends.      | [`radio::RadioManager`], [`radio::Radio`] |
//! | **Policies**      | Attempt counts, backoff and deadlines for hardware calls. | [`RetryPolicy`], [`BackoffPolicy`]        |
//! | **Events**        | Lifecycle events and their subscribers.                   | [`events::Event`], [`subscribers::Subscribe`] |
//! | **Metrics**       | Prometheus gauges and the `/metrics` endpoint.            | [`metrics::PrometheusSink`]               |
//! | **Errors**        | Typed errors for transport, payloads, the radio and startup. | [`TransportError`], [`StartupError`]   |
//! | **Configuration** | Device table and runtime tuning.                          | [`Config`], [`devices::Device`]           |
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use radiovisor::devices::Device;
//! use radiovisor::metrics::MemorySink;
//! use radiovisor::radio::{RadioManager, mock::MockFactory};
//! use radiovisor::subscribers::{LogWriter, Subscribe};
//! use radiovisor::{Config, Context, Supervisor};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut cfg = Config::default();
//!     cfg.notification_window = Duration::from_millis(50);
//!
//!     let radio = RadioManager::new(Arc::new(MockFactory::new())).await?;
//!     let sink = Arc::new(MemorySink::new());
//!     let ctx = Context::new(cfg, radio, sink.clone());
//!
//!     let subs: Vec<Arc<dyn Subscribe>> = vec![Arc::new(LogWriter)];
//!     let sup = Supervisor::new(ctx, subs);
//!
//!     let token = CancellationToken::new();
//!     let stop = token.clone();
//!     tokio::spawn(async move {
//!         tokio::time::sleep(Duration::from_millis(200)).await;
//!         stop.cancel();
//!     });
//!
//!     sup.run(vec![Device::new("kitchen", "A4:C1:38:00:00:01")], token).await;
//!     Ok(())
//! }
//! ```

mod config;
mod core;
mod error;
mod logging;
mod policies;

pub mod devices;
pub mod events;
pub mod metrics;
pub mod radio;
pub mod reading;
pub mod subscribers;

// ---- Public re-exports ----

pub use config::Config;
pub use core::{
    Context, Coordinator, CycleOutcome, FailureTracker, PollState, Poller, Progress, ResetFlag,
    Supervisor, attempt,
};
pub use error::{ConfigError, ProtocolError, ResourceError, StartupError, TransportError};
pub use logging::init_logging;
pub use policies::{BackoffPolicy, RetryPolicy};
