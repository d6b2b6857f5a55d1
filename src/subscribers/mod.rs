//! # Event subscribers.
//!
//! ```text
//!   Poller / Coordinator ── publish(Event) ──► Bus ──► subscriber_listener
//!                                                          │
//!                                                    SubscriberSet::emit
//!                                                  ┌───────┴────────┐
//!                                                  ▼                ▼
//!                                              LogWriter      MetricsWriter
//!                                            (tracing)      (error counter)
//! ```
//!
//! Custom subscribers implement [`Subscribe`] and are passed to
//! [`Supervisor::new`](crate::Supervisor::new) alongside the built-in ones.

mod log;
mod metrics;
mod set;
mod subscribe;

pub use log::LogWriter;
pub use metrics::MetricsWriter;
pub use set::SubscriberSet;
pub use subscribe::Subscribe;
