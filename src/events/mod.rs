//! Lifecycle events: types and broadcast bus.
//!
//! ## Contents
//! - [`EventKind`], [`Event`] event classification and payload metadata
//! - [`Bus`] thin wrapper over `tokio::sync::broadcast`
//!
//! ## Quick reference
//! - **Publishers**: device pollers, the retry executor, the failure tracker,
//!   the reset coordinator, `SubscriberSet` workers (overflow/panic).
//! - **Consumer**: `Supervisor::subscriber_listener()`, which fans out to the
//!   `SubscriberSet`.

mod bus;
mod event;

pub use bus::Bus;
pub use event::{Event, EventKind};
