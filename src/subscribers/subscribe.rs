//! # Subscriber trait
//!
//! `Subscribe` is the extension point for reacting to lifecycle events. Each
//! subscriber is driven by a dedicated worker fed by a bounded queue owned by
//! the [`SubscriberSet`](crate::subscribers::SubscriberSet), so a slow subscriber
//! never stalls a poller.
//!
//! ## Example
//! ```rust
//! use radiovisor::events::{Event, EventKind};
//! use radiovisor::subscribers::Subscribe;
//!
//! struct ResetAlarm;
//!
//! #[async_trait::async_trait]
//! impl Subscribe for ResetAlarm {
//!     async fn on_event(&self, ev: &Event) {
//!         if ev.kind == EventKind::ResetRequested {
//!             // page someone
//!         }
//!     }
//!     fn name(&self) -> &'static str { "reset-alarm" }
//!     fn queue_capacity(&self) -> usize { 16 }
//! }
//! ```

use async_trait::async_trait;

use crate::events::Event;

/// Contract for event subscribers.
#[async_trait]
pub trait Subscribe: Send + Sync + 'static {
    /// Handles a single event.
    async fn on_event(&self, event: &Event);

    /// Name used in overflow/panic reports.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Capacity of this subscriber's queue; events beyond it are dropped.
    fn queue_capacity(&self) -> usize {
        1024
    }
}
