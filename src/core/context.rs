//! Shared state handed to every poller and the reset coordinator.

use std::sync::Arc;

use crate::config::Config;
use crate::core::tracker::{FailureTracker, ResetFlag};
use crate::events::Bus;
use crate::metrics::MetricsSink;
use crate::radio::RadioManager;

/// Radio handle, failure tallies, reset flag, metrics sink and event bus.
///
/// Built once at startup and shared behind an `Arc`.
pub struct Context {
    config: Config,
    radio: RadioManager,
    tracker: FailureTracker,
    reset: Arc<ResetFlag>,
    sink: Arc<dyn MetricsSink>,
    bus: Bus,
}

impl Context {
    pub fn new(config: Config, radio: RadioManager, sink: Arc<dyn MetricsSink>) -> Self {
        let bus = Bus::new(config.bus_capacity_clamped());
        let reset = Arc::new(ResetFlag::new());
        let tracker = FailureTracker::new(config.failure_threshold, Arc::clone(&reset), bus.clone());
        Self {
            config,
            radio,
            tracker,
            reset,
            sink,
            bus,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn radio(&self) -> &RadioManager {
        &self.radio
    }

    pub fn tracker(&self) -> &FailureTracker {
        &self.tracker
    }

    pub fn reset_flag(&self) -> &Arc<ResetFlag> {
        &self.reset
    }

    pub fn sink(&self) -> &Arc<dyn MetricsSink> {
        &self.sink
    }

    pub fn bus(&self) -> &Bus {
        &self.bus
    }
}
