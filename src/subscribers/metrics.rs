//! Error counter fed from the event stream.

use std::sync::Arc;

use async_trait::async_trait;

use crate::events::{Event, EventKind};
use crate::metrics::MetricsSink;
use crate::subscribers::Subscribe;

/// Increments the per-device error counter on every failed hardware attempt.
pub struct MetricsWriter {
    sink: Arc<dyn MetricsSink>,
}

impl MetricsWriter {
    pub fn new(sink: Arc<dyn MetricsSink>) -> Self {
        Self { sink }
    }
}

#[async_trait]
impl Subscribe for MetricsWriter {
    async fn on_event(&self, e: &Event) {
        if e.kind == EventKind::OperationFailed {
            if let Some(device) = e.device.as_deref() {
                self.sink.record_error(device);
            }
        }
    }

    fn name(&self) -> &'static str {
        "metrics"
    }
}
