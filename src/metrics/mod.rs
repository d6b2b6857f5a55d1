//! # Metrics surface.
//!
//! Pollers push every decoded reading and every connection outcome into a
//! [`MetricsSink`]. Only the latest value per device is kept.
//!
//! ```text
//!  Poller ── record_reading(device, &Reading) ──┐
//!  Poller ── set_connection_failed(device, b) ──┼──► MetricsSink ──► PrometheusSink ──► /metrics
//!  MetricsWriter ── record_error(device) ───────┘                └─► MemorySink (tests, dry runs)
//! ```
//!
//! ## Exported series (all labelled `location`)
//! | name | type | value |
//! |---|---|---|
//! | `mi_temperature` | gauge | degrees |
//! | `mi_humidity` | gauge | percent |
//! | `mi_voltage` | gauge | volts |
//! | `mi_battery` | gauge | derived percent |
//! | `mi_device_connection_failed` | gauge | 1 after connect exhausted its retries, 0 after a successful connect |
//! | `mi_device_errors_total` | counter | failed hardware attempts |

mod server;

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use prometheus::{Encoder, GaugeVec, IntCounterVec, Opts, Registry, TextEncoder};

use crate::reading::Reading;

pub use server::{MetricsServer, serve_metrics};

/// Label carrying the device name.
pub const DEVICE_LABEL: &str = "location";

/// Destination for per-device readings and health.
pub trait MetricsSink: Send + Sync + 'static {
    /// Stores the latest reading of `device`.
    fn record_reading(&self, device: &str, reading: &Reading);

    /// Marks whether the last connect to `device` gave up.
    fn set_connection_failed(&self, device: &str, failed: bool);

    /// Counts one failed hardware attempt for `device`.
    fn record_error(&self, device: &str);
}

/// Prometheus-backed sink on a private [`Registry`].
#[derive(Clone)]
pub struct PrometheusSink {
    registry: Registry,
    temperature: GaugeVec,
    humidity: GaugeVec,
    voltage: GaugeVec,
    battery: GaugeVec,
    connection_failed: GaugeVec,
    errors: IntCounterVec,
}

impl PrometheusSink {
    /// Creates the series and registers them on a fresh registry.
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let temperature = gauge(&registry, "mi_temperature", "Temperature in degrees")?;
        let humidity = gauge(&registry, "mi_humidity", "Relative humidity in percent")?;
        let voltage = gauge(&registry, "mi_voltage", "Battery voltage in volts")?;
        let battery = gauge(&registry, "mi_battery", "Battery charge in percent")?;
        let connection_failed = gauge(
            &registry,
            "mi_device_connection_failed",
            "1 if the last connection attempt gave up",
        )?;

        let errors = IntCounterVec::new(
            Opts::new(
                "mi_device_errors_total",
                "Failed hardware operations per device",
            ),
            &[DEVICE_LABEL],
        )?;
        registry.register(Box::new(errors.clone()))?;

        Ok(Self {
            registry,
            temperature,
            humidity,
            voltage,
            battery,
            connection_failed,
            errors,
        })
    }

    /// Registry holding every series of this sink.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Renders the registry in the Prometheus text format.
    pub fn render(&self) -> Result<String, prometheus::Error> {
        encode(&self.registry)
    }
}

impl MetricsSink for PrometheusSink {
    fn record_reading(&self, device: &str, reading: &Reading) {
        self.temperature
            .with_label_values(&[device])
            .set(reading.temperature);
        self.humidity.with_label_values(&[device]).set(reading.humidity);
        self.voltage.with_label_values(&[device]).set(reading.voltage);
        self.battery
            .with_label_values(&[device])
            .set(reading.battery_percent());
    }

    fn set_connection_failed(&self, device: &str, failed: bool) {
        self.connection_failed
            .with_label_values(&[device])
            .set(if failed { 1.0 } else { 0.0 });
    }

    fn record_error(&self, device: &str) {
        self.errors.with_label_values(&[device]).inc();
    }
}

fn gauge(registry: &Registry, name: &str, help: &str) -> Result<GaugeVec, prometheus::Error> {
    let g = GaugeVec::new(Opts::new(name, help), &[DEVICE_LABEL])?;
    registry.register(Box::new(g.clone()))?;
    Ok(g)
}

pub(crate) fn encode(registry: &Registry) -> Result<String, prometheus::Error> {
    let mut buffer = Vec::new();
    TextEncoder::new().encode(&registry.gather(), &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
}

/// Latest state of one device as seen by a [`MemorySink`].
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct DeviceSnapshot {
    /// Last decoded reading.
    pub reading: Option<Reading>,
    /// Last connection outcome.
    pub connection_failed: bool,
    /// Failed hardware attempts so far.
    pub errors: u64,
    /// Readings recorded so far.
    pub readings: u64,
}

/// In-process sink keeping the latest values in a map.
#[derive(Debug, Default)]
pub struct MemorySink {
    devices: Mutex<HashMap<String, DeviceSnapshot>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// State of `device`, if anything was recorded for it.
    pub fn snapshot(&self, device: &str) -> Option<DeviceSnapshot> {
        self.devices
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(device)
            .copied()
    }

    fn update(&self, device: &str, f: impl FnOnce(&mut DeviceSnapshot)) {
        let mut devices = self.devices.lock().unwrap_or_else(PoisonError::into_inner);
        f(devices.entry(device.to_owned()).or_default());
    }
}

impl MetricsSink for MemorySink {
    fn record_reading(&self, device: &str, reading: &Reading) {
        self.update(device, |s| {
            s.reading = Some(*reading);
            s.readings += 1;
        });
    }

    fn set_connection_failed(&self, device: &str, failed: bool) {
        self.update(device, |s| s.connection_failed = failed);
    }

    fn record_error(&self, device: &str) {
        self.update(device, |s| s.errors += 1);
    }
}
