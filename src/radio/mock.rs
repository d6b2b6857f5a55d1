//! # Scripted radio backend.
//!
//! [`MockFactory`] builds [`Radio`] handles that behave like a well-mannered
//! sensor unless told otherwise. All handles built by one factory share the
//! same script, so tests can inject failures and inspect counters from outside.
//!
//! ## Example
//! ```rust
//! use radiovisor::radio::{Operation, mock::MockFactory};
//!
//! let factory = MockFactory::new();
//! factory.fail_next(Operation::Subscribe, 3);
//! factory.set_payloads(vec![vec![0xE8, 0x03, 0x32, 0x88, 0x13]]);
//! assert_eq!(factory.created(), 0);
//! ```
//!
//! ## Rules
//! - A stopped handle, and every link opened from it, fails all calls with
//!   [`TransportError::Stopped`].
//! - Payloads are delivered synchronously from inside `subscribe`.
//! - `with_failure_rate` adds random failures on top of the script (dry runs).

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use uuid::Uuid;

use crate::error::{ResourceError, TransportError};
use crate::radio::{
    CLIENT_CONFIG_UUID, Characteristic, Link, NotificationHandler, Operation, Profile, READING_UUID,
    Radio, RadioFactory,
};

#[derive(Default)]
struct Script {
    fail: HashMap<Operation, u32>,
    delays: HashMap<Operation, Duration>,
    calls: HashMap<Operation, u32>,
    payloads: Vec<Vec<u8>>,
    profile: Profile,
    failure_rate: f64,
    creation_delay: Option<Duration>,
}

#[derive(Default)]
struct Shared {
    script: Mutex<Script>,
    created: AtomicU32,
    stopped: AtomicU32,
    creation_failures: AtomicU32,
    open_links: AtomicUsize,
    peak_links: AtomicUsize,
}

impl Shared {
    fn script(&self) -> MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Records the call, applies delay and scripted/random failure.
    async fn step(&self, op: Operation, stopped: &AtomicBool) -> Result<(), TransportError> {
        let delay = {
            let mut s = self.script();
            *s.calls.entry(op).or_insert(0) += 1;
            s.delays.get(&op).copied()
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if stopped.load(Ordering::Acquire) {
            return Err(TransportError::Stopped);
        }

        let mut s = self.script();
        if let Some(left) = s.fail.get_mut(&op).filter(|n| **n > 0) {
            *left -= 1;
            return Err(TransportError::failed(op, "scripted failure"));
        }
        if s.failure_rate > 0.0 && rand::rng().random_bool(s.failure_rate.min(1.0)) {
            return Err(TransportError::failed(op, "simulated interference"));
        }
        Ok(())
    }
}

/// Factory of scripted radio handles. Clones share state.
#[derive(Clone)]
pub struct MockFactory {
    shared: Arc<Shared>,
}

impl Default for MockFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl MockFactory {
    /// Creates a factory whose sensors expose one subscribable reading characteristic.
    ///
    /// The notify trigger lands on that characteristic's configuration descriptor.
    pub fn new() -> Self {
        let shared = Shared::default();
        shared.script().profile = Profile {
            characteristics: vec![Characteristic {
                uuid: READING_UUID,
                notify: true,
                config_descriptor: true,
            }],
        };
        Self {
            shared: Arc::new(shared),
        }
    }

    /// Adds random failures to every operation with probability `rate`.
    pub fn with_failure_rate(self, rate: f64) -> Self {
        self.shared.script().failure_rate = rate.clamp(0.0, 1.0);
        self
    }

    /// Fails the next `times` calls of `op`, across all handles and links.
    pub fn fail_next(&self, op: Operation, times: u32) {
        *self.shared.script().fail.entry(op).or_insert(0) += times;
    }

    /// Fails the next `times` handle constructions.
    pub fn fail_creations(&self, times: u32) {
        self.shared.creation_failures.fetch_add(times, Ordering::AcqRel);
    }

    /// Makes every call of `op` take `delay` before completing.
    pub fn set_delay(&self, op: Operation, delay: Duration) {
        self.shared.script().delays.insert(op, delay);
    }

    /// Makes every handle construction take `delay` before completing.
    pub fn set_creation_delay(&self, delay: Duration) {
        self.shared.script().creation_delay = Some(delay);
    }

    /// Payloads delivered on every successful subscribe.
    pub fn set_payloads(&self, payloads: Vec<Vec<u8>>) {
        self.shared.script().payloads = payloads;
    }

    /// Profile returned by discovery.
    pub fn set_profile(&self, profile: Profile) {
        self.shared.script().profile = profile;
    }

    /// Handles constructed so far.
    pub fn created(&self) -> u32 {
        self.shared.created.load(Ordering::Acquire)
    }

    /// Handles stopped so far.
    pub fn stopped(&self) -> u32 {
        self.shared.stopped.load(Ordering::Acquire)
    }

    /// Calls made to `op` so far (including failed ones).
    pub fn calls(&self, op: Operation) -> u32 {
        self.shared.script().calls.get(&op).copied().unwrap_or(0)
    }

    /// Links currently connected.
    pub fn open_links(&self) -> usize {
        self.shared.open_links.load(Ordering::Acquire)
    }

    /// Highest number of simultaneously connected links observed.
    pub fn peak_links(&self) -> usize {
        self.shared.peak_links.load(Ordering::Acquire)
    }
}

#[async_trait]
impl RadioFactory for MockFactory {
    async fn create(&self) -> Result<Arc<dyn Radio>, ResourceError> {
        let delay = self.shared.script().creation_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let failed = self
            .shared
            .creation_failures
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
            .is_ok();
        if failed {
            return Err(ResourceError::creation("scripted creation failure"));
        }
        self.shared.created.fetch_add(1, Ordering::AcqRel);
        Ok(Arc::new(MockRadio {
            shared: Arc::clone(&self.shared),
            stopped: Arc::new(AtomicBool::new(false)),
        }))
    }
}

/// Handle produced by [`MockFactory`].
pub struct MockRadio {
    shared: Arc<Shared>,
    stopped: Arc<AtomicBool>,
}

#[async_trait]
impl Radio for MockRadio {
    async fn connect(&self, address: &str) -> Result<Box<dyn Link>, TransportError> {
        self.shared.step(Operation::Connect, &self.stopped).await?;

        let open = self.shared.open_links.fetch_add(1, Ordering::AcqRel) + 1;
        self.shared.peak_links.fetch_max(open, Ordering::AcqRel);
        tracing::trace!(address, "mock link opened");

        Ok(Box::new(MockLink {
            shared: Arc::clone(&self.shared),
            stopped: Arc::clone(&self.stopped),
            connected: AtomicBool::new(true),
        }))
    }

    async fn stop(&self) -> Result<(), TransportError> {
        if !self.stopped.swap(true, Ordering::AcqRel) {
            self.shared.stopped.fetch_add(1, Ordering::AcqRel);
        }
        Ok(())
    }
}

struct MockLink {
    shared: Arc<Shared>,
    stopped: Arc<AtomicBool>,
    connected: AtomicBool,
}

impl MockLink {
    fn close(&self) {
        if self.connected.swap(false, Ordering::AcqRel) {
            self.shared.open_links.fetch_sub(1, Ordering::AcqRel);
        }
    }
}

impl Drop for MockLink {
    fn drop(&mut self) {
        self.close();
    }
}

#[async_trait]
impl Link for MockLink {
    async fn write(&self, uuid: Uuid, _value: &[u8]) -> Result<(), TransportError> {
        self.shared.step(Operation::Publish, &self.stopped).await?;
        let script = self.shared.script();
        let descriptor = uuid == CLIENT_CONFIG_UUID
            && script.profile.characteristics.iter().any(|c| c.config_descriptor);
        if script.profile.find(uuid).is_none() && !descriptor {
            return Err(TransportError::NotFound { uuid });
        }
        Ok(())
    }

    async fn discover_profile(&self) -> Result<Profile, TransportError> {
        self.shared.step(Operation::Discover, &self.stopped).await?;
        Ok(self.shared.script().profile.clone())
    }

    async fn subscribe(
        &self,
        characteristic: &Characteristic,
        handler: NotificationHandler,
    ) -> Result<(), TransportError> {
        self.shared.step(Operation::Subscribe, &self.stopped).await?;
        let payloads = self.shared.script().payloads.clone();
        tracing::trace!(uuid = %characteristic.uuid, count = payloads.len(), "mock notifications");
        for payload in &payloads {
            handler(payload.as_slice());
        }
        Ok(())
    }

    async fn unsubscribe(&self, _characteristic: &Characteristic) -> Result<(), TransportError> {
        self.shared.step(Operation::Unsubscribe, &self.stopped).await
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        let res = self.shared.step(Operation::Disconnect, &self.stopped).await;
        self.close();
        res
    }
}
