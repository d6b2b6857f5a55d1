//! # Shared radio resource.
//!
//! [`RadioManager`] owns the single adapter handle used by every poller.
//!
//! ## Architecture
//! ```text
//!  Poller ──► acquire() ───────────┐
//!  Poller ──► acquire() ──(waits)  │   lock: Arc<Mutex<()>>   (one lease at a time)
//!  Coordinator ──► acquire_timeout ┘
//!                                      slot: RwLock<Option<Arc<dyn Radio>>>
//!                                            (short-held, never across .await)
//!
//!  rebuild(&mut lease)   stop old ─► create new ─► install   (caller holds the lease)
//!  force_rebuild()       stop old ─► create new ─► install   (lease may be held elsewhere)
//! ```
//!
//! ## Rules
//! - At most one [`RadioLease`] exists at any instant; dropping it releases the lock.
//! - A lease snapshots the handle installed when it was granted.
//! - [`RadioManager::force_rebuild`] does **not** wait for the current lease holder.
//!   The holder keeps a clone of the old, stopped handle; its remaining calls
//!   fail with `Stopped` and it proceeds to disconnect and release.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::error::{ResourceError, TransportError};
use crate::radio::{Radio, RadioFactory};

/// Exclusive right to use the radio, granted by [`RadioManager`].
///
/// Released when dropped.
pub struct RadioLease {
    radio: Option<Arc<dyn Radio>>,
    generation: u64,
    _permit: OwnedMutexGuard<()>,
}

impl RadioLease {
    /// The handle installed when this lease was granted (or by the last rebuild through it).
    pub fn radio(&self) -> Result<&Arc<dyn Radio>, TransportError> {
        self.radio.as_ref().ok_or(TransportError::Unavailable)
    }

    /// Handle generation this lease refers to.
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

/// Owner of the process-wide radio handle.
pub struct RadioManager {
    factory: Arc<dyn RadioFactory>,
    lock: Arc<Mutex<()>>,
    slot: RwLock<Option<Arc<dyn Radio>>>,
    generation: AtomicU64,
    create_timeout: Duration,
}

/// Default limit for stopping or constructing one handle.
pub const DEFAULT_CREATE_TIMEOUT: Duration = Duration::from_secs(10);

impl RadioManager {
    /// Constructs the initial handle, giving the factory [`DEFAULT_CREATE_TIMEOUT`].
    ///
    /// Fails if the factory cannot build one; callers treat that as fatal.
    pub async fn new(factory: Arc<dyn RadioFactory>) -> Result<Self, ResourceError> {
        Self::with_create_timeout(factory, DEFAULT_CREATE_TIMEOUT).await
    }

    /// Constructs the initial handle; every stop and construction is limited to `create_timeout`.
    pub async fn with_create_timeout(
        factory: Arc<dyn RadioFactory>,
        create_timeout: Duration,
    ) -> Result<Self, ResourceError> {
        let radio = create_within(factory.as_ref(), create_timeout).await?;
        tracing::info!(generation = 1, "radio handle constructed");
        Ok(Self {
            factory,
            lock: Arc::new(Mutex::new(())),
            slot: RwLock::new(Some(radio)),
            generation: AtomicU64::new(1),
            create_timeout,
        })
    }

    /// Waits as long as needed for the lease.
    pub async fn acquire(&self) -> RadioLease {
        let permit = Arc::clone(&self.lock).lock_owned().await;
        self.lease(permit)
    }

    /// Waits at most `timeout` for the lease.
    pub async fn acquire_timeout(&self, timeout: Duration) -> Result<RadioLease, ResourceError> {
        match tokio::time::timeout(timeout, Arc::clone(&self.lock).lock_owned()).await {
            Ok(permit) => Ok(self.lease(permit)),
            Err(_elapsed) => Err(ResourceError::Contention { timeout }),
        }
    }

    /// Returns the lease. Equivalent to dropping it.
    pub fn release(&self, lease: RadioLease) {
        drop(lease);
    }

    /// Replaces the handle while holding `lease`; the lease then refers to the new handle.
    ///
    /// On construction failure no handle is installed until the next successful rebuild.
    pub async fn rebuild(&self, lease: &mut RadioLease) -> Result<(), ResourceError> {
        let radio = self.replace().await?;
        lease.radio = Some(radio);
        lease.generation = self.generation();
        Ok(())
    }

    /// Replaces the handle without holding the lease.
    ///
    /// Any poller currently holding a lease keeps using the stopped handle until it releases.
    pub async fn force_rebuild(&self) -> Result<(), ResourceError> {
        tracing::warn!(
            generation = self.generation(),
            "force-stopping radio handle without the lock"
        );
        self.replace().await.map(|_| ())
    }

    /// Currently installed handle, if any.
    pub fn current(&self) -> Option<Arc<dyn Radio>> {
        self.slot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of handles constructed so far (including the initial one).
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    fn lease(&self, permit: OwnedMutexGuard<()>) -> RadioLease {
        RadioLease {
            radio: self.current(),
            generation: self.generation(),
            _permit: permit,
        }
    }

    async fn replace(&self) -> Result<Arc<dyn Radio>, ResourceError> {
        let old = self
            .slot
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        if let Some(old) = old {
            match tokio::time::timeout(self.create_timeout, old.stop()).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::warn!(error = %e, "stopping old radio handle failed"),
                Err(_elapsed) => tracing::warn!(
                    timeout = ?self.create_timeout,
                    "stopping old radio handle timed out"
                ),
            }
        }

        let radio = create_within(self.factory.as_ref(), self.create_timeout).await?;
        *self.slot.write().unwrap_or_else(PoisonError::into_inner) = Some(Arc::clone(&radio));
        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        tracing::info!(generation, "radio handle constructed");
        Ok(radio)
    }
}

async fn create_within(
    factory: &dyn RadioFactory,
    timeout: Duration,
) -> Result<Arc<dyn Radio>, ResourceError> {
    tokio::time::timeout(timeout, factory.create())
        .await
        .map_err(|_elapsed| ResourceError::creation(format!("timed out after {timeout:?}")))?
}
