//! # Bluetooth LE backend (`btleplug`).
//!
//! One [`BluetoothRadio`] wraps the first adapter reported by the platform
//! manager. Scanning starts when the handle is constructed and stops when it is
//! stopped; peripherals are resolved by address from the scan cache, so a
//! device that has not advertised yet fails `connect` and is retried later.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use btleplug::api::{
    BDAddr, Central as _, CharPropFlags, Descriptor, Manager as _, Peripheral as _, ScanFilter,
    WriteType,
};
use btleplug::platform::{Adapter, Manager, Peripheral};
use futures::StreamExt;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::error::{ResourceError, TransportError};
use crate::radio::{
    CLIENT_CONFIG_UUID, Characteristic, Link, NotificationHandler, Operation, Profile, READING_UUID,
    Radio, RadioFactory,
};

/// Builds handles on the first local adapter.
#[derive(Debug, Default, Clone, Copy)]
pub struct BluetoothFactory;

#[async_trait]
impl RadioFactory for BluetoothFactory {
    async fn create(&self) -> Result<Arc<dyn Radio>, ResourceError> {
        let manager = Manager::new().await.map_err(ResourceError::creation)?;
        let adapter = manager
            .adapters()
            .await
            .map_err(ResourceError::creation)?
            .into_iter()
            .next()
            .ok_or_else(|| ResourceError::creation("no bluetooth adapter found"))?;

        adapter
            .start_scan(ScanFilter::default())
            .await
            .map_err(ResourceError::creation)?;
        if let Ok(info) = adapter.adapter_info().await {
            tracing::info!(adapter = %info, "bluetooth adapter scanning");
        }

        Ok(Arc::new(BluetoothRadio {
            adapter,
            stopped: Arc::new(AtomicBool::new(false)),
        }))
    }
}

/// Handle over one adapter.
pub struct BluetoothRadio {
    adapter: Adapter,
    stopped: Arc<AtomicBool>,
}

impl BluetoothRadio {
    async fn find(&self, address: BDAddr) -> Result<Peripheral, TransportError> {
        let peripherals = self
            .adapter
            .peripherals()
            .await
            .map_err(|e| TransportError::failed(Operation::Connect, e))?;

        for peripheral in peripherals {
            if peripheral.address() == address {
                return Ok(peripheral);
            }
        }
        Err(TransportError::failed(
            Operation::Connect,
            format!("{address} not discovered yet"),
        ))
    }
}

#[async_trait]
impl Radio for BluetoothRadio {
    async fn connect(&self, address: &str) -> Result<Box<dyn Link>, TransportError> {
        if self.stopped.load(Ordering::Acquire) {
            return Err(TransportError::Stopped);
        }
        let address: BDAddr = address
            .parse()
            .map_err(|e| TransportError::failed(Operation::Connect, e))?;

        let peripheral = self.find(address).await?;
        peripheral
            .connect()
            .await
            .map_err(|e| TransportError::failed(Operation::Connect, e))?;

        Ok(Box::new(BluetoothLink {
            peripheral,
            stopped: Arc::clone(&self.stopped),
            listener: Mutex::new(None),
        }))
    }

    async fn stop(&self) -> Result<(), TransportError> {
        self.stopped.store(true, Ordering::Release);
        self.adapter
            .stop_scan()
            .await
            .map_err(|e| TransportError::failed(Operation::Disconnect, e))
    }
}

struct BluetoothLink {
    peripheral: Peripheral,
    stopped: Arc<AtomicBool>,
    listener: Mutex<Option<JoinHandle<()>>>,
}

impl BluetoothLink {
    fn check(&self) -> Result<(), TransportError> {
        if self.stopped.load(Ordering::Acquire) {
            Err(TransportError::Stopped)
        } else {
            Ok(())
        }
    }

    async fn resolve(
        &self,
        op: Operation,
        uuid: Uuid,
    ) -> Result<btleplug::api::Characteristic, TransportError> {
        if self.peripheral.characteristics().is_empty() {
            self.peripheral
                .discover_services()
                .await
                .map_err(|e| TransportError::failed(op, e))?;
        }
        self.peripheral
            .characteristics()
            .into_iter()
            .find(|c| c.uuid == uuid)
            .ok_or(TransportError::NotFound { uuid })
    }

    /// Descriptor `uuid`, preferring the one under the reading characteristic.
    fn descriptor(&self, uuid: Uuid) -> Result<Descriptor, TransportError> {
        let characteristics = self.peripheral.characteristics();
        let mut found = characteristics
            .iter()
            .flat_map(|c| c.descriptors.iter())
            .filter(|d| d.uuid == uuid);
        let first = found.next().cloned();
        characteristics
            .iter()
            .filter(|c| c.uuid == READING_UUID)
            .flat_map(|c| c.descriptors.iter())
            .find(|d| d.uuid == uuid)
            .cloned()
            .or(first)
            .ok_or(TransportError::NotFound { uuid })
    }

    fn stop_listener(&self) {
        let handle = self
            .listener
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            handle.abort();
        }
    }
}

#[async_trait]
impl Link for BluetoothLink {
    async fn write(&self, uuid: Uuid, value: &[u8]) -> Result<(), TransportError> {
        self.check()?;
        match self.resolve(Operation::Publish, uuid).await {
            Ok(characteristic) => self
                .peripheral
                .write(&characteristic, value, WriteType::WithoutResponse)
                .await
                .map_err(|e| TransportError::failed(Operation::Publish, e)),
            Err(TransportError::NotFound { .. }) => {
                let descriptor = self.descriptor(uuid)?;
                self.peripheral
                    .write_descriptor(&descriptor, value)
                    .await
                    .map_err(|e| TransportError::failed(Operation::Publish, e))
            }
            Err(e) => Err(e),
        }
    }

    async fn discover_profile(&self) -> Result<Profile, TransportError> {
        self.check()?;
        self.peripheral
            .discover_services()
            .await
            .map_err(|e| TransportError::failed(Operation::Discover, e))?;

        let characteristics = self
            .peripheral
            .characteristics()
            .into_iter()
            .map(|c| Characteristic {
                uuid: c.uuid,
                notify: c.properties.contains(CharPropFlags::NOTIFY),
                config_descriptor: has_config_descriptor(&c.descriptors),
            })
            .collect();
        Ok(Profile { characteristics })
    }

    async fn subscribe(
        &self,
        characteristic: &Characteristic,
        handler: NotificationHandler,
    ) -> Result<(), TransportError> {
        self.check()?;
        let target = self.resolve(Operation::Subscribe, characteristic.uuid).await?;
        let mut stream = self
            .peripheral
            .notifications()
            .await
            .map_err(|e| TransportError::failed(Operation::Subscribe, e))?;
        self.peripheral
            .subscribe(&target)
            .await
            .map_err(|e| TransportError::failed(Operation::Subscribe, e))?;

        let uuid = target.uuid;
        let listener = tokio::spawn(async move {
            while let Some(notification) = stream.next().await {
                if notification.uuid == uuid {
                    handler(notification.value.as_slice());
                }
            }
        });
        if let Some(previous) = self
            .listener
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(listener)
        {
            previous.abort();
        }
        Ok(())
    }

    async fn unsubscribe(&self, characteristic: &Characteristic) -> Result<(), TransportError> {
        self.stop_listener();
        self.check()?;
        let target = self
            .resolve(Operation::Unsubscribe, characteristic.uuid)
            .await?;
        self.peripheral
            .unsubscribe(&target)
            .await
            .map_err(|e| TransportError::failed(Operation::Unsubscribe, e))
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        self.stop_listener();
        self.peripheral
            .disconnect()
            .await
            .map_err(|e| TransportError::failed(Operation::Disconnect, e))
    }
}

impl Drop for BluetoothLink {
    fn drop(&mut self) {
        self.stop_listener();
    }
}

fn has_config_descriptor(descriptors: &BTreeSet<Descriptor>) -> bool {
    descriptors.iter().any(|d| d.uuid == CLIENT_CONFIG_UUID)
}
