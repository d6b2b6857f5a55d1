//! # Radio hardware seam.
//!
//! The runtime never talks to an adapter directly. It goes through three
//! traits so that the Bluetooth stack, the scripted test radio and any future
//! backend are interchangeable:
//!
//! ```text
//! RadioFactory::create() ──► Arc<dyn Radio>          (one per rebuild)
//!                                 │
//!                                 └─ connect(address) ──► Box<dyn Link>   (one per poll cycle)
//!                                                            ├─ write(uuid, value)
//!                                                            ├─ discover_profile() ──► Profile
//!                                                            ├─ subscribe(characteristic, handler)
//!                                                            ├─ unsubscribe(characteristic)
//!                                                            └─ disconnect()
//! ```
//!
//! The single process-wide handle lives in [`RadioManager`], which serializes
//! access and can swap the handle in place.

mod manager;
pub mod mock;

#[cfg(feature = "bluetooth")]
pub mod bluetooth;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::{ResourceError, TransportError};

pub use manager::{DEFAULT_CREATE_TIMEOUT, RadioLease, RadioManager};

/// Notification characteristic that pushes sensor records.
pub const READING_UUID: Uuid = Uuid::from_u128(0xebe0ccc1_7a0a_4b0c_8a1a_6ff2997da3a6);

/// Client characteristic configuration descriptor; writing [`NOTIFY_TRIGGER`] starts the sensor pushing.
pub const CLIENT_CONFIG_UUID: Uuid = Uuid::from_u128(0x00002902_0000_1000_8000_00805f9b34fb);

/// Value written to [`CLIENT_CONFIG_UUID`] during the publish step.
pub const NOTIFY_TRIGGER: [u8; 2] = [0x01, 0x00];

/// Callback invoked for every notification payload.
pub type NotificationHandler = Arc<dyn Fn(&[u8]) + Send + Sync>;

/// Hardware operations, used to label errors, events and logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Connect,
    Publish,
    Discover,
    Subscribe,
    Unsubscribe,
    Disconnect,
}

impl Operation {
    /// Lowercase name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Connect => "connect",
            Operation::Publish => "publish",
            Operation::Discover => "discover",
            Operation::Subscribe => "subscribe",
            Operation::Unsubscribe => "unsubscribe",
            Operation::Disconnect => "disconnect",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A characteristic exposed by a connected peripheral, with its capabilities.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Characteristic {
    /// Characteristic identifier.
    pub uuid: Uuid,
    /// Advertises the notify property.
    pub notify: bool,
    /// Has a client configuration descriptor.
    pub config_descriptor: bool,
}

impl Characteristic {
    /// True when a subscription can be opened on this characteristic.
    pub fn can_subscribe(&self) -> bool {
        self.notify && self.config_descriptor
    }
}

/// Result of profile discovery.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Profile {
    /// Every discovered characteristic.
    pub characteristics: Vec<Characteristic>,
}

impl Profile {
    /// Finds a characteristic by identifier.
    pub fn find(&self, uuid: Uuid) -> Option<&Characteristic> {
        self.characteristics.iter().find(|c| c.uuid == uuid)
    }
}

/// Builds fresh radio handles.
#[async_trait]
pub trait RadioFactory: Send + Sync + 'static {
    /// Constructs and starts a new handle.
    async fn create(&self) -> Result<Arc<dyn Radio>, ResourceError>;
}

/// A live adapter handle.
#[async_trait]
pub trait Radio: Send + Sync + 'static {
    /// Opens a connection to the peripheral at `address`.
    async fn connect(&self, address: &str) -> Result<Box<dyn Link>, TransportError>;

    /// Stops the handle. Links opened from it may fail afterwards.
    async fn stop(&self) -> Result<(), TransportError>;
}

/// An open connection to one peripheral. Owned by exactly one poller.
#[async_trait]
pub trait Link: Send + Sync {
    /// Writes `value` to the characteristic, or failing that the descriptor, identified by `uuid`.
    ///
    /// Returns [`TransportError::NotFound`] when the peripheral exposes neither.
    async fn write(&self, uuid: Uuid, value: &[u8]) -> Result<(), TransportError>;

    /// Discovers services and characteristics.
    async fn discover_profile(&self) -> Result<Profile, TransportError>;

    /// Starts notifications; `handler` runs for every payload until unsubscribed.
    async fn subscribe(
        &self,
        characteristic: &Characteristic,
        handler: NotificationHandler,
    ) -> Result<(), TransportError>;

    /// Stops notifications.
    async fn unsubscribe(&self, characteristic: &Characteristic) -> Result<(), TransportError>;

    /// Closes the connection.
    async fn disconnect(&self) -> Result<(), TransportError>;
}
