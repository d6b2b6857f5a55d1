//! Error types used by the pollers, the radio manager and process startup.
//!
//! The taxonomy follows where an error is handled:
//!
//! - [`TransportError`]: a hardware call failed; retried locally, then tallied.
//! - [`ProtocolError`]: a notification payload could not be decoded; the reading is dropped.
//! - [`ResourceError`]: the shared radio could not be acquired or constructed.
//! - [`ConfigError`]: the device table could not be loaded.
//! - [`StartupError`]: anything that stops the process before polling begins.
//!
//! Every enum provides `as_label` (stable snake_case) for logs and metrics.

use std::time::Duration;

use thiserror::Error;
use uuid::Uuid;

use crate::radio::Operation;

/// # Errors produced by hardware calls.
///
/// All variants are recoverable: the retry executor absorbs them and the
/// failure tracker counts them.
#[non_exhaustive]
#[derive(Error, Debug, Clone)]
pub enum TransportError {
    /// The backend reported a failure for this operation.
    #[error("{op} failed: {reason}")]
    Failed {
        /// Operation that failed.
        op: Operation,
        /// Backend error message.
        reason: String,
    },

    /// A single attempt exceeded its deadline.
    #[error("{op} timed out after {timeout:?}")]
    Timeout {
        /// Operation that timed out.
        op: Operation,
        /// Per-attempt deadline.
        timeout: Duration,
    },

    /// No radio handle is installed (last rebuild failed).
    #[error("radio unavailable")]
    Unavailable,

    /// The radio handle was stopped while the caller still used it.
    #[error("radio stopped")]
    Stopped,

    /// The peripheral does not expose the characteristic.
    #[error("characteristic {uuid} not found")]
    NotFound {
        /// Characteristic identifier.
        uuid: Uuid,
    },

    /// The characteristic cannot deliver notifications.
    #[error("characteristic {uuid} does not support notifications")]
    NotSubscribable {
        /// Characteristic identifier.
        uuid: Uuid,
    },
}

impl TransportError {
    /// Shorthand for [`TransportError::Failed`].
    pub fn failed(op: Operation, reason: impl ToString) -> Self {
        TransportError::Failed {
            op,
            reason: reason.to_string(),
        }
    }

    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use radiovisor::TransportError;
    ///
    /// assert_eq!(TransportError::Stopped.as_label(), "transport_stopped");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            TransportError::Failed { .. } => "transport_failed",
            TransportError::Timeout { .. } => "transport_timeout",
            TransportError::Unavailable => "transport_unavailable",
            TransportError::Stopped => "transport_stopped",
            TransportError::NotFound { .. } => "transport_not_found",
            TransportError::NotSubscribable { .. } => "transport_not_subscribable",
        }
    }
}

/// # Payload decoding errors.
///
/// Never counted toward a device's failure tally.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Payload length differs from the fixed record size.
    #[error("expected {expected} bytes, got {actual}")]
    InvalidLength {
        /// Required payload length.
        expected: usize,
        /// Received payload length.
        actual: usize,
    },
}

impl ProtocolError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            ProtocolError::InvalidLength { .. } => "protocol_invalid_length",
        }
    }
}

/// # Errors around the shared radio resource.
#[non_exhaustive]
#[derive(Error, Debug, Clone)]
pub enum ResourceError {
    /// The radio lock could not be acquired in time.
    #[error("radio lock not acquired within {timeout:?}")]
    Contention {
        /// How long the caller waited.
        timeout: Duration,
    },

    /// A new radio handle could not be constructed.
    #[error("radio construction failed: {reason}")]
    Creation {
        /// Backend error message.
        reason: String,
    },
}

impl ResourceError {
    /// Shorthand for [`ResourceError::Creation`].
    pub fn creation(reason: impl ToString) -> Self {
        ResourceError::Creation {
            reason: reason.to_string(),
        }
    }

    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            ResourceError::Contention { .. } => "resource_contention",
            ResourceError::Creation { .. } => "resource_creation",
        }
    }
}

/// # Device table loading errors.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The file could not be read or is not valid INI.
    #[error("failed to read device table: {0}")]
    Read(#[from] ini::Error),

    /// The `[Devices]` section is absent.
    #[error("missing [{section}] section")]
    MissingSection {
        /// Expected section name.
        section: &'static str,
    },

    /// The `[Devices]` section has no entries.
    #[error("no devices configured")]
    Empty,

    /// An entry could not be turned into a device.
    #[error("invalid device '{name}' = '{address}': {reason}")]
    InvalidEntry {
        /// Device name (INI key).
        name: String,
        /// Radio address (INI value).
        address: String,
        /// Why it was rejected.
        reason: &'static str,
    },
}

impl ConfigError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            ConfigError::Read(_) => "config_read",
            ConfigError::MissingSection { .. } => "config_missing_section",
            ConfigError::Empty => "config_empty",
            ConfigError::InvalidEntry { .. } => "config_invalid_entry",
        }
    }
}

/// # Unrecoverable startup failures.
///
/// The binary exits with status 1 on any of these.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum StartupError {
    /// Device table could not be loaded.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Initial radio handle could not be constructed.
    #[error(transparent)]
    Radio(#[from] ResourceError),

    /// Metrics could not be registered.
    #[error("metrics registration failed: {0}")]
    Metrics(#[from] prometheus::Error),

    /// Metrics endpoint could not bind.
    #[error("metrics endpoint failed: {0}")]
    Listen(#[from] hyper::Error),
}

impl StartupError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            StartupError::Config(e) => e.as_label(),
            StartupError::Radio(e) => e.as_label(),
            StartupError::Metrics(_) => "startup_metrics",
            StartupError::Listen(_) => "startup_listen",
        }
    }
}
