//! Messages exchanged between linked devices.
//!
//! A [`NetworkMessage`] is created once by the sender and copied, unchanged, into the
//! sender's own log and the log of every peer it is addressed to.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{Device, DeviceId, BROADCAST_TARGET};

/// Who a [`NetworkMessage`] is addressed to.
///
/// Serializes as a plain string: a device id, or `"all"` for a broadcast.
///
/// ```
/// use handheld_link::{DeviceId, Recipient};
///
/// assert_eq!(Recipient::from("all"), Recipient::All);
/// assert_eq!(
///     Recipient::from("device-2"),
///     Recipient::Device(DeviceId::from("device-2"))
/// );
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Recipient {
    /// Every connected peer.
    All,
    /// The connected peer with this id.
    Device(DeviceId),
}

impl Recipient {
    /// Whether a device with `id` should receive a message sent to this recipient.
    #[must_use]
    pub fn matches(&self, id: &DeviceId) -> bool {
        match self {
            Self::All => true,
            Self::Device(target) => target == id,
        }
    }

    /// Returns `true` for [`Recipient::All`].
    #[must_use]
    pub fn is_broadcast(&self) -> bool {
        matches!(self, Self::All)
    }
}

impl fmt::Display for Recipient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => f.write_str(BROADCAST_TARGET),
            Self::Device(id) => write!(f, "{id}"),
        }
    }
}

impl From<String> for Recipient {
    fn from(value: String) -> Self {
        if value == BROADCAST_TARGET {
            Self::All
        } else {
            Self::Device(DeviceId::from(value))
        }
    }
}

impl From<&str> for Recipient {
    fn from(value: &str) -> Self {
        Self::from(value.to_owned())
    }
}

impl From<DeviceId> for Recipient {
    fn from(value: DeviceId) -> Self {
        Self::from(String::from(value.as_str()))
    }
}

impl From<&DeviceId> for Recipient {
    fn from(value: &DeviceId) -> Self {
        Self::from(value.as_str())
    }
}

impl From<&Device> for Recipient {
    fn from(value: &Device) -> Self {
        Self::from(value.id())
    }
}

impl From<Recipient> for String {
    fn from(value: Recipient) -> Self {
        match value {
            Recipient::All => BROADCAST_TARGET.to_owned(),
            Recipient::Device(id) => id.as_str().to_owned(),
        }
    }
}

/// One message as stored in a device's log. Immutable once created.
///
/// The payload is opaque to the crate and is never inspected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkMessage {
    from: DeviceId,
    to: Recipient,
    data: serde_json::Value,
    timestamp: u64,
}

impl NetworkMessage {
    /// Creates a message stamped with the current wall-clock time.
    #[must_use]
    pub fn new(from: impl Into<DeviceId>, to: impl Into<Recipient>, data: serde_json::Value) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            data,
            timestamp: unix_millis(),
        }
    }

    /// The sending device.
    #[must_use]
    pub fn from(&self) -> &DeviceId {
        &self.from
    }

    /// The addressee.
    #[must_use]
    pub fn to(&self) -> &Recipient {
        &self.to
    }

    /// The payload.
    #[must_use]
    pub fn data(&self) -> &serde_json::Value {
        &self.data
    }

    /// Milliseconds since the Unix epoch at creation.
    #[must_use]
    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }
}

fn unix_millis() -> u64 {
    web_time::SystemTime::now()
        .duration_since(web_time::UNIX_EPOCH)
        .map_or(0, |elapsed| elapsed.as_millis() as u64)
}
