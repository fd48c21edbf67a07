//! # Handheld Link
//!
//! Handheld Link simulates pocket game consoles. Every [`Device`] has a power switch,
//! eight buttons, a slot for one pluggable [`Game`], and link-cable style connections
//! to other devices over which it exchanges [`NetworkMessage`]s. A [`Network`] keeps
//! a set of devices wired together as a complete graph.
//!
//! Devices never own a timer of their own. Powered-on devices register one periodic
//! task each with a shared [`Scheduler`], which is driven either manually (virtual
//! time, fully deterministic) or by a single background driver thread.
//!
//! ```
//! use handheld_link::prelude::*;
//! use handheld_link::surface::HeadlessCanvas;
//!
//! # fn main() -> Result<(), HandheldError> {
//! let scheduler = Scheduler::manual();
//! let a = Device::new("device-1", HeadlessCanvas::new(160, 144), &scheduler)?;
//! let b = Device::new("device-2", HeadlessCanvas::new(160, 144), &scheduler)?;
//!
//! let mut network = Network::new();
//! network.add_device(&a);
//! network.add_device(&b);
//! assert!(a.is_connected_to(&b));
//!
//! a.send_network_message(Recipient::All, serde_json::json!({ "hello": "world" }));
//! assert_eq!(b.network_messages(true).len(), 1);
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)] // let us try
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub use device::builder::{DeviceBuilder, DeviceConfig, FRAME_PALETTE, SCREEN_COLOR};
pub use device::event_drain::EventDrain;
pub use device::messages::{NetworkMessage, Recipient};
pub use device::Device;
pub use error::{HandheldError, HandheldResult};
pub use game::{Cartridge, Game, GameId, GameLibrary, GameMetadata};
pub use network::Network;
pub use scheduler::{DriverHandle, Scheduler, TaskHandle, TaskId};

pub mod device;
#[doc(hidden)]
pub mod error;
pub mod game;
pub mod network;
pub mod prelude;
/// Internal random number generator module based on PCG32.
///
/// Used to pick a device's frame color. See the module documentation for usage details.
pub mod rng;
pub mod scheduler;
pub mod surface;
pub mod telemetry;

// #############
// # CONSTANTS #
// #############

/// Ticks per second used by a device unless configured otherwise.
pub const DEFAULT_FRAME_RATE: u32 = 60;

/// The recipient marker that addresses every connected peer.
pub const BROADCAST_TARGET: &str = "all";

/// Unique, immutable identifier of a device.
///
/// Adjacency sets are keyed by `DeviceId` and messages carry sender and recipient ids,
/// but devices themselves compare by handle: two distinct devices that share an id are
/// still different devices, and at most one of them can be linked to a given peer.
///
/// # Examples
///
/// ```
/// use handheld_link::DeviceId;
///
/// let id = DeviceId::from("device-1");
/// assert_eq!(id.as_str(), "device-1");
/// assert_eq!(id.to_string(), "device-1");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(String);

impl DeviceId {
    /// Creates a new `DeviceId`.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        DeviceId(id.into())
    }

    /// Returns the id as a string slice.
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DeviceId {
    fn from(value: &str) -> Self {
        DeviceId(value.to_owned())
    }
}

impl From<String> for DeviceId {
    fn from(value: String) -> Self {
        DeviceId(value)
    }
}

impl From<&DeviceId> for DeviceId {
    fn from(value: &DeviceId) -> Self {
        value.clone()
    }
}

impl AsRef<str> for DeviceId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl PartialEq<str> for DeviceId {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for DeviceId {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

// #############
// #   ENUMS   #
// #############

/// The eight physical buttons of a device.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Button {
    /// D-pad up.
    Up,
    /// D-pad down.
    Down,
    /// D-pad left.
    Left,
    /// D-pad right.
    Right,
    /// The A face button.
    A,
    /// The B face button.
    B,
    /// Start.
    Start,
    /// Select.
    Select,
}

impl Button {
    /// Every button, in the order they appear in [`ButtonStates`].
    pub const ALL: [Button; 8] = [
        Button::Up,
        Button::Down,
        Button::Left,
        Button::Right,
        Button::A,
        Button::B,
        Button::Start,
        Button::Select,
    ];

    /// Returns the lowercase name of the button.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Button::Up => "up",
            Button::Down => "down",
            Button::Left => "left",
            Button::Right => "right",
            Button::A => "a",
            Button::B => "b",
            Button::Start => "start",
            Button::Select => "select",
        }
    }
}

impl fmt::Display for Button {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Button {
    type Err = HandheldError;

    /// Parses a button name, ignoring ASCII case.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Button::ALL
            .into_iter()
            .find(|button| button.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| HandheldError::UnknownButton { name: s.to_owned() })
    }
}

/// Snapshot of all eight button flags. Every flag is always defined.
///
/// `ButtonStates` is `Copy`, so anything handed out by [`Device::button_states`] is an
/// independent snapshot that cannot write back into the device.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ButtonStates {
    /// D-pad up.
    pub up: bool,
    /// D-pad down.
    pub down: bool,
    /// D-pad left.
    pub left: bool,
    /// D-pad right.
    pub right: bool,
    /// The A face button.
    pub a: bool,
    /// The B face button.
    pub b: bool,
    /// Start.
    pub start: bool,
    /// Select.
    pub select: bool,
}

impl ButtonStates {
    /// Returns whether `button` is pressed.
    #[must_use]
    pub const fn get(&self, button: Button) -> bool {
        match button {
            Button::Up => self.up,
            Button::Down => self.down,
            Button::Left => self.left,
            Button::Right => self.right,
            Button::A => self.a,
            Button::B => self.b,
            Button::Start => self.start,
            Button::Select => self.select,
        }
    }

    /// Sets the flag for `button`.
    pub fn set(&mut self, button: Button, pressed: bool) {
        let flag = match button {
            Button::Up => &mut self.up,
            Button::Down => &mut self.down,
            Button::Left => &mut self.left,
            Button::Right => &mut self.right,
            Button::A => &mut self.a,
            Button::B => &mut self.b,
            Button::Start => &mut self.start,
            Button::Select => &mut self.select,
        };
        *flag = pressed;
    }

    /// Iterates over the buttons that are currently pressed.
    #[must_use = "iterators are lazy and do nothing unless consumed"]
    pub fn pressed(&self) -> impl Iterator<Item = Button> + '_ {
        Button::ALL
            .into_iter()
            .filter(move |button| self.get(*button))
    }

    /// Returns `true` if at least one button is pressed.
    #[must_use]
    pub fn any_pressed(&self) -> bool {
        self.pressed().next().is_some()
    }
}

/// A device is always in one of these states.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PowerState {
    /// The device is off: no scheduler task, blank screen.
    #[default]
    Off,
    /// The device is on and its game is stepped once per tick.
    On,
}

/// Notifications that a device queues for the driver layer. Handling them is optional.
///
/// Drain them with [`Device::events`]. If more than the configured number of events pile
/// up, the oldest are discarded.
///
/// # Forward Compatibility
///
/// This enum is marked `#[non_exhaustive]`; always include a wildcard arm when matching.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
#[non_exhaustive]
pub enum DeviceEvent {
    /// The device transitioned Off→On.
    PoweredOn,
    /// The device transitioned On→Off.
    PoweredOff,
    /// A game was inserted, replacing any previous one.
    GameLoaded {
        /// The derived id of the loaded game.
        game_id: GameId,
    },
    /// A symmetric link to `peer` was established.
    PeerConnected {
        /// The newly linked peer.
        peer: DeviceId,
    },
    /// The link to `peer` was torn down.
    PeerDisconnected {
        /// The peer that is no longer linked.
        peer: DeviceId,
    },
    /// A message from another device arrived in the log.
    MessageReceived {
        /// The sender of the message.
        from: DeviceId,
    },
}

// ###################
// # UNIT TESTS      #
// ###################
