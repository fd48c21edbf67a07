//! Convenient re-exports for common usage.
//!
//! # Usage
//!
//! ```rust
//! use handheld_link::prelude::*;
//! ```
//!
//! # What's Included
//!
//! - **Devices**: [`Device`], [`DeviceBuilder`], [`DeviceConfig`], [`DeviceId`]
//! - **Device state**: [`Button`], [`ButtonStates`], [`PowerState`], [`DeviceEvent`]
//! - **Games**: [`Game`], [`GameMetadata`], [`GameId`], [`Cartridge`], [`GameLibrary`]
//! - **Networking**: [`Network`], [`NetworkMessage`], [`Recipient`]
//! - **Scheduling**: [`Scheduler`], [`TaskHandle`], [`DriverHandle`]
//! - **Error handling**: [`HandheldError`], [`HandheldResult`]
//!
//! # Example
//!
//! ```rust
//! use handheld_link::prelude::*;
//!
//! struct Snake {
//!     metadata: GameMetadata,
//!     length: usize,
//! }
//!
//! impl Game for Snake {
//!     fn metadata(&self) -> &GameMetadata {
//!         &self.metadata
//!     }
//!
//!     fn on_init(&mut self, _device: &Device) {
//!         self.length = 3;
//!     }
//!
//!     fn on_step(&mut self, device: &Device) {
//!         if device.button_states().a {
//!             self.length += 1;
//!         }
//!     }
//! }
//! ```

// Devices
pub use crate::{Device, DeviceBuilder, DeviceConfig, DeviceId};

// Device state
pub use crate::{Button, ButtonStates, DeviceEvent, PowerState};

// Games
pub use crate::{Cartridge, Game, GameId, GameLibrary, GameMetadata};

// Networking
pub use crate::{Network, NetworkMessage, Recipient};

// Scheduling
pub use crate::{DriverHandle, Scheduler, TaskHandle};

// Error handling
pub use crate::{HandheldError, HandheldResult};
