//! Configuration and construction of devices.
//!
//! | Preset | Frame rate | Use |
//! |--------|------------|-----|
//! | `DeviceConfig::default()` | 60 | Regular play |
//! | `DeviceConfig::low_power()` | 30 | Many devices on one driver |
//! | `DeviceConfig::high_refresh()` | 120 | Fast-paced games |
//!
//! # Example
//!
//! ```
//! use handheld_link::{DeviceBuilder, DeviceConfig, Scheduler};
//! use handheld_link::surface::HeadlessCanvas;
//!
//! # fn main() -> Result<(), handheld_link::HandheldError> {
//! let scheduler = Scheduler::manual();
//! let device = DeviceBuilder::new("device-1")
//!     .with_config(DeviceConfig::low_power())?
//!     .with_color_seed(7)
//!     .build(HeadlessCanvas::new(160, 144), &scheduler)?;
//! assert_eq!(device.frame_rate(), 30);
//! # Ok(())
//! # }
//! ```

use web_time::Duration;

use crate::rng::{Pcg32, Rng, SeedableRng};
use crate::surface::{Color, SurfaceProvider};
use crate::{Device, DeviceId, HandheldError, HandheldResult, Scheduler, DEFAULT_FRAME_RATE};

/// Pastel shells a device frame may be painted in.
pub const FRAME_PALETTE: [Color; 10] = [
    Color::rgb(0x8b, 0xcd, 0xcd),
    Color::rgb(0xa6, 0xdc, 0xef),
    Color::rgb(0xff, 0xaa, 0xa5),
    Color::rgb(0xff, 0xd3, 0xb6),
    Color::rgb(0xdc, 0xed, 0xc1),
    Color::rgb(0xfd, 0xff, 0xbc),
    Color::rgb(0xd9, 0xa5, 0xb3),
    Color::rgb(0xc6, 0xd8, 0xff),
    Color::rgb(0xb8, 0xe0, 0xd2),
    Color::rgb(0xd6, 0xcb, 0xd3),
];

/// The pale green of a blank screen.
pub const SCREEN_COLOR: Color = Color::rgb(0xc4, 0xcf, 0xa1);

/// Default bound of a device's event queue.
pub const DEFAULT_EVENT_QUEUE_SIZE: usize = 100;

/// Highest supported frame rate; one tick per millisecond.
pub const MAX_FRAME_RATE: u32 = 1000;

/// Per-device settings.
///
/// # Forward Compatibility
///
/// New fields may be added to this struct in future versions. Use the
/// `..DeviceConfig::default()` pattern when constructing instances.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use = "DeviceConfig has no effect unless passed to DeviceBuilder::with_config()"]
pub struct DeviceConfig {
    /// Ticks per second while the device is on.
    ///
    /// Default: 60
    pub frame_rate: u32,
    /// Frame color. `None` picks one from [`FRAME_PALETTE`] at random.
    pub frame_color: Option<Color>,
    /// Color the screen is cleared to.
    ///
    /// Default: [`SCREEN_COLOR`]
    pub screen_color: Color,
    /// Events kept before the oldest are dropped.
    ///
    /// Default: 100
    pub event_queue_size: usize,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            frame_rate: DEFAULT_FRAME_RATE,
            frame_color: None,
            screen_color: SCREEN_COLOR,
            event_queue_size: DEFAULT_EVENT_QUEUE_SIZE,
        }
    }
}

impl DeviceConfig {
    /// Creates a new `DeviceConfig` with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Half the default frame rate.
    pub fn low_power() -> Self {
        Self {
            frame_rate: 30,
            ..Self::default()
        }
    }

    /// Twice the default frame rate.
    pub fn high_refresh() -> Self {
        Self {
            frame_rate: 120,
            ..Self::default()
        }
    }

    /// Time between two ticks.
    #[must_use]
    pub fn frame_period(&self) -> Duration {
        Duration::from_secs(1) / self.frame_rate.max(1)
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`HandheldError::InvalidConfig`] if the frame rate is outside
    /// `1..=MAX_FRAME_RATE` or the event queue size is zero.
    pub fn validate(&self) -> HandheldResult<()> {
        if self.frame_rate == 0 {
            return Err(HandheldError::InvalidConfig {
                info: "frame rate must be at least 1".to_owned(),
            });
        }
        if self.frame_rate > MAX_FRAME_RATE {
            return Err(HandheldError::InvalidConfig {
                info: format!(
                    "frame rate {} exceeds the maximum of {}",
                    self.frame_rate, MAX_FRAME_RATE
                ),
            });
        }
        if self.event_queue_size == 0 {
            return Err(HandheldError::InvalidConfig {
                info: "event queue size must be at least 1".to_owned(),
            });
        }
        Ok(())
    }
}

/// Builds a [`Device`].
///
/// [`Device::new`] is shorthand for `DeviceBuilder::new(id).build(provider, scheduler)`.
#[derive(Debug, Clone)]
#[must_use = "DeviceBuilder does nothing until build() is called"]
pub struct DeviceBuilder {
    id: DeviceId,
    config: DeviceConfig,
    color_seed: Option<u64>,
}

impl DeviceBuilder {
    /// Starts building a device with the given id and default settings.
    pub fn new(id: impl Into<DeviceId>) -> Self {
        Self {
            id: id.into(),
            config: DeviceConfig::default(),
            color_seed: None,
        }
    }

    /// Replaces the whole configuration.
    ///
    /// # Errors
    ///
    /// Returns [`HandheldError::InvalidConfig`] if `config` does not validate.
    pub fn with_config(mut self, config: DeviceConfig) -> HandheldResult<Self> {
        config.validate()?;
        self.config = config;
        Ok(self)
    }

    /// Sets the ticks per second.
    ///
    /// # Errors
    ///
    /// Returns [`HandheldError::InvalidConfig`] for 0 or anything above [`MAX_FRAME_RATE`].
    pub fn with_frame_rate(mut self, frame_rate: u32) -> HandheldResult<Self> {
        let config = DeviceConfig {
            frame_rate,
            ..self.config
        };
        config.validate()?;
        self.config = config;
        Ok(self)
    }

    /// Fixes the frame color instead of picking one at random.
    pub fn with_frame_color(mut self, color: Color) -> Self {
        self.config.frame_color = Some(color);
        self
    }

    /// Sets the color the screen is cleared to.
    pub fn with_screen_color(mut self, color: Color) -> Self {
        self.config.screen_color = color;
        self
    }

    /// Sets how many undrained events are kept.
    ///
    /// # Errors
    ///
    /// Returns [`HandheldError::InvalidConfig`] for 0.
    pub fn with_event_queue_size(mut self, size: usize) -> HandheldResult<Self> {
        let config = DeviceConfig {
            event_queue_size: size,
            ..self.config
        };
        config.validate()?;
        self.config = config;
        Ok(self)
    }

    /// Seeds the random frame color pick so it is reproducible.
    pub fn with_color_seed(mut self, seed: u64) -> Self {
        self.color_seed = Some(seed);
        self
    }

    /// Acquires a surface from `provider` and creates the device, powered off and
    /// without a game.
    ///
    /// # Errors
    ///
    /// - [`HandheldError::InvalidConfig`] if the configuration does not validate.
    /// - [`HandheldError::SurfaceUnavailable`] if `provider` yields no surface.
    pub fn build<P: SurfaceProvider>(
        self,
        mut provider: P,
        scheduler: &Scheduler,
    ) -> HandheldResult<Device> {
        self.config.validate()?;
        let surface = provider
            .acquire_surface()
            .ok_or_else(|| HandheldError::SurfaceUnavailable {
                device_id: self.id.clone(),
            })?;

        let frame_color = match self.config.frame_color {
            Some(color) => color,
            None => {
                let mut rng = match self.color_seed {
                    Some(seed) => Pcg32::seed_from_u64(seed),
                    None => Pcg32::from_entropy(),
                };
                rng.choose(&FRAME_PALETTE)
                    .copied()
                    .unwrap_or(FRAME_PALETTE[0])
            },
        };

        Ok(Device::from_parts(
            self.id,
            self.config,
            frame_color,
            surface,
            scheduler.clone(),
        ))
    }
}
