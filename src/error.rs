use std::error::Error;
use std::fmt;
use std::fmt::Display;

use crate::DeviceId;

/// Convenience alias for results returned by this crate.
pub type HandheldResult<T> = Result<T, HandheldError>;

/// This enum contains all error messages this library can return.
///
/// Only construction and configuration are fallible. Everything a running device or
/// network does is total: a `turn_on` without a game, a duplicate `add_device` or a
/// `disconnect_from` a non-peer are documented no-ops rather than errors.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum HandheldError {
    /// The rendering surface could not be acquired while constructing a device.
    SurfaceUnavailable {
        /// The id of the device that failed to construct.
        device_id: DeviceId,
    },
    /// A configuration value was rejected during validation.
    InvalidConfig {
        /// Further specifies why the configuration was invalid.
        info: String,
    },
    /// A button name did not match any of the eight device buttons.
    UnknownButton {
        /// The name that failed to parse.
        name: String,
    },
    /// You made an invalid request, usually by calling an operation the receiver does not support.
    InvalidRequest {
        /// Further specifies why the request was invalid.
        info: String,
    },
    /// A driver is already running for this scheduler.
    DriverAlreadyRunning,
    /// The driver thread could not be started.
    DriverSpawn {
        /// A description of the spawn failure.
        context: String,
    },
}

impl Display for HandheldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HandheldError::SurfaceUnavailable { device_id } => {
                write!(
                    f,
                    "Could not acquire a rendering surface for device {}",
                    device_id
                )
            },
            HandheldError::InvalidConfig { info } => {
                write!(f, "Invalid configuration: {}", info)
            },
            HandheldError::UnknownButton { name } => {
                write!(f, "Unknown button: {:?}", name)
            },
            HandheldError::InvalidRequest { info } => {
                write!(f, "Invalid Request: {}", info)
            },
            HandheldError::DriverAlreadyRunning => {
                write!(f, "A driver is already running for this scheduler")
            },
            HandheldError::DriverSpawn { context } => {
                write!(f, "Failed to start scheduler driver: {}", context)
            },
        }
    }
}

impl Error for HandheldError {}
