//! Error types for layout and coordinator setup
//!
//! Everything here is detected before the first refresh cycle runs. A running
//! cycle never returns an error.

use thiserror::Error;

use crate::layout::DeviceIndex;

/// Fatal configuration errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// At least one output device is required
    #[error("no output devices configured")]
    NoDevices,

    /// A device must own at least one channel
    #[error("device {device} has zero channels")]
    ZeroChannels { device: DeviceIndex },

    /// A device claims more channels than the per-device limit
    #[error("device {device} has {count} channels (limit is {max})")]
    TooManyChannels {
        device: DeviceIndex,
        count: usize,
        max: usize,
    },

    /// Device indices must match registration order
    #[error("device at position {position} carries index {index}")]
    IndexMismatch { position: usize, index: DeviceIndex },

    /// Two devices share at least one channel
    #[error("device {first} [{first_start}, {first_end}) overlaps device {second} [{second_start}, {second_end})")]
    Overlap {
        first: DeviceIndex,
        first_start: usize,
        first_end: usize,
        second: DeviceIndex,
        second_start: usize,
        second_end: usize,
    },

    /// Offset plus channel count does not fit the channel address space
    #[error("device {device} at offset {offset} with {channels} channels overflows the channel space")]
    OffsetOverflow {
        device: DeviceIndex,
        offset: usize,
        channels: usize,
    },

    /// Channel space has a hole nobody owns
    #[error("channels [{start}, {end}) are not owned by any device")]
    Gap { start: usize, end: usize },

    /// Device range extends past the channel space
    #[error("device {device} range [{start}, {end}) exceeds {total} channels")]
    OutOfRange {
        device: DeviceIndex,
        start: usize,
        end: usize,
        total: usize,
    },

    /// Number of drivers differs from number of devices
    #[error("{drivers} drivers registered for {devices} devices")]
    DriverCountMismatch { drivers: usize, devices: usize },

    /// Store size differs from the layout's channel total
    #[error("channel store holds {store} channels, layout needs {layout}")]
    StoreSizeMismatch { store: usize, layout: usize },

    /// Value range minimum above maximum
    #[error("invalid value range {min}..={max}")]
    InvalidValueRange { min: u16, max: u16 },

    /// Scheduling periods must be non-zero
    #[error("invalid timing: {0}")]
    InvalidTiming(String),
}

/// Result type for setup operations
pub type Result<T> = std::result::Result<T, ConfigError>;
