//! CV GW - control-voltage output gateway
//!
//! A producer (usually MIDI input) writes channel values into a
//! [`ChannelStore`]. A [`RefreshCoordinator`] hands each DAC its own slice of
//! that store whenever the DAC reports ready, driven by a
//! [`RefreshScheduler`] with a fixed tick and a forced-refresh heartbeat.

pub mod config;
pub mod drivers;
pub mod error;
pub mod layout;
pub mod midi;
pub mod producer;
pub mod refresh;
pub mod store;

pub use config::AppConfig;
pub use drivers::DeviceDriver;
pub use error::ConfigError;
pub use layout::{DeviceDescriptor, DeviceIndex, DeviceLayout};
pub use refresh::{CycleReport, CycleTrigger, RefreshCoordinator, RefreshMonitor, RefreshScheduler};
pub use store::{ChannelStore, ChannelValue, ValueRange};
