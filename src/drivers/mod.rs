//! DAC device drivers
//!
//! One driver instance per physical output device. The refresh coordinator
//! only ever talks to devices through [`DeviceDriver`], so transports (I2C,
//! SPI, USB, simulation) stay out of the core.

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use crate::config::DriverConfig;
use crate::layout::{DeviceDescriptor, DeviceIndex};
use crate::store::ChannelValue;

/// Capability set every output device exposes to the refresh coordinator
///
/// `is_ready`, `commit` and `acknowledge` run inside the refresh cycle and
/// must return quickly without blocking. They take `&self` so drivers can be
/// shared as `Arc<dyn DeviceDriver>`; use interior mutability for state.
///
/// Per cycle the coordinator calls them in this order, and calls `commit` /
/// `acknowledge` only after `is_ready` returned true for the same device:
/// 1. `is_ready(d)`
/// 2. `commit(d, samples)` with the freshly copied output slice
/// 3. `acknowledge(d)`
#[async_trait]
pub trait DeviceDriver: Send + Sync {
    /// Driver name for logging (e.g. "dac-a")
    fn name(&self) -> &str;

    /// Prepare the device before the first cycle
    ///
    /// Default implementation: nothing to prepare
    async fn init(&self, _device: &DeviceDescriptor) -> Result<()> {
        Ok(())
    }

    /// Whether the device can accept a new sample set right now
    ///
    /// Returning false skips the device for this cycle. This is the only gate
    /// protecting an in-flight transfer from being overwritten.
    fn is_ready(&self, device: DeviceIndex) -> bool;

    /// Start transmitting `samples` (the device's whole output slice)
    fn commit(&self, device: DeviceIndex, samples: &[ChannelValue]);

    /// Post-commit bookkeeping (counters, ping-pong buffer toggles)
    fn acknowledge(&self, device: DeviceIndex);

    /// Release the device
    ///
    /// Default implementation: nothing to release
    async fn shutdown(&self) -> Result<()> {
        Ok(())
    }
}

pub mod console;
pub mod simulated;

pub use console::ConsoleDac;
pub use simulated::SimulatedDac;

/// Build the driver family selected in configuration
pub fn build_driver(name: impl Into<String>, config: &DriverConfig) -> Arc<dyn DeviceDriver> {
    match config {
        DriverConfig::Console => Arc::new(ConsoleDac::new(name)),
        DriverConfig::Simulated { transfer_us } => Arc::new(SimulatedDac::new(
            name,
            Duration::from_micros(*transfer_us),
        )),
    }
}
