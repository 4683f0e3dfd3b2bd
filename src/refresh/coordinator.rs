//! Refresh coordinator - one ready/copy/commit/acknowledge pass over all devices

use std::sync::Arc;

use anyhow::Result;
use tracing::{debug, trace, warn};

use super::monitor::{CycleTrigger, RefreshMonitor};
use crate::drivers::DeviceDriver;
use crate::error::ConfigError;
use crate::layout::{DeviceDescriptor, DeviceLayout};
use crate::store::{ChannelStore, ChannelValue};

/// Outcome of one refresh cycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Devices that were ready and received a new frame
    pub committed: usize,
    /// Devices that reported not ready and were left untouched
    pub skipped: usize,
}

struct DeviceSlot {
    descriptor: DeviceDescriptor,
    driver: Arc<dyn DeviceDriver>,
}

/// Drives every registered device from the channel store
///
/// Owned by exactly one refresh context; `run_cycle` takes `&mut self` so
/// the output array has a single writer.
pub struct RefreshCoordinator {
    store: Arc<ChannelStore>,
    devices: Vec<DeviceSlot>,
    monitor: Arc<RefreshMonitor>,
    /// Reused frame buffer, sized to the largest device
    frame: Vec<ChannelValue>,
}

impl RefreshCoordinator {
    /// Pair each layout entry with its driver, in registration order
    ///
    /// Fails if the driver count doesn't match the layout or the store isn't
    /// exactly as large as the layout's channel space.
    pub fn new(
        store: Arc<ChannelStore>,
        layout: &DeviceLayout,
        drivers: Vec<Arc<dyn DeviceDriver>>,
    ) -> std::result::Result<Self, ConfigError> {
        if drivers.len() != layout.len() {
            return Err(ConfigError::DriverCountMismatch {
                drivers: drivers.len(),
                devices: layout.len(),
            });
        }
        if store.len() != layout.total_channels() {
            return Err(ConfigError::StoreSizeMismatch {
                store: store.len(),
                layout: layout.total_channels(),
            });
        }

        let devices = layout
            .devices()
            .iter()
            .zip(drivers)
            .map(|(descriptor, driver)| DeviceSlot {
                descriptor: *descriptor,
                driver,
            })
            .collect();

        Ok(Self {
            store,
            devices,
            monitor: Arc::new(RefreshMonitor::new(layout.len())),
            frame: Vec::with_capacity(layout.max_device_channels()),
        })
    }

    /// Initialize every driver, in registration order
    ///
    /// On failure the drivers already initialized are shut down again before
    /// the error is returned.
    pub async fn init_drivers(&self) -> Result<()> {
        for (position, slot) in self.devices.iter().enumerate() {
            if let Err(e) = slot.driver.init(&slot.descriptor).await {
                let err = e.context(format!(
                    "Failed to initialize driver '{}' for device {}",
                    slot.driver.name(),
                    slot.descriptor.index
                ));
                if let Err(rollback) = Self::shutdown_slots(&self.devices[..position]).await {
                    warn!("Rollback after failed init: {:#}", rollback);
                }
                return Err(err);
            }
            debug!(
                "Device {} → driver '{}' (channels {:?})",
                slot.descriptor.index,
                slot.driver.name(),
                slot.descriptor.range()
            );
        }
        Ok(())
    }

    /// Shut every driver down, collecting failures instead of stopping early
    pub async fn shutdown_drivers(&self) -> Result<()> {
        Self::shutdown_slots(&self.devices).await
    }

    async fn shutdown_slots(slots: &[DeviceSlot]) -> Result<()> {
        let mut errors = Vec::new();
        for slot in slots {
            if let Err(e) = slot.driver.shutdown().await {
                warn!("Failed to shutdown driver '{}': {}", slot.driver.name(), e);
                errors.push(format!("{}: {}", slot.driver.name(), e));
            }
        }
        if !errors.is_empty() {
            anyhow::bail!(
                "Failed to shutdown {} driver(s): {}",
                errors.len(),
                errors.join(", ")
            );
        }
        Ok(())
    }

    pub fn store(&self) -> &Arc<ChannelStore> {
        &self.store
    }

    pub fn monitor(&self) -> Arc<RefreshMonitor> {
        self.monitor.clone()
    }

    pub fn device_count(&self) -> usize {
        self.devices.len()
    }

    /// Run one refresh cycle outside the scheduler
    pub fn run_cycle(&mut self) -> CycleReport {
        self.run_cycle_with(CycleTrigger::Manual)
    }

    /// Run one refresh cycle, recording what triggered it
    pub fn run_cycle_with(&mut self, trigger: CycleTrigger) -> CycleReport {
        let mut report = CycleReport::default();

        for slot in &self.devices {
            let d = slot.descriptor;

            if !slot.driver.is_ready(d.index) {
                self.monitor.record_skip(d.index);
                report.skipped += 1;
                continue;
            }

            self.store.copy_slice_to_output(d.offset, d.channel_count);
            self.store
                .read_output_into(d.offset, d.channel_count, &mut self.frame);

            slot.driver.commit(d.index, &self.frame);
            slot.driver.acknowledge(d.index);

            self.monitor.record_commit(d.index);
            report.committed += 1;
        }

        self.monitor.record_cycle(trigger);
        trace!(
            ?trigger,
            committed = report.committed,
            skipped = report.skipped,
            "Refresh cycle"
        );
        report
    }
}
