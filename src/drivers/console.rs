//! Console DAC - logs every committed frame, for running without hardware

use crate::drivers::DeviceDriver;
use crate::layout::{DeviceDescriptor, DeviceIndex};
use crate::store::ChannelValue;
use anyhow::Result;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tracing::{debug, info, trace};

/// ConsoleDac is always ready and logs what it would have sent
///
/// This is useful for:
/// - Checking a device layout without DACs attached
/// - Watching MIDI mappings land on the right channels
pub struct ConsoleDac {
    name: String,
    /// Track if driver is initialized
    initialized: AtomicBool,
    /// Frames committed since init
    commit_count: AtomicU64,
    /// Acknowledgements since init
    ack_count: AtomicU64,
}

impl ConsoleDac {
    /// Create a new ConsoleDac with a given name
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            initialized: AtomicBool::new(false),
            commit_count: AtomicU64::new(0),
            ack_count: AtomicU64::new(0),
        }
    }

    pub fn commit_count(&self) -> u64 {
        self.commit_count.load(Ordering::Relaxed)
    }

    pub fn ack_count(&self) -> u64 {
        self.ack_count.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl DeviceDriver for ConsoleDac {
    fn name(&self) -> &str {
        &self.name
    }

    async fn init(&self, device: &DeviceDescriptor) -> Result<()> {
        info!(
            "🔌 ConsoleDac '{}' initializing for device {} (channels {:?})",
            self.name,
            device.index,
            device.range()
        );
        self.initialized.store(true, Ordering::Relaxed);
        self.commit_count.store(0, Ordering::Relaxed);
        self.ack_count.store(0, Ordering::Relaxed);
        Ok(())
    }

    fn is_ready(&self, _device: DeviceIndex) -> bool {
        true
    }

    fn commit(&self, device: DeviceIndex, samples: &[ChannelValue]) {
        let n = self.commit_count.fetch_add(1, Ordering::Relaxed) + 1;
        debug!(
            "🎛️ [{}] ConsoleDac '{}' device {} ← {:?} [frame #{}]",
            chrono::Local::now().format("%H:%M:%S%.3f"),
            self.name,
            device,
            samples,
            n
        );
    }

    fn acknowledge(&self, device: DeviceIndex) {
        self.ack_count.fetch_add(1, Ordering::Relaxed);
        trace!(driver = self.name.as_str(), device = device.0, "ConsoleDac acknowledged");
    }

    async fn shutdown(&self) -> Result<()> {
        if self.initialized.swap(false, Ordering::Relaxed) {
            info!(
                "🛑 ConsoleDac '{}' shutting down (committed {} frames)",
                self.name,
                self.commit_count()
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_console_dac_lifecycle() {
        let dac = ConsoleDac::new("test");
        let device = DeviceDescriptor::new(0, 0, 4);

        assert_eq!(dac.name(), "test");
        assert!(!dac.initialized.load(Ordering::Relaxed));

        dac.init(&device).await.unwrap();
        assert!(dac.initialized.load(Ordering::Relaxed));

        assert!(dac.is_ready(device.index));
        dac.commit(device.index, &[1, 2, 3, 4]);
        dac.acknowledge(device.index);
        dac.commit(device.index, &[5, 6, 7, 8]);
        dac.acknowledge(device.index);

        assert_eq!(dac.commit_count(), 2);
        assert_eq!(dac.ack_count(), 2);

        dac.shutdown().await.unwrap();
        assert!(!dac.initialized.load(Ordering::Relaxed));
    }

    #[tokio::test]
    async fn test_init_resets_counters() {
        let dac = ConsoleDac::new("reset");
        dac.commit(DeviceIndex(0), &[0]);
        assert_eq!(dac.commit_count(), 1);

        dac.init(&DeviceDescriptor::new(0, 0, 1)).await.unwrap();
        assert_eq!(dac.commit_count(), 0);
    }
}
