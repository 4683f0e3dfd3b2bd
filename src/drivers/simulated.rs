//! Simulated DAC with an asynchronous transfer window
//!
//! Models a DAC fed over a bus: `commit` starts a transfer that stays in
//! flight for `transfer_time`, during which the device reports not ready.
//! `acknowledge` flips the ping-pong buffer indicator the way a double-buffered
//! DMA transmitter would.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use anyhow::Result;
use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::{debug, info, trace};

use crate::drivers::DeviceDriver;
use crate::layout::{DeviceDescriptor, DeviceIndex};
use crate::store::ChannelValue;

pub struct SimulatedDac {
    name: String,
    transfer_time: Duration,
    /// Monotonic base for `busy_until_us`
    start_instant: Instant,
    /// Transfer in flight until this many microseconds after `start_instant`
    busy_until_us: AtomicU64,
    /// Which half of the ping-pong buffer the next frame goes to
    back_buffer: AtomicBool,
    transfers: AtomicU64,
    /// Frame handed over by the last commit
    last_frame: Mutex<Vec<ChannelValue>>,
}

impl SimulatedDac {
    pub fn new(name: impl Into<String>, transfer_time: Duration) -> Self {
        Self {
            name: name.into(),
            transfer_time,
            start_instant: Instant::now(),
            busy_until_us: AtomicU64::new(0),
            back_buffer: AtomicBool::new(false),
            transfers: AtomicU64::new(0),
            last_frame: Mutex::new(Vec::new()),
        }
    }

    fn now_us(&self) -> u64 {
        self.start_instant.elapsed().as_micros() as u64
    }

    /// Whether a transfer is still on the wire
    pub fn in_flight(&self) -> bool {
        self.now_us() < self.busy_until_us.load(Ordering::Acquire)
    }

    /// Completed commit/acknowledge pairs
    pub fn transfers(&self) -> u64 {
        self.transfers.load(Ordering::Relaxed)
    }

    /// Current ping-pong half
    pub fn back_buffer(&self) -> bool {
        self.back_buffer.load(Ordering::Relaxed)
    }

    /// Copy of the frame most recently committed
    pub fn last_frame(&self) -> Vec<ChannelValue> {
        self.last_frame.lock().clone()
    }
}

#[async_trait]
impl DeviceDriver for SimulatedDac {
    fn name(&self) -> &str {
        &self.name
    }

    async fn init(&self, device: &DeviceDescriptor) -> Result<()> {
        info!(
            "🔌 SimulatedDac '{}' ready for device {} ({} channels, {:?} per transfer)",
            self.name, device.index, device.channel_count, self.transfer_time
        );
        self.last_frame.lock().resize(device.channel_count, 0);
        Ok(())
    }

    fn is_ready(&self, _device: DeviceIndex) -> bool {
        !self.in_flight()
    }

    fn commit(&self, device: DeviceIndex, samples: &[ChannelValue]) {
        {
            let mut frame = self.last_frame.lock();
            frame.clear();
            frame.extend_from_slice(samples);
        }
        let until = self.now_us() + self.transfer_time.as_micros() as u64;
        self.busy_until_us.store(until, Ordering::Release);
        trace!(driver = self.name.as_str(), device = device.0, until_us = until, "Transfer started");
    }

    fn acknowledge(&self, device: DeviceIndex) {
        self.back_buffer.fetch_xor(true, Ordering::Relaxed);
        self.transfers.fetch_add(1, Ordering::Relaxed);
        trace!(driver = self.name.as_str(), device = device.0, "Buffers swapped");
    }

    async fn shutdown(&self) -> Result<()> {
        debug!(
            "🛑 SimulatedDac '{}' shutting down after {} transfers",
            self.name,
            self.transfers()
        );
        Ok(())
    }
}
