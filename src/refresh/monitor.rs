//! Refresh monitor - per-device liveness counters readable from any thread
//!
//! The coordinator records every commit and skip here. Observers (status
//! reporter, tests) read last-refresh timestamps to spot devices that stopped
//! answering ready. Nothing in here ever blocks the refresh cycle.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::layout::DeviceIndex;

/// What caused a refresh cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CycleTrigger {
    /// Fixed-period scheduler tick
    Tick,
    /// Forced refresh (liveness bound)
    Heartbeat,
    /// Called directly, outside the scheduler
    Manual,
}

#[derive(Default)]
struct DeviceCounters {
    /// Microseconds since `start_instant` of the last commit, plus one (0 = never)
    last_refresh_us: AtomicU64,
    commits: AtomicU64,
    skips: AtomicU64,
}

/// Point-in-time health of one device
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceHealth {
    pub device: usize,
    pub commits: u64,
    pub skips: u64,
    /// Milliseconds since the last commit, `None` if never refreshed
    pub since_last_refresh_ms: Option<u64>,
}

/// Lock-free counters shared between the refresh task and observers
pub struct RefreshMonitor {
    /// Monotonic start time for relative timestamp calculation
    start_instant: Instant,
    devices: Box<[DeviceCounters]>,
    tick_cycles: AtomicU64,
    heartbeat_cycles: AtomicU64,
    manual_cycles: AtomicU64,
}

impl RefreshMonitor {
    pub fn new(device_count: usize) -> Self {
        Self {
            start_instant: Instant::now(),
            devices: (0..device_count).map(|_| DeviceCounters::default()).collect(),
            tick_cycles: AtomicU64::new(0),
            heartbeat_cycles: AtomicU64::new(0),
            manual_cycles: AtomicU64::new(0),
        }
    }

    fn now_us(&self) -> u64 {
        self.start_instant.elapsed().as_micros() as u64
    }

    pub(crate) fn record_commit(&self, device: DeviceIndex) {
        if let Some(c) = self.devices.get(device.0) {
            c.commits.fetch_add(1, Ordering::Relaxed);
            c.last_refresh_us.store(self.now_us() + 1, Ordering::Relaxed);
        }
    }

    pub(crate) fn record_skip(&self, device: DeviceIndex) {
        if let Some(c) = self.devices.get(device.0) {
            c.skips.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub(crate) fn record_cycle(&self, trigger: CycleTrigger) {
        let counter = match trigger {
            CycleTrigger::Tick => &self.tick_cycles,
            CycleTrigger::Heartbeat => &self.heartbeat_cycles,
            CycleTrigger::Manual => &self.manual_cycles,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn device_count(&self) -> usize {
        self.devices.len()
    }

    /// Number of cycles run for a given trigger
    pub fn cycles(&self, trigger: CycleTrigger) -> u64 {
        match trigger {
            CycleTrigger::Tick => self.tick_cycles.load(Ordering::Relaxed),
            CycleTrigger::Heartbeat => self.heartbeat_cycles.load(Ordering::Relaxed),
            CycleTrigger::Manual => self.manual_cycles.load(Ordering::Relaxed),
        }
    }

    pub fn total_cycles(&self) -> u64 {
        self.cycles(CycleTrigger::Tick)
            + self.cycles(CycleTrigger::Heartbeat)
            + self.cycles(CycleTrigger::Manual)
    }

    pub fn commits(&self, device: DeviceIndex) -> u64 {
        self.devices
            .get(device.0)
            .map(|c| c.commits.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    pub fn skips(&self, device: DeviceIndex) -> u64 {
        self.devices
            .get(device.0)
            .map(|c| c.skips.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    /// Instant of the last commit to `device`
    pub fn last_refresh(&self, device: DeviceIndex) -> Option<Instant> {
        let stamp = self.devices.get(device.0)?.last_refresh_us.load(Ordering::Relaxed);
        if stamp == 0 {
            return None;
        }
        Some(self.start_instant + Duration::from_micros(stamp - 1))
    }

    /// Time elapsed since the last commit to `device`
    pub fn since_last_refresh(&self, device: DeviceIndex) -> Option<Duration> {
        self.last_refresh(device).map(|t| t.elapsed())
    }

    /// Devices not refreshed within `threshold`
    ///
    /// A device that was never refreshed counts as stale once the monitor
    /// itself is older than `threshold`.
    pub fn stale_devices(&self, threshold: Duration) -> Vec<DeviceIndex> {
        let monitor_age = self.start_instant.elapsed();
        (0..self.devices.len())
            .map(DeviceIndex)
            .filter(|&d| match self.since_last_refresh(d) {
                Some(elapsed) => elapsed > threshold,
                None => monitor_age > threshold,
            })
            .collect()
    }

    /// Health snapshot of every device
    pub fn snapshot(&self) -> Vec<DeviceHealth> {
        (0..self.devices.len())
            .map(DeviceIndex)
            .map(|d| DeviceHealth {
                device: d.0,
                commits: self.commits(d),
                skips: self.skips(d),
                since_last_refresh_ms: self
                    .since_last_refresh(d)
                    .map(|e| e.as_millis() as u64),
            })
            .collect()
    }
}
