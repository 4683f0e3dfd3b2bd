//! ChannelStore - dual input/output buffer of channel values
//!
//! The producer writes the input array one channel at a time. The refresh
//! coordinator copies device-sized slices from input to output. Every channel
//! is a single `AtomicU16`, so a value can never be torn; channels of the same
//! device may reflect different instants, which is acceptable for independent
//! output lines.

use std::sync::atomic::{AtomicU16, Ordering};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ConfigError, Result};

/// One sample for one output line
pub type ChannelValue = u16;

/// Inclusive range of valid channel values
///
/// Always holds `min <= max`; deserialization goes through [`ValueRange::new`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RangeBounds")]
pub struct ValueRange {
    min: ChannelValue,
    max: ChannelValue,
}

#[derive(Deserialize)]
struct RangeBounds {
    min: ChannelValue,
    max: ChannelValue,
}

impl TryFrom<RangeBounds> for ValueRange {
    type Error = ConfigError;

    fn try_from(bounds: RangeBounds) -> Result<Self> {
        Self::new(bounds.min, bounds.max)
    }
}

impl ValueRange {
    /// Full 16-bit range
    pub const FULL: ValueRange = ValueRange {
        min: 0,
        max: u16::MAX,
    };

    pub fn new(min: ChannelValue, max: ChannelValue) -> Result<Self> {
        if min > max {
            return Err(ConfigError::InvalidValueRange { min, max });
        }
        Ok(Self { min, max })
    }

    pub fn min(&self) -> ChannelValue {
        self.min
    }

    pub fn max(&self) -> ChannelValue {
        self.max
    }

    pub fn clamp(&self, value: ChannelValue) -> ChannelValue {
        value.clamp(self.min, self.max)
    }

    /// Midpoint of the range
    pub fn mid_scale(&self) -> ChannelValue {
        self.min + (self.max - self.min) / 2
    }

    /// Width of the range (max - min)
    pub fn span(&self) -> u32 {
        u32::from(self.max - self.min)
    }
}

impl Default for ValueRange {
    fn default() -> Self {
        Self::FULL
    }
}

/// Input/output channel arrays
///
/// Shared as `Arc<ChannelStore>` between the producer and the refresh task.
pub struct ChannelStore {
    input: Box<[AtomicU16]>,
    output: Box<[AtomicU16]>,
    range: ValueRange,
}

impl ChannelStore {
    /// Create a store of `len` channels, both arrays set to `neutral` (clamped)
    pub fn new(len: usize, range: ValueRange, neutral: ChannelValue) -> Self {
        let neutral = range.clamp(neutral);
        let make = || {
            (0..len)
                .map(|_| AtomicU16::new(neutral))
                .collect::<Vec<_>>()
                .into_boxed_slice()
        };
        Self {
            input: make(),
            output: make(),
            range,
        }
    }

    pub fn len(&self) -> usize {
        self.input.len()
    }

    pub fn is_empty(&self) -> bool {
        self.input.is_empty()
    }

    pub fn range(&self) -> ValueRange {
        self.range
    }

    /// Producer entry point: store a new commanded level
    ///
    /// Out-of-range values are clamped. An unknown channel index is dropped.
    /// Safe to call concurrently with a refresh cycle; last write wins.
    pub fn set_channel_value(&self, index: usize, value: ChannelValue) {
        match self.input.get(index) {
            Some(slot) => slot.store(self.range.clamp(value), Ordering::Relaxed),
            None => debug!(
                "Dropping write to channel {} (store has {} channels)",
                index,
                self.len()
            ),
        }
    }

    /// Current desired value of one channel
    pub fn input_value(&self, index: usize) -> Option<ChannelValue> {
        self.input.get(index).map(|v| v.load(Ordering::Relaxed))
    }

    /// Last value handed to hardware for one channel
    pub fn output_value(&self, index: usize) -> Option<ChannelValue> {
        self.output.get(index).map(|v| v.load(Ordering::Relaxed))
    }

    /// Snapshot of `length` input values starting at `offset`
    ///
    /// Panics if the range is outside the store.
    pub fn get_input_slice(&self, offset: usize, length: usize) -> Vec<ChannelValue> {
        Self::load_all(&self.input[offset..offset + length])
    }

    /// Snapshot of `length` output values starting at `offset`
    ///
    /// Panics if the range is outside the store.
    pub fn get_output_slice(&self, offset: usize, length: usize) -> Vec<ChannelValue> {
        Self::load_all(&self.output[offset..offset + length])
    }

    /// Read an output slice into `buf` without allocating
    pub fn read_output_into(&self, offset: usize, length: usize, buf: &mut Vec<ChannelValue>) {
        buf.clear();
        buf.extend(
            self.output[offset..offset + length]
                .iter()
                .map(|v| v.load(Ordering::Relaxed)),
        );
    }

    /// Copy `length` values at `offset` from input to output
    ///
    /// Only the refresh coordinator calls this, and only on the owning
    /// device's range, which the layout guarantees is inside the store.
    pub(crate) fn copy_slice_to_output(&self, offset: usize, length: usize) {
        let src = &self.input[offset..offset + length];
        let dst = &self.output[offset..offset + length];
        for (s, d) in src.iter().zip(dst) {
            d.store(s.load(Ordering::Relaxed), Ordering::Relaxed);
        }
    }

    fn load_all(slots: &[AtomicU16]) -> Vec<ChannelValue> {
        slots.iter().map(|v| v.load(Ordering::Relaxed)).collect()
    }
}
