//! Device layout - which device owns which contiguous channel range
//!
//! Each device carries its own offset and channel count as one pair. Nothing
//! here derives an offset from a global stride: a device's slot in the channel
//! space is exactly `[offset, offset + channel_count)`.

use std::fmt;
use std::ops::Range;

use crate::error::{ConfigError, Result};

/// Default upper bound on channels owned by one device
pub const DEFAULT_MAX_CHANNELS_PER_DEVICE: usize = 32;

/// Stable zero-based device identifier (registration order)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct DeviceIndex(pub usize);

impl fmt::Display for DeviceIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Immutable description of one physical output device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceDescriptor {
    pub index: DeviceIndex,
    pub offset: usize,
    pub channel_count: usize,
}

impl DeviceDescriptor {
    pub fn new(index: usize, offset: usize, channel_count: usize) -> Self {
        Self {
            index: DeviceIndex(index),
            offset,
            channel_count,
        }
    }

    /// Channel range owned by this device
    pub fn range(&self) -> Range<usize> {
        self.offset..self.end()
    }

    /// One past the last owned channel
    ///
    /// Saturates for descriptors that never passed layout validation.
    pub fn end(&self) -> usize {
        self.offset.saturating_add(self.channel_count)
    }

    /// Whether `channel` belongs to this device
    pub fn owns(&self, channel: usize) -> bool {
        self.range().contains(&channel)
    }
}

/// Validated set of device descriptors, in registration order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceLayout {
    devices: Vec<DeviceDescriptor>,
    total_channels: usize,
}

impl DeviceLayout {
    /// Validate explicit descriptors
    ///
    /// Rejects empty layouts, zero or excessive channel counts, indices that
    /// don't match registration order, overlapping ranges, and any hole in
    /// `[0, total)` where total is the sum of all channel counts.
    pub fn new(devices: Vec<DeviceDescriptor>, max_channels_per_device: usize) -> Result<Self> {
        if devices.is_empty() {
            return Err(ConfigError::NoDevices);
        }

        for (position, device) in devices.iter().enumerate() {
            if device.index.0 != position {
                return Err(ConfigError::IndexMismatch {
                    position,
                    index: device.index,
                });
            }
            if device.channel_count == 0 {
                return Err(ConfigError::ZeroChannels {
                    device: device.index,
                });
            }
            if device.channel_count > max_channels_per_device {
                return Err(ConfigError::TooManyChannels {
                    device: device.index,
                    count: device.channel_count,
                    max: max_channels_per_device,
                });
            }
            if device.offset.checked_add(device.channel_count).is_none() {
                return Err(ConfigError::OffsetOverflow {
                    device: device.index,
                    offset: device.offset,
                    channels: device.channel_count,
                });
            }
        }

        let total_channels = devices
            .iter()
            .try_fold(0usize, |total, d| {
                total
                    .checked_add(d.channel_count)
                    .ok_or(ConfigError::OffsetOverflow {
                        device: d.index,
                        offset: total,
                        channels: d.channel_count,
                    })
            })?;

        // Sorting by offset makes both overlap and gap checks a neighbour walk
        let mut by_offset: Vec<&DeviceDescriptor> = devices.iter().collect();
        by_offset.sort_by_key(|d| (d.offset, d.index));

        for pair in by_offset.windows(2) {
            let (a, b) = (pair[0], pair[1]);
            if b.offset < a.end() {
                return Err(ConfigError::Overlap {
                    first: a.index,
                    first_start: a.offset,
                    first_end: a.end(),
                    second: b.index,
                    second_start: b.offset,
                    second_end: b.end(),
                });
            }
        }

        for device in &by_offset {
            if device.end() > total_channels {
                return Err(ConfigError::OutOfRange {
                    device: device.index,
                    start: device.offset,
                    end: device.end(),
                    total: total_channels,
                });
            }
        }

        // No overlap and everything inside [0, total) with lengths summing to
        // total: any remaining hole is a gap
        let mut cursor = 0;
        for device in &by_offset {
            if device.offset > cursor {
                return Err(ConfigError::Gap {
                    start: cursor,
                    end: device.offset,
                });
            }
            cursor = device.end();
        }

        Ok(Self {
            devices,
            total_channels,
        })
    }

    /// Pack devices back to back, each offset being the previous device's end
    pub fn contiguous(channel_counts: &[usize], max_channels_per_device: usize) -> Result<Self> {
        let mut offset = 0;
        let devices = channel_counts
            .iter()
            .enumerate()
            .map(|(index, &count)| {
                let device = DeviceDescriptor::new(index, offset, count);
                offset = device.end();
                device
            })
            .collect();
        Self::new(devices, max_channels_per_device)
    }

    pub fn devices(&self) -> &[DeviceDescriptor] {
        &self.devices
    }

    pub fn get(&self, index: DeviceIndex) -> Option<&DeviceDescriptor> {
        self.devices.get(index.0)
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    pub fn total_channels(&self) -> usize {
        self.total_channels
    }

    /// Largest channel count of any single device
    pub fn max_device_channels(&self) -> usize {
        self.devices
            .iter()
            .map(|d| d.channel_count)
            .max()
            .unwrap_or(0)
    }

    /// Device owning `channel`, if any
    pub fn owner_of(&self, channel: usize) -> Option<&DeviceDescriptor> {
        self.devices.iter().find(|d| d.owns(channel))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const MAX: usize = DEFAULT_MAX_CHANNELS_PER_DEVICE;

    #[test]
    fn test_contiguous_layout() {
        let layout = DeviceLayout::contiguous(&[4, 4], MAX).unwrap();
        assert_eq!(layout.len(), 2);
        assert_eq!(layout.total_channels(), 8);
        assert_eq!(layout.devices()[0].range(), 0..4);
        assert_eq!(layout.devices()[1].range(), 4..8);
    }

    #[test]
    fn test_heterogeneous_counts_use_own_length_as_stride() {
        let layout = DeviceLayout::contiguous(&[8, 2, 4], MAX).unwrap();
        assert_eq!(layout.devices()[1].range(), 8..10);
        assert_eq!(layout.devices()[2].range(), 10..14);
        assert_eq!(layout.total_channels(), 14);
        assert_eq!(layout.max_device_channels(), 8);
    }

    #[test]
    fn test_out_of_order_offsets_accepted() {
        let layout = DeviceLayout::new(
            vec![DeviceDescriptor::new(0, 4, 4), DeviceDescriptor::new(1, 0, 4)],
            MAX,
        )
        .unwrap();
        assert_eq!(layout.owner_of(1).unwrap().index, DeviceIndex(1));
        assert_eq!(layout.owner_of(6).unwrap().index, DeviceIndex(0));
        assert!(layout.owner_of(8).is_none());
    }

    #[test]
    fn test_overlap_rejected() {
        let err = DeviceLayout::new(
            vec![DeviceDescriptor::new(0, 0, 4), DeviceDescriptor::new(1, 3, 5)],
            MAX,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Overlap { .. }));
    }

    #[test]
    fn test_offset_overflow_rejected() {
        let err = DeviceLayout::new(
            vec![
                DeviceDescriptor::new(0, 0, 4),
                DeviceDescriptor::new(1, usize::MAX, 4),
            ],
            MAX,
        )
        .unwrap_err();
        assert_eq!(
            err,
            ConfigError::OffsetOverflow {
                device: DeviceIndex(1),
                offset: usize::MAX,
                channels: 4,
            }
        );

        // Channel counts whose sum wraps
        let err = DeviceLayout::new(
            vec![
                DeviceDescriptor::new(0, 0, usize::MAX),
                DeviceDescriptor::new(1, 0, 4),
            ],
            usize::MAX,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::OffsetOverflow { .. }));
    }

    #[test]
    fn test_gap_rejected() {
        // Two 4-channel devices addressed with an 8-channel stride
        let err = DeviceLayout::new(
            vec![DeviceDescriptor::new(0, 0, 4), DeviceDescriptor::new(1, 8, 4)],
            MAX,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::OutOfRange { .. } | ConfigError::Gap { .. }
        ));
    }

    #[test]
    fn test_leading_gap_rejected() {
        let err = DeviceLayout::new(vec![DeviceDescriptor::new(0, 2, 4)], MAX).unwrap_err();
        assert!(matches!(err, ConfigError::OutOfRange { .. }));
    }

    #[test]
    fn test_zero_and_excessive_channels_rejected() {
        assert_eq!(
            DeviceLayout::contiguous(&[4, 0], MAX).unwrap_err(),
            ConfigError::ZeroChannels {
                device: DeviceIndex(1)
            }
        );
        assert!(matches!(
            DeviceLayout::contiguous(&[MAX + 1], MAX).unwrap_err(),
            ConfigError::TooManyChannels { count, .. } if count == MAX + 1
        ));
    }

    #[test]
    fn test_empty_and_bad_index_rejected() {
        assert_eq!(
            DeviceLayout::new(vec![], MAX).unwrap_err(),
            ConfigError::NoDevices
        );
        let err = DeviceLayout::new(vec![DeviceDescriptor::new(3, 0, 4)], MAX).unwrap_err();
        assert!(matches!(err, ConfigError::IndexMismatch { position: 0, .. }));
    }

    proptest! {
        #[test]
        fn prop_any_two_overlapping_devices_rejected(
            len_a in 1usize..16,
            len_b in 1usize..16,
            shift in 0usize..16,
        ) {
            // Device b starts somewhere inside device a
            let start_b = shift % len_a;
            let result = DeviceLayout::new(
                vec![
                    DeviceDescriptor::new(0, 0, len_a),
                    DeviceDescriptor::new(1, start_b, len_b),
                ],
                MAX,
            );
            prop_assert!(result.is_err());
        }

        #[test]
        fn prop_contiguous_layouts_cover_every_channel_once(
            counts in proptest::collection::vec(1usize..=MAX, 1..8),
        ) {
            let layout = DeviceLayout::contiguous(&counts, MAX).unwrap();
            for channel in 0..layout.total_channels() {
                let owners = layout.devices().iter().filter(|d| d.owns(channel)).count();
                prop_assert_eq!(owners, 1);
            }
        }
    }
}
