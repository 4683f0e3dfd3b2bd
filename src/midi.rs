//! MIDI message parsing and value conversion
//!
//! Only the channel voice messages that can drive an output level are
//! decoded; everything else parses to [`MidiMessage::Other`].

use std::fmt;

use crate::store::{ChannelValue, ValueRange};

/// MIDI message types
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MidiMessage {
    /// Control Change: channel (0-15), cc (0-127), value (0-127)
    ControlChange { channel: u8, cc: u8, value: u8 },

    /// Pitch Bend: channel (0-15), value (0-16383, 14-bit)
    PitchBend { channel: u8, value: u16 },

    /// Any other well-formed message (status byte kept for logging)
    Other { status: u8 },
}

impl MidiMessage {
    /// Parse a MIDI message from raw bytes
    pub fn parse(data: &[u8]) -> Option<Self> {
        let (&status, rest) = data.split_first()?;

        // Running status (data byte first) is not tracked
        if status < 0x80 {
            return None;
        }

        if status >= 0xF0 {
            return Some(MidiMessage::Other { status });
        }

        let channel = status & 0x0F;
        let data1 = rest.first().map(|b| b & 0x7F);
        let data2 = rest.get(1).map(|b| b & 0x7F);

        match status & 0xF0 {
            0xB0 => Some(MidiMessage::ControlChange {
                channel,
                cc: data1?,
                value: data2?,
            }),
            0xE0 => {
                let lsb = data1? as u16;
                let msb = data2? as u16;
                Some(MidiMessage::PitchBend {
                    channel,
                    value: (msb << 7) | lsb,
                })
            }
            _ => Some(MidiMessage::Other { status }),
        }
    }
}

impl fmt::Display for MidiMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            MidiMessage::ControlChange { channel, cc, value } => {
                write!(f, "CC ch:{} cc:{} v:{}", channel + 1, cc, value)
            }
            MidiMessage::PitchBend { channel, value } => {
                write!(f, "PitchBend ch:{} v:{}", channel + 1, value)
            }
            MidiMessage::Other { status } => write!(f, "Other {:02X}", status),
        }
    }
}

/// Expansion of MIDI controller values onto a channel value range
pub mod convert {
    use super::{ChannelValue, ValueRange};

    /// Map a 7-bit value (0-127) linearly onto `range`
    pub fn from_7bit(value: u8, range: ValueRange) -> ChannelValue {
        scale(u32::from(value.min(127)), 127, range)
    }

    /// Map a 14-bit value (0-16383) linearly onto `range`
    pub fn from_14bit(value: u16, range: ValueRange) -> ChannelValue {
        scale(u32::from(value.min(16383)), 16383, range)
    }

    fn scale(value: u32, full_scale: u32, range: ValueRange) -> ChannelValue {
        // Round to nearest so both ends land exactly on min and max
        let offset = (value * range.span() + full_scale / 2) / full_scale;
        range.min() + offset as ChannelValue
    }
}

/// Format MIDI bytes as hex string for debugging
pub fn format_hex(data: &[u8]) -> String {
    data.iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(" ")
}
