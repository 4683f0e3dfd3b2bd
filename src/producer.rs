//! MIDI producer - turns incoming controller messages into channel writes
//!
//! The midir callback runs on its own OS thread and writes straight into the
//! channel store. It never waits on the refresh task.

use anyhow::{anyhow, Context, Result};
use midir::{MidiInput, MidiInputConnection, MidiInputPort};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, trace};

use crate::config::{MidiConfig, MidiMapping, MidiType};
use crate::midi::{convert, format_hex, MidiMessage};
use crate::store::ChannelStore;

/// Lookup key: (type, MIDI channel 0-15, controller number)
type MappingKey = (MidiType, u8, Option<u8>);

/// Routes MIDI controllers onto channel indices of a store
pub struct MidiMapper {
    store: Arc<ChannelStore>,
    routes: HashMap<MappingKey, usize>,
}

impl MidiMapper {
    /// Build from configured mappings (MIDI channels given as 1-16)
    pub fn new(store: Arc<ChannelStore>, mappings: &[MidiMapping]) -> Self {
        let routes = mappings
            .iter()
            .map(|m| {
                let cc = match m.midi_type {
                    MidiType::Cc => m.cc,
                    MidiType::Pb => None,
                };
                ((m.midi_type, m.channel.saturating_sub(1), cc), m.output)
            })
            .collect();
        Self { store, routes }
    }

    pub fn route_count(&self) -> usize {
        self.routes.len()
    }

    /// Apply one raw MIDI message; returns the channel written, if any
    pub fn handle_raw(&self, data: &[u8]) -> Option<usize> {
        let message = MidiMessage::parse(data)?;
        let (key, value) = match message {
            MidiMessage::ControlChange { channel, cc, value } => (
                (MidiType::Cc, channel, Some(cc)),
                convert::from_7bit(value, self.store.range()),
            ),
            MidiMessage::PitchBend { channel, value } => (
                (MidiType::Pb, channel, None),
                convert::from_14bit(value, self.store.range()),
            ),
            _ => return None,
        };

        let output = *self.routes.get(&key)?;
        self.store.set_channel_value(output, value);
        trace!("{} → channel {} = {}", message, output, value);
        Some(output)
    }
}

/// List available MIDI input ports
pub fn list_input_ports() -> Result<Vec<String>> {
    let midi_in = MidiInput::new("CV-GW-Scanner")?;

    let mut port_names = Vec::new();
    for port in midi_in.ports() {
        if let Ok(name) = midi_in.port_name(&port) {
            port_names.push(name);
        }
    }

    Ok(port_names)
}

/// Find an input port by substring match (case-insensitive)
fn find_input_port(midi_in: &MidiInput, pattern: &str) -> Option<(MidiInputPort, String)> {
    let pattern = pattern.to_lowercase();
    midi_in.ports().into_iter().find_map(|port| {
        let name = midi_in.port_name(&port).ok()?;
        if name.to_lowercase().contains(&pattern) {
            debug!("Found port '{}' matching pattern '{}'", name, pattern);
            Some((port, name))
        } else {
            None
        }
    })
}

/// Open the configured MIDI input and feed it through a mapper
///
/// The connection stays open until the returned handle is dropped.
pub fn connect_input(config: &MidiConfig, mapper: MidiMapper) -> Result<MidiInputConnection<()>> {
    let mut midi_in = MidiInput::new("CV-GW-In").context("Failed to create MIDI input")?;
    midi_in.ignore(midir::Ignore::All);

    let (port, name) = find_input_port(&midi_in, &config.input_port)
        .ok_or_else(|| anyhow!("MIDI input port '{}' not found", config.input_port))?;

    info!(
        "🎹 Connecting MIDI input '{}' ({} mappings)",
        name,
        mapper.route_count()
    );

    let connection = midi_in
        .connect(
            &port,
            "cv-gw-in",
            move |_stamp, data, _| {
                if mapper.handle_raw(data).is_none() {
                    trace!("Unmapped MIDI: {}", format_hex(data));
                }
            },
            (),
        )
        .map_err(|e| anyhow!("Failed to connect MIDI input '{}': {}", name, e))?;

    Ok(connection)
}
