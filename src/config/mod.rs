//! Configuration management for CV GW
//!
//! Loads and validates the YAML configuration. Everything here is read once
//! at startup; the refresh core never sees a config change at runtime.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;
use tokio::fs;

use crate::error::ConfigError;
use crate::layout::{DeviceDescriptor, DeviceLayout, DEFAULT_MAX_CHANNELS_PER_DEVICE};
use crate::refresh::RefreshScheduler;
use crate::store::{ChannelValue, ValueRange};

/// Root configuration structure
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub values: ValuesConfig,
    #[serde(default)]
    pub refresh: RefreshConfig,
    #[serde(default = "default_max_channels")]
    pub max_channels_per_device: usize,
    pub devices: Vec<DeviceConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub midi: Option<MidiConfig>,
}

/// Channel value range and power-on level
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ValuesConfig {
    #[serde(default)]
    pub min: ChannelValue,
    #[serde(default = "default_max_value")]
    pub max: ChannelValue,
    /// Level every channel starts at (clamped into range)
    #[serde(default)]
    pub neutral: ChannelValue,
}

/// Refresh timing
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RefreshConfig {
    /// Fixed tick period in microseconds; omit to run on heartbeats only
    #[serde(default = "default_period_us")]
    pub period_us: Option<u64>,
    /// Maximum time between two refresh cycles
    #[serde(default = "default_forced_refresh_ms")]
    pub forced_refresh_ms: u64,
    /// How often the status reporter runs
    #[serde(default = "default_status_interval_ms")]
    pub status_interval_ms: u64,
    /// A device not refreshed for this long is reported stale
    #[serde(default = "default_stale_after_ms")]
    pub stale_after_ms: u64,
}

/// One physical output device
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DeviceConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub channels: usize,
    /// First channel owned; defaults to the end of the previous device
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offset: Option<usize>,
    #[serde(default)]
    pub driver: DriverConfig,
}

/// DAC driver family
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum DriverConfig {
    /// Logs frames, always ready
    #[default]
    Console,
    /// Models a bus transfer lasting `transfer_us`
    Simulated {
        #[serde(default = "default_transfer_us")]
        transfer_us: u64,
    },
}

/// MIDI input configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MidiConfig {
    pub input_port: String,
    #[serde(default)]
    pub mappings: Vec<MidiMapping>,
}

/// Routes one MIDI controller to one output channel
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct MidiMapping {
    #[serde(rename = "type")]
    pub midi_type: MidiType,
    /// MIDI channel (1-16)
    pub channel: u8,
    /// Controller number, required for `cc`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cc: Option<u8>,
    /// Output channel index
    pub output: usize,
}

/// MIDI message type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MidiType {
    Cc,
    Pb,
}

impl DeviceConfig {
    /// Name used in logs ("dac0" when unnamed)
    pub fn display_name(&self, index: usize) -> String {
        self.name.clone().unwrap_or_else(|| format!("dac{}", index))
    }
}

impl AppConfig {
    /// Load configuration from file with validation
    pub async fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config file: {}", path))?;

        let config = Self::from_yaml(&contents)
            .with_context(|| format!("Invalid config file: {}", path))?;

        Ok(config)
    }

    /// Parse and validate YAML text
    pub fn from_yaml(contents: &str) -> Result<Self> {
        let config: AppConfig =
            serde_yaml::from_str(contents).context("Failed to parse YAML config")?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration for correctness and consistency
    pub fn validate(&self) -> Result<()> {
        self.value_range()?;
        self.scheduler()?;

        if self.refresh.status_interval_ms == 0 {
            anyhow::bail!("refresh.status_interval_ms must be non-zero");
        }

        let layout = self.layout().context("Invalid device layout")?;

        if let Some(midi) = &self.midi {
            if midi.input_port.is_empty() {
                anyhow::bail!("MIDI input_port cannot be empty");
            }

            let mut seen = HashSet::new();
            for (idx, mapping) in midi.mappings.iter().enumerate() {
                self.validate_mapping(mapping, layout.total_channels())
                    .with_context(|| format!("Invalid MIDI mapping #{}", idx))?;
                if !seen.insert((mapping.midi_type, mapping.channel, mapping.cc)) {
                    anyhow::bail!(
                        "MIDI mapping #{} duplicates an earlier {:?} mapping on channel {}",
                        idx,
                        mapping.midi_type,
                        mapping.channel
                    );
                }
            }
        }

        Ok(())
    }

    fn validate_mapping(&self, mapping: &MidiMapping, total_channels: usize) -> Result<()> {
        // Validate channel range (1-16 for MIDI, but 0-15 internally)
        if mapping.channel == 0 || mapping.channel > 16 {
            anyhow::bail!(
                "invalid MIDI channel {} (must be 1-16)",
                mapping.channel
            );
        }

        match mapping.midi_type {
            MidiType::Cc => match mapping.cc {
                None => anyhow::bail!("CC type requires 'cc' field"),
                Some(cc) if cc > 127 => {
                    anyhow::bail!("invalid CC number {} (must be 0-127)", cc)
                }
                Some(_) => {}
            },
            MidiType::Pb => {
                if mapping.cc.is_some() {
                    anyhow::bail!("PitchBend type does not take a 'cc' field");
                }
            }
        }

        if mapping.output >= total_channels {
            anyhow::bail!(
                "output channel {} does not exist ({} channels configured)",
                mapping.output,
                total_channels
            );
        }

        Ok(())
    }

    /// Resolve offsets and validate the device layout
    ///
    /// A device without an explicit offset starts where the previous device
    /// ends (previous offset plus that device's own channel count).
    pub fn layout(&self) -> std::result::Result<DeviceLayout, ConfigError> {
        let mut next_offset = 0;
        let descriptors = self
            .devices
            .iter()
            .enumerate()
            .map(|(index, device)| {
                let descriptor = DeviceDescriptor::new(
                    index,
                    device.offset.unwrap_or(next_offset),
                    device.channels,
                );
                // Saturated ends are rejected by DeviceLayout::new
                next_offset = descriptor.end();
                descriptor
            })
            .collect();
        DeviceLayout::new(descriptors, self.max_channels_per_device)
    }

    pub fn value_range(&self) -> std::result::Result<ValueRange, ConfigError> {
        ValueRange::new(self.values.min, self.values.max)
    }

    pub fn scheduler(&self) -> std::result::Result<RefreshScheduler, ConfigError> {
        RefreshScheduler::new(
            self.refresh.period_us.map(Duration::from_micros),
            Duration::from_millis(self.refresh.forced_refresh_ms),
        )
    }
}

impl Default for ValuesConfig {
    fn default() -> Self {
        Self {
            min: 0,
            max: default_max_value(),
            neutral: 0,
        }
    }
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            period_us: default_period_us(),
            forced_refresh_ms: default_forced_refresh_ms(),
            status_interval_ms: default_status_interval_ms(),
            stale_after_ms: default_stale_after_ms(),
        }
    }
}

// Default value functions
fn default_max_channels() -> usize { DEFAULT_MAX_CHANNELS_PER_DEVICE }
fn default_max_value() -> ChannelValue { ChannelValue::MAX }
fn default_period_us() -> Option<u64> { Some(10) }
fn default_forced_refresh_ms() -> u64 { 100 }
fn default_status_interval_ms() -> u64 { 1000 }
fn default_stale_after_ms() -> u64 { 1000 }
fn default_transfer_us() -> u64 { 40 }

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    const TWO_DACS: &str = r#"
devices:
  - name: dac-a
    channels: 4
    driver: { kind: simulated, transfer_us: 25 }
  - name: dac-b
    channels: 4
"#;

    #[test]
    fn test_defaults() {
        let config = AppConfig::from_yaml(TWO_DACS).unwrap();

        assert_eq!(config.values.min, 0);
        assert_eq!(config.values.max, 65535);
        assert_eq!(config.refresh.period_us, Some(10));
        assert_eq!(config.refresh.forced_refresh_ms, 100);
        assert_eq!(config.max_channels_per_device, DEFAULT_MAX_CHANNELS_PER_DEVICE);
        assert_eq!(
            config.devices[0].driver,
            DriverConfig::Simulated { transfer_us: 25 }
        );
        assert_eq!(config.devices[1].driver, DriverConfig::Console);
        assert!(config.midi.is_none());
    }

    #[test]
    fn test_offsets_follow_previous_device() {
        let config = AppConfig::from_yaml(
            r#"
devices:
  - { channels: 8 }
  - { channels: 2 }
  - { channels: 4, offset: 10 }
"#,
        )
        .unwrap();
        let layout = config.layout().unwrap();
        let ranges: Vec<_> = layout.devices().iter().map(|d| d.range()).collect();
        assert_eq!(ranges, vec![0..8, 8..10, 10..14]);
        assert_eq!(config.devices[1].display_name(1), "dac1");
    }

    #[test]
    fn test_overlapping_offsets_rejected() {
        let err = AppConfig::from_yaml(
            r#"
devices:
  - { channels: 4 }
  - { channels: 4, offset: 2 }
"#,
        )
        .unwrap_err();
        let root = err.root_cause().to_string();
        assert!(root.contains("overlaps"), "unexpected error: {}", root);
    }

    #[test]
    fn test_oversized_offset_or_channels_rejected() {
        for yaml in [
            "devices:\n  - { channels: 4 }\n  - { channels: 18446744073709551615 }",
            "devices:\n  - { channels: 4 }\n  - { channels: 4, offset: 18446744073709551615 }",
        ] {
            let err = AppConfig::from_yaml(yaml).unwrap_err();
            assert!(
                err.chain()
                    .any(|cause| cause.downcast_ref::<ConfigError>().is_some()),
                "expected a layout error, got: {:#}",
                err
            );
        }
    }

    #[test]
    fn test_offset_overflow_with_raised_channel_limit() {
        let config = AppConfig::from_yaml(
            r#"
max_channels_per_device: 18446744073709551615
devices:
  - { channels: 4 }
  - { channels: 4, offset: 18446744073709551615 }
"#,
        );
        let err = config.unwrap_err();
        let layout_err = err
            .chain()
            .find_map(|cause| cause.downcast_ref::<ConfigError>())
            .cloned();
        assert!(
            matches!(layout_err, Some(ConfigError::OffsetOverflow { .. })),
            "unexpected error: {:#}",
            err
        );
    }

    #[test]
    fn test_no_devices_rejected() {
        assert!(AppConfig::from_yaml("devices: []").is_err());
    }

    #[test]
    fn test_timing_validation() {
        let yaml = format!("{}\nrefresh: {{ forced_refresh_ms: 0 }}\n", TWO_DACS);
        assert!(AppConfig::from_yaml(&yaml).is_err());

        let yaml = format!("{}\nrefresh: {{ period_us: null }}\n", TWO_DACS);
        let config = AppConfig::from_yaml(&yaml).unwrap();
        assert_eq!(config.scheduler().unwrap().period(), None);
    }

    #[test]
    fn test_inverted_value_range_rejected() {
        let yaml = format!("{}\nvalues: {{ min: 5000, max: 100 }}\n", TWO_DACS);
        assert!(AppConfig::from_yaml(&yaml).is_err());
    }

    #[test]
    fn test_midi_mapping_validation() {
        let ok = format!(
            "{}\nmidi:\n  input_port: keys\n  mappings:\n    - {{ type: pb, channel: 1, output: 0 }}\n    - {{ type: cc, channel: 16, cc: 74, output: 7 }}\n",
            TWO_DACS
        );
        let config = AppConfig::from_yaml(&ok).unwrap();
        assert_eq!(config.midi.unwrap().mappings.len(), 2);

        for bad in [
            "{ type: cc, channel: 1, output: 0 }",
            "{ type: cc, channel: 1, cc: 200, output: 0 }",
            "{ type: pb, channel: 0, output: 0 }",
            "{ type: pb, channel: 17, output: 0 }",
            "{ type: pb, channel: 1, output: 8 }",
        ] {
            let yaml = format!(
                "{}\nmidi:\n  input_port: keys\n  mappings:\n    - {}\n",
                TWO_DACS, bad
            );
            assert!(AppConfig::from_yaml(&yaml).is_err(), "accepted {}", bad);
        }
    }

    #[test]
    fn test_duplicate_mapping_rejected() {
        let yaml = format!(
            "{}\nmidi:\n  input_port: keys\n  mappings:\n    - {{ type: pb, channel: 2, output: 0 }}\n    - {{ type: pb, channel: 2, output: 1 }}\n",
            TWO_DACS
        );
        assert!(AppConfig::from_yaml(&yaml).is_err());
    }

    #[tokio::test]
    async fn test_load_from_file() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let path = temp_dir.path().join("cv-gw.yaml");
        fs::write(&path, TWO_DACS)?;

        let config = AppConfig::load(&path.to_string_lossy()).await?;
        assert_eq!(config.devices.len(), 2);
        assert_eq!(config.layout()?.total_channels(), 8);

        assert!(AppConfig::load("/nonexistent/cv-gw.yaml").await.is_err());
        Ok(())
    }
}
