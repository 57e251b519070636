//! Configuration management for Preset GW
//!
//! Handles loading, defaulting and validation of the YAML configuration file.
//! Every field has a default taken from the stock pedal build, so a missing
//! file is fine.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;
use tokio::fs;
use tracing::info;

use crate::control_loop::LoopTiming;
use crate::mapping::{MappingStore, DEFAULT_CUSTOM_HEX, DEFAULT_NEXT_HEX, DEFAULT_PREVIOUS_HEX};
use crate::message::OutgoingMessage;
use crate::preset::{PresetCounter, DEFAULT_MAX_PRESETS};

/// Root configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub midi: MidiConfig,
    #[serde(default)]
    pub gpio: GpioConfig,
    #[serde(default)]
    pub timing: TimingConfig,
    #[serde(default)]
    pub presets: PresetConfig,
    #[serde(default)]
    pub mapping: MappingConfig,
    #[serde(default)]
    pub api: ApiConfig,
}

/// MIDI output configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MidiConfig {
    /// Case-insensitive substring of the output port name
    #[serde(default = "default_output_port")]
    pub output_port: String,
    /// Log payloads instead of sending them
    #[serde(default)]
    pub dry_run: bool,
}

/// GPIO backend selection
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum GpioBackend {
    /// Raspberry Pi header via rppal
    Rpi,
    /// Virtual lines driven through the admin API
    Simulated,
}

/// Button wiring (BCM pin numbers)
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GpioConfig {
    #[serde(default = "default_gpio_backend")]
    pub backend: GpioBackend,
    #[serde(default = "default_next_pin")]
    pub next_pin: u8,
    #[serde(default = "default_previous_pin")]
    pub previous_pin: u8,
    #[serde(default = "default_custom_pin")]
    pub custom_pin: u8,
    /// Buttons short the line to ground (internal pull-up enabled)
    #[serde(default = "default_true")]
    pub active_low: bool,
}

/// Poll cadence and debounce
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TimingConfig {
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
}

/// Preset counter bounds
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PresetConfig {
    #[serde(default = "default_max_presets")]
    pub max_presets: u32,
    #[serde(default)]
    pub initial: u32,
}

/// Initial button mapping, as hex text
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MappingConfig {
    #[serde(default = "default_next_hex")]
    pub next: String,
    #[serde(default = "default_previous_hex")]
    pub previous: String,
    #[serde(default = "default_custom_hex")]
    pub custom: String,
}

/// Admin HTTP server
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ApiConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_api_bind")]
    pub bind: String,
    #[serde(default = "default_api_port")]
    pub port: u16,
}

impl AppConfig {
    /// Load configuration from file with validation
    pub async fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config file: {}", path))?;

        Self::from_yaml(&contents).with_context(|| format!("Invalid config file: {}", path))
    }

    /// Load the file if it exists, otherwise fall back to defaults
    pub async fn load_or_default(path: &str) -> Result<Self> {
        if Path::new(path).exists() {
            Self::load(path).await
        } else {
            info!("Config file {} not found, using built-in defaults", path);
            Ok(Self::default())
        }
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
        if self.midi.output_port.trim().is_empty() && !self.midi.dry_run {
            anyhow::bail!("midi.output_port cannot be empty");
        }

        let pins = [self.gpio.next_pin, self.gpio.previous_pin, self.gpio.custom_pin];
        let unique: HashSet<u8> = pins.iter().copied().collect();
        if unique.len() != pins.len() {
            anyhow::bail!(
                "GPIO pins must be distinct (next={}, previous={}, custom={})",
                pins[0],
                pins[1],
                pins[2]
            );
        }

        if self.timing.poll_interval_ms == 0 {
            anyhow::bail!("timing.poll_interval_ms must be greater than 0");
        }

        if self.presets.max_presets == 0 {
            anyhow::bail!("presets.max_presets must be at least 1");
        }
        if self.presets.initial >= self.presets.max_presets {
            anyhow::bail!(
                "presets.initial ({}) must be below max_presets ({})",
                self.presets.initial,
                self.presets.max_presets
            );
        }

        for (name, hex) in [
            ("next", &self.mapping.next),
            ("previous", &self.mapping.previous),
            ("custom", &self.mapping.custom),
        ] {
            OutgoingMessage::from_hex(hex)
                .with_context(|| format!("Invalid mapping.{} value '{}'", name, hex))?;
        }

        Ok(())
    }

    /// Build the mapping store from the configured initial values
    pub fn mapping_store(&self) -> Result<MappingStore> {
        MappingStore::from_hex(&self.mapping.next, &self.mapping.previous, &self.mapping.custom)
            .context("Invalid initial mapping")
    }

    pub fn preset_counter(&self) -> PresetCounter {
        PresetCounter::with_initial(self.presets.max_presets, self.presets.initial)
    }

    pub fn loop_timing(&self) -> LoopTiming {
        LoopTiming {
            poll_interval: Duration::from_millis(self.timing.poll_interval_ms),
            debounce: Duration::from_millis(self.timing.debounce_ms),
        }
    }
}

impl Default for MidiConfig {
    fn default() -> Self {
        Self {
            output_port: default_output_port(),
            dry_run: false,
        }
    }
}

impl Default for GpioConfig {
    fn default() -> Self {
        Self {
            backend: default_gpio_backend(),
            next_pin: default_next_pin(),
            previous_pin: default_previous_pin(),
            custom_pin: default_custom_pin(),
            active_low: true,
        }
    }
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            debounce_ms: default_debounce_ms(),
        }
    }
}

impl Default for PresetConfig {
    fn default() -> Self {
        Self {
            max_presets: default_max_presets(),
            initial: 0,
        }
    }
}

impl Default for MappingConfig {
    fn default() -> Self {
        Self {
            next: default_next_hex(),
            previous: default_previous_hex(),
            custom: default_custom_hex(),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind: default_api_bind(),
            port: default_api_port(),
        }
    }
}

// Default value functions
fn default_output_port() -> String { "f_midi".to_string() }
fn default_true() -> bool { true }
fn default_next_pin() -> u8 { 17 }
fn default_previous_pin() -> u8 { 27 }
fn default_custom_pin() -> u8 { 22 }
fn default_poll_interval_ms() -> u64 { 50 }
fn default_debounce_ms() -> u64 { 200 }
fn default_max_presets() -> u32 { DEFAULT_MAX_PRESETS }
fn default_next_hex() -> String { DEFAULT_NEXT_HEX.to_string() }
fn default_previous_hex() -> String { DEFAULT_PREVIOUS_HEX.to_string() }
fn default_custom_hex() -> String { DEFAULT_CUSTOM_HEX.to_string() }
fn default_api_bind() -> String { "0.0.0.0".to_string() }
fn default_api_port() -> u16 { 5000 }

fn default_gpio_backend() -> GpioBackend {
    if cfg!(target_os = "linux") {
        GpioBackend::Rpi
    } else {
        GpioBackend::Simulated
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::button::ButtonId;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_are_valid() {
        let config = AppConfig::default();
        config.validate().unwrap();

        assert_eq!(config.midi.output_port, "f_midi");
        assert_eq!(
            (config.gpio.next_pin, config.gpio.previous_pin, config.gpio.custom_pin),
            (17, 27, 22)
        );
        assert_eq!(config.loop_timing(), LoopTiming::default());
        assert_eq!(config.preset_counter().max_presets(), 127);
        assert_eq!(config.api.port, 5000);
    }

    #[test]
    fn test_partial_yaml_fills_defaults() {
        let config = AppConfig::from_yaml(
            r#"
midi:
  output_port: "USB MIDI"
gpio:
  backend: simulated
mapping:
  custom: "B0 07 64"
"#,
        )
        .unwrap();

        assert_eq!(config.midi.output_port, "USB MIDI");
        assert_eq!(config.gpio.backend, GpioBackend::Simulated);
        assert_eq!(config.gpio.next_pin, 17);
        assert_eq!(config.timing.debounce_ms, 200);

        let store = config.mapping_store().unwrap();
        assert_eq!(store.get(ButtonId::Custom).to_hex(), "B0 07 64");
        assert_eq!(store.get(ButtonId::Next).to_hex(), "C0 01");
    }

    #[test]
    fn test_example_file_parses() {
        let config = AppConfig::from_yaml(include_str!("../../config.example.yaml")).unwrap();
        assert_eq!(config.gpio.backend, GpioBackend::Rpi);
        assert_eq!(config.mapping.previous, "C0 00");
    }

    #[test]
    fn test_empty_yaml_is_default() {
        let config = AppConfig::from_yaml("{}").unwrap();
        assert_eq!(config.presets.max_presets, 127);
    }

    #[test]
    fn test_rejects_duplicate_pins() {
        let err = AppConfig::from_yaml("gpio:\n  next_pin: 5\n  previous_pin: 5\n").unwrap_err();
        assert!(err.to_string().contains("distinct"));
    }

    #[test]
    fn test_rejects_bad_bounds_and_timing() {
        assert!(AppConfig::from_yaml("presets:\n  max_presets: 0\n").is_err());
        assert!(AppConfig::from_yaml("presets:\n  max_presets: 8\n  initial: 8\n").is_err());
        assert!(AppConfig::from_yaml("timing:\n  poll_interval_ms: 0\n").is_err());
    }

    #[test]
    fn test_rejects_malformed_mapping() {
        let err = AppConfig::from_yaml("mapping:\n  next: \"C0\"\n").unwrap_err();
        assert!(format!("{:#}", err).contains("mapping.next"));
    }

    #[tokio::test]
    async fn test_load_from_file() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let path = temp_dir.path().join("config.yaml");
        std::fs::write(&path, "presets:\n  max_presets: 16\n  initial: 3\napi:\n  port: 8080\n")?;

        let config = AppConfig::load(&path.to_string_lossy()).await?;
        assert_eq!(config.preset_counter().value(), 3);
        assert_eq!(config.api.port, 8080);
        Ok(())
    }

    #[tokio::test]
    async fn test_missing_file_uses_defaults() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let path = temp_dir.path().join("absent.yaml");

        let config = AppConfig::load_or_default(&path.to_string_lossy()).await?;
        assert_eq!(config.mapping.custom, "C0 7F");
        assert!(AppConfig::load(&path.to_string_lossy()).await.is_err());
        Ok(())
    }
}
