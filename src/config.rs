//! Engine configuration
//!
//! Defaults reproduce the observed monitoring protocol and recovery tuning.
//! A TOML file under the platform config directory overrides individual
//! fields; anything absent falls back to the default.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::audio::demux::ChannelSelect;
use crate::constants::{
    FRAME_CHANNEL_CAPACITY, MAX_RECONNECT_ATTEMPTS, METER_GAIN, RECONNECT_BACKOFF_MS,
    SOURCE_SAMPLE_RATE,
};
use crate::error::ConfigError;

/// Top-level engine configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    pub stream: StreamSettings,
    pub meter: MeterSettings,
    pub transfer: TransferSettings,
}

/// Stream session and recovery tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamSettings {
    /// Sample rate the monitoring stream is produced at
    pub source_sample_rate: u32,

    /// Which interleaved channel carries the call audio
    pub channel: ChannelSelect,

    /// Reconnect attempts before giving up on a session
    pub max_retries: u32,

    /// Fixed (non-exponential) delay between reconnect attempts
    pub reconnect_backoff_ms: u64,

    /// Capacity of the network → rendering frame channel
    pub frame_queue_capacity: usize,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            source_sample_rate: SOURCE_SAMPLE_RATE,
            channel: ChannelSelect::Right,
            max_retries: MAX_RECONNECT_ATTEMPTS,
            reconnect_backoff_ms: RECONNECT_BACKOFF_MS,
            frame_queue_capacity: FRAME_CHANNEL_CAPACITY,
        }
    }
}

/// Loudness visualization tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MeterSettings {
    /// Gain applied to the RMS estimate before clamping to [0, 1]
    pub gain: f32,
}

impl Default for MeterSettings {
    fn default() -> Self {
        Self { gain: METER_GAIN }
    }
}

/// Call hand-off settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferSettings {
    /// Phone number the call is handed off to, in any user-entered form
    pub destination_number: Option<String>,

    /// Timeout for the one-shot control POST
    pub request_timeout_ms: u64,
}

impl Default for TransferSettings {
    fn default() -> Self {
        Self {
            destination_number: None,
            request_timeout_ms: 10_000,
        }
    }
}

impl RelayConfig {
    /// Platform config file location, if one can be determined
    pub fn config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "call-relay")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Load from the platform config file, falling back to defaults
    pub fn load() -> Result<Self, ConfigError> {
        match Self::config_path() {
            Some(path) if path.exists() => Self::load_from(&path),
            _ => Ok(Self::default()),
        }
    }

    /// Load from a specific TOML file
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let contents =
            std::fs::read_to_string(path).map_err(|e| ConfigError::File(e.to_string()))?;
        Self::parse(&contents)
    }

    /// Parse a TOML document
    pub fn parse(contents: &str) -> Result<Self, ConfigError> {
        toml::from_str(contents).map_err(|e| ConfigError::Parse(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_protocol() {
        let config = RelayConfig::default();

        assert_eq!(config.stream.source_sample_rate, 16_000);
        assert_eq!(config.stream.channel, ChannelSelect::Right);
        assert_eq!(config.stream.max_retries, 3);
        assert_eq!(config.stream.reconnect_backoff_ms, 2_000);
        assert_eq!(config.meter.gain, 4.0);
        assert!(config.transfer.destination_number.is_none());
    }

    #[test]
    fn test_partial_file_overrides_only_named_fields() {
        let config = RelayConfig::parse(
            r#"
            [stream]
            max_retries = 5

            [transfer]
            destination_number = "(555) 123-4567"
            "#,
        )
        .unwrap();

        assert_eq!(config.stream.max_retries, 5);
        assert_eq!(
            config.transfer.destination_number.as_deref(),
            Some("(555) 123-4567")
        );
        // Untouched sections keep their defaults
        assert_eq!(config.stream.reconnect_backoff_ms, 2_000);
        assert_eq!(config.meter.gain, 4.0);
    }

    #[test]
    fn test_roundtrip_through_toml() {
        let mut config = RelayConfig::default();
        config.transfer.destination_number = Some("(555) 123-4567".to_string());

        let serialized = toml::to_string(&config).unwrap();
        let back = RelayConfig::parse(&serialized).unwrap();

        assert_eq!(back.stream.max_retries, config.stream.max_retries);
        assert_eq!(back.stream.channel, config.stream.channel);
        assert_eq!(
            back.transfer.destination_number,
            config.transfer.destination_number
        );
    }

    #[test]
    fn test_invalid_toml_is_a_parse_error() {
        let err = RelayConfig::parse("[stream\nmax_retries = ").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }
}
