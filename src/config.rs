//! Runtime configuration
//!
//! Read from a TOML file (explicit `--config`, else
//! `<config dir>/bytebeat/config.toml` if it exists), then overridden from
//! the command line, then validated once before any audio is opened.

use crate::clock::SampleClock;
use crate::error::ConfigError;
use crate::frame::{BitDepth, SinkFormat};
use crate::scheduler::SchedulerConfig;
use crate::sink::DeviceConfig;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Most output channels the device sink decodes
pub const MAX_CHANNELS: u16 = 8;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LiveConfig {
    /// Rate `t` advances at, in samples per second
    pub logical_rate: u32,
    /// Rate the sink plays at
    pub physical_rate: u32,
    pub channels: u16,
    /// 8 or 16
    pub bit_depth: u16,
    pub signed: bool,
    pub frame_samples: usize,
    pub high_water_frames: usize,
    pub low_water_frames: usize,
    pub program_poll_ms: u64,
    pub drain_poll_ms: u64,
    pub reload_debounce_ms: u64,
    pub eval_error_report_limit: usize,
    /// Restart time at 0 after every successful reload
    pub reset_time_on_reload: bool,
    /// Drop audio queued by the old formula after every successful reload
    pub flush_on_reload: bool,
}

impl Default for LiveConfig {
    fn default() -> Self {
        Self {
            logical_rate: 8000,
            physical_rate: 44100,
            channels: 1,
            bit_depth: 16,
            signed: true,
            frame_samples: 1024,
            high_water_frames: 4,
            low_water_frames: 2,
            program_poll_ms: 100,
            drain_poll_ms: 20,
            reload_debounce_ms: 30,
            eval_error_report_limit: 8,
            reset_time_on_reload: false,
            flush_on_reload: true,
        }
    }
}

impl LiveConfig {
    /// Load from `explicit`, or from the default location if a file is
    /// there, or fall back to defaults. Not validated yet.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        match explicit {
            Some(path) => Self::from_file(path),
            None => match Self::default_path() {
                Some(path) if path.is_file() => Self::from_file(&path),
                _ => Ok(Self::default()),
            },
        }
    }

    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("bytebeat").join("config.toml"))
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.logical_rate == 0 || self.physical_rate == 0 {
            return Err(ConfigError::Invalid("sample rates must be positive".into()));
        }
        if self.channels == 0 || self.channels > MAX_CHANNELS {
            return Err(ConfigError::Invalid(format!(
                "channels must be between 1 and {MAX_CHANNELS}, got {}",
                self.channels
            )));
        }
        BitDepth::from_bits(self.bit_depth)?;
        if self.frame_samples == 0 {
            return Err(ConfigError::Invalid("frame_samples must be positive".into()));
        }
        if self.high_water_frames == 0 {
            return Err(ConfigError::Invalid("high_water_frames must be positive".into()));
        }
        if self.low_water_frames >= self.high_water_frames {
            return Err(ConfigError::Invalid(format!(
                "low_water_frames ({}) must be below high_water_frames ({})",
                self.low_water_frames, self.high_water_frames
            )));
        }
        if self.drain_poll_ms == 0 || self.program_poll_ms == 0 {
            return Err(ConfigError::Invalid("poll intervals must be positive".into()));
        }
        Ok(())
    }

    pub fn sink_format(&self) -> Result<SinkFormat, ConfigError> {
        Ok(SinkFormat {
            sample_rate: self.physical_rate,
            channels: self.channels,
            bit_depth: BitDepth::from_bits(self.bit_depth)?,
            signed: self.signed,
        })
    }

    /// Clock for a sink that ended up running at `physical_rate`
    pub fn clock(&self, physical_rate: u32) -> Result<SampleClock, ConfigError> {
        SampleClock::new(self.logical_rate, physical_rate)
    }

    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            frame_samples: self.frame_samples,
            program_poll: Duration::from_millis(self.program_poll_ms),
            drain_poll: Duration::from_millis(self.drain_poll_ms),
            eval_error_report_limit: self.eval_error_report_limit,
        }
    }

    pub fn device_config(&self) -> Result<DeviceConfig, ConfigError> {
        Ok(DeviceConfig {
            format: self.sink_format()?,
            frame_samples: self.frame_samples,
            high_water_frames: self.high_water_frames,
            low_water_frames: self.low_water_frames,
        })
    }

    pub fn reload_debounce(&self) -> Duration {
        Duration::from_millis(self.reload_debounce_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = LiveConfig::default();
        config.validate().unwrap();
        assert_eq!(config.logical_rate, 8000);
        assert!(!config.reset_time_on_reload);
        assert!(config.flush_on_reload);
    }

    #[test]
    fn test_flush_on_reload_can_be_disabled() {
        let config: LiveConfig = toml::from_str("flush_on_reload = false\n").unwrap();
        assert!(!config.flush_on_reload);
        assert!(!config.reset_time_on_reload);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: LiveConfig = toml::from_str("logical_rate = 11025\nbit_depth = 8\n").unwrap();
        assert_eq!(config.logical_rate, 11025);
        assert_eq!(config.bit_depth, 8);
        assert_eq!(config.physical_rate, 44100);
        config.validate().unwrap();
    }

    #[test]
    fn test_unknown_key_is_rejected() {
        assert!(toml::from_str::<LiveConfig>("logical_rte = 8000").is_err());
    }

    #[test]
    fn test_validation_errors() {
        let mut config = LiveConfig {
            bit_depth: 24,
            ..LiveConfig::default()
        };
        assert!(config.validate().is_err());

        config.bit_depth = 16;
        config.low_water_frames = config.high_water_frames;
        assert!(config.validate().is_err());

        config.low_water_frames = 0;
        config.logical_rate = 0;
        assert!(config.validate().is_err());
    }
}
