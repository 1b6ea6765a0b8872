//! Engine and Stream Configuration
//!
//! # Storage Locations
//! - Linux: `~/.config/wren/`
//! - Windows: `%APPDATA%\wren\config\`
//! - macOS: `~/Library/Application Support/com.wren.wren/`

use std::fs;
use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{EngineError, EngineResult};
use wren_platform::DEFAULT_MIN_SERVER_VERSION;

/// Audio stream configuration for both pipelines
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamConfig {
    /// Sample rate in Hz (e.g., 44100, 48000, 96000)
    pub sample_rate: u32,

    /// Largest block the processing context will hand to a chain, in frames
    pub block_size: u32,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48000,
            block_size: 512,
        }
    }
}

impl StreamConfig {
    /// Latency of one block in milliseconds
    pub fn latency_ms(&self) -> f32 {
        (self.block_size as f32 / self.sample_rate as f32) * 1000.0
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.sample_rate < 8000 || self.sample_rate > 192000 {
            return Err(format!("Invalid sample rate: {}", self.sample_rate));
        }
        if self.block_size < 16 || self.block_size > 8192 {
            return Err(format!("Invalid block size: {}", self.block_size));
        }
        Ok(())
    }
}

/// Overall engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    pub stream: StreamConfig,

    /// Capacity of each chain's notice queue
    #[serde(default = "default_notice_capacity")]
    pub notice_capacity: usize,

    /// Audio server versions below this are reported as unsupported
    #[serde(default = "default_min_server_version")]
    pub min_server_version: String,

    /// Preset directory; `None` uses `<config dir>/presets`
    #[serde(default)]
    pub presets_dir: Option<PathBuf>,

    /// Settings file; `None` uses `<config dir>/settings.json`
    #[serde(default)]
    pub settings_path: Option<PathBuf>,
}

fn default_notice_capacity() -> usize {
    wren_dsp::DEFAULT_NOTICE_CAPACITY
}

fn default_min_server_version() -> String {
    DEFAULT_MIN_SERVER_VERSION.to_string()
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            stream: StreamConfig::default(),
            notice_capacity: default_notice_capacity(),
            min_server_version: default_min_server_version(),
            presets_dir: None,
            settings_path: None,
        }
    }
}

impl EngineConfig {
    /// Create config optimized for low latency
    pub fn low_latency() -> Self {
        Self {
            stream: StreamConfig {
                sample_rate: 48000,
                block_size: 128, // ~2.6ms
            },
            ..Default::default()
        }
    }

    pub fn validate(&self) -> EngineResult<()> {
        self.stream.validate().map_err(EngineError::ConfigError)?;
        if self.notice_capacity == 0 {
            return Err(EngineError::ConfigError(
                "Notice capacity must be positive".into(),
            ));
        }
        Ok(())
    }

    /// Load a configuration file
    pub fn load(path: &Path) -> EngineResult<Self> {
        let file = fs::File::open(path)?;
        let config: Self = serde_json::from_reader(file)?;
        config.validate()?;
        info!("Configuration loaded from {:?}", path);
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> EngineResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = fs::File::create(path)?;
        serde_json::to_writer_pretty(file, self)?;
        info!("Configuration saved to {:?}", path);
        Ok(())
    }

    /// Platform-specific configuration directory
    pub fn config_dir() -> Option<PathBuf> {
        ProjectDirs::from("com", "wren", "wren").map(|proj| proj.config_dir().to_path_buf())
    }

    pub fn presets_path(&self) -> Option<PathBuf> {
        self.presets_dir
            .clone()
            .or_else(|| Self::config_dir().map(|dir| dir.join("presets")))
    }

    pub fn settings_file(&self) -> Option<PathBuf> {
        self.settings_path
            .clone()
            .or_else(|| Self::config_dir().map(|dir| dir.join("settings.json")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.stream.sample_rate, 48000);
        assert_eq!(config.stream.block_size, 512);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_latency_calculation() {
        let config = StreamConfig {
            sample_rate: 48000,
            block_size: 480, // Exactly 10ms at 48kHz
        };
        assert!((config.latency_ms() - 10.0).abs() < 0.01);
        assert!(EngineConfig::low_latency().stream.latency_ms() < config.latency_ms());
    }

    #[test]
    fn test_validation() {
        let invalid_rate = StreamConfig {
            sample_rate: 100,
            ..Default::default()
        };
        assert!(invalid_rate.validate().is_err());

        let invalid_block = StreamConfig {
            block_size: 4,
            ..Default::default()
        };
        assert!(invalid_block.validate().is_err());

        let config = EngineConfig {
            notice_capacity: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(EngineError::ConfigError(_))));
    }

    #[test]
    fn test_config_backward_compat_missing_fields() {
        let old_json = r#"{ "stream": { "sample_rate": 44100, "block_size": 256 } }"#;
        let config: EngineConfig = serde_json::from_str(old_json).unwrap();

        assert_eq!(config.stream.sample_rate, 44100);
        assert_eq!(config.notice_capacity, wren_dsp::DEFAULT_NOTICE_CAPACITY);
        assert_eq!(config.min_server_version, DEFAULT_MIN_SERVER_VERSION);
        assert!(config.presets_dir.is_none());
    }

    #[test]
    fn test_config_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("engine.json");
        let config = EngineConfig {
            presets_dir: Some(dir.path().join("presets")),
            ..EngineConfig::low_latency()
        };

        config.save(&path).unwrap();
        let loaded = EngineConfig::load(&path).unwrap();

        assert_eq!(loaded, config);
        assert_eq!(loaded.presets_path(), Some(dir.path().join("presets")));
    }
}
