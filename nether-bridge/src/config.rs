//! Bridge configuration (config.toml)
//!
//! Settings live in TOML in the platform config directory. Every field has a
//! default, so a partial or missing file still yields a usable config.

use std::path::{Path, PathBuf};

use nether_resample::ResamplerOptions;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::BridgeError;

const CONFIG_FILE: &str = "config.toml";

/// Errors reading or writing a config file.
#[derive(Debug, Error)]
pub enum ConfigFileError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to serialize TOML: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Bridge configuration, one table per section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct BridgeConfig {
    /// Resampler tuning
    #[serde(default)]
    pub resampler: ResamplerOptions,
    /// Host clock settings
    #[serde(default)]
    pub host: HostConfig,
    /// Emulation thread settings
    #[serde(default)]
    pub emulator: EmulatorConfig,
}

/// Host render clock configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostConfig {
    /// Headless clock rate in Hz (default: 44100). Device output uses the device rate.
    #[serde(default = "default_sample_rate")]
    pub sample_rate: f64,
    /// Frames per render tick (default: 512)
    #[serde(default = "default_frame_capacity")]
    pub frame_capacity: usize,
    /// PCM ring size in milliseconds of source audio (default: 150)
    #[serde(default = "default_ring_buffer_ms")]
    pub ring_buffer_ms: u32,
    /// Output volume applied after resampling (default: 1.0, range: 0.0-1.0)
    #[serde(default = "default_volume")]
    pub volume: f32,
}

/// How the emulation thread decides when to produce audio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Pacing {
    /// Keep the ring topped up to `target_fill_ms`
    #[default]
    Demand,
    /// Produce at the core's own sample rate in wall-clock time
    Clock,
}

/// Emulation thread configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmulatorConfig {
    /// Production pacing (default: demand)
    #[serde(default)]
    pub pacing: Pacing,
    /// Ring fill target for demand pacing (default: 50)
    #[serde(default = "default_target_fill_ms")]
    pub target_fill_ms: u32,
    /// Largest number of frames produced per push (default: 256)
    #[serde(default = "default_chunk_frames")]
    pub chunk_frames: usize,
}

fn default_sample_rate() -> f64 {
    44_100.0
}
fn default_frame_capacity() -> usize {
    512
}
fn default_ring_buffer_ms() -> u32 {
    150
}
fn default_volume() -> f32 {
    1.0
}
fn default_target_fill_ms() -> u32 {
    50
}
fn default_chunk_frames() -> usize {
    256
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            sample_rate: default_sample_rate(),
            frame_capacity: default_frame_capacity(),
            ring_buffer_ms: default_ring_buffer_ms(),
            volume: default_volume(),
        }
    }
}

impl Default for EmulatorConfig {
    fn default() -> Self {
        Self {
            pacing: Pacing::default(),
            target_fill_ms: default_target_fill_ms(),
            chunk_frames: default_chunk_frames(),
        }
    }
}

impl BridgeConfig {
    /// Check cross-field constraints that serde defaults cannot express.
    pub fn validate(&self) -> Result<(), BridgeError> {
        self.resampler.validate()?;

        if self.host.frame_capacity == 0 {
            return Err(BridgeError::InvalidSetting(
                "host.frame_capacity must be at least 1".into(),
            ));
        }
        if self.host.frame_capacity > self.resampler.max_frame_capacity {
            return Err(BridgeError::InvalidSetting(format!(
                "host.frame_capacity ({}) exceeds resampler.max_frame_capacity ({})",
                self.host.frame_capacity, self.resampler.max_frame_capacity
            )));
        }
        if self.host.ring_buffer_ms == 0 {
            return Err(BridgeError::InvalidSetting(
                "host.ring_buffer_ms must be at least 1".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.host.volume) {
            return Err(BridgeError::InvalidSetting(format!(
                "host.volume ({}) must be between 0.0 and 1.0",
                self.host.volume
            )));
        }
        if self.emulator.target_fill_ms >= self.host.ring_buffer_ms {
            return Err(BridgeError::InvalidSetting(format!(
                "emulator.target_fill_ms ({}) must be below host.ring_buffer_ms ({})",
                self.emulator.target_fill_ms, self.host.ring_buffer_ms
            )));
        }
        if self.emulator.chunk_frames == 0 {
            return Err(BridgeError::InvalidSetting(
                "emulator.chunk_frames must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// Returns the platform-specific configuration directory.
///
/// On Linux: `~/.config/nether-bridge`
///
/// Returns `None` if the home directory cannot be determined.
pub fn config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("io.nethercore", "", "nether-bridge")
        .map(|dirs| dirs.config_dir().to_path_buf())
}

/// Path of `config.toml` in [`config_dir`].
pub fn config_path() -> Option<PathBuf> {
    config_dir().map(|dir| dir.join(CONFIG_FILE))
}

/// Loads the configuration from the platform config directory.
///
/// Returns default values if the file doesn't exist or cannot be parsed.
pub fn load() -> BridgeConfig {
    let Some(path) = config_path() else {
        return BridgeConfig::default();
    };
    match load_from(&path) {
        Ok(config) => config,
        Err(ConfigFileError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
            BridgeConfig::default()
        }
        Err(e) => {
            tracing::warn!("Ignoring {}: {}", path.display(), e);
            BridgeConfig::default()
        }
    }
}

/// Loads the configuration from an explicit path.
pub fn load_from(path: &Path) -> Result<BridgeConfig, ConfigFileError> {
    let content = std::fs::read_to_string(path)?;
    Ok(toml::from_str(&content)?)
}

/// Saves the configuration, creating parent directories as needed.
pub fn save_to(config: &BridgeConfig, path: &Path) -> Result<(), ConfigFileError> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)?;
    }
    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content)?;
    Ok(())
}
