//! Configuration management for deskcam
//!
//! Defaults can be overridden by a TOML file, which in turn is
//! overridden by command-line flags.

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Lowest and highest accepted target frame rates.
pub const FPS_MIN: u32 = 1;
pub const FPS_MAX: u32 = 60;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Output configuration
    pub output: OutputConfig,

    /// Video configuration
    pub video: VideoConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Destination: device path, file path, `-` for stdout, or
    /// `shm[:NAME]` for a shared-memory region
    pub device: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VideoConfig {
    /// Target frame rate
    pub fps: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level filter
    pub level: String,
}

/// Platform default destination: the conventional v4l2loopback node on
/// Linux, stdout elsewhere (for piping into a bridge or ffmpeg).
pub fn default_device() -> &'static str {
    if cfg!(target_os = "linux") {
        "/dev/video10"
    } else {
        "-"
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self { device: default_device().to_string() }
    }
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self { fps: 15 }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".to_string() }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            output: OutputConfig::default(),
            video: VideoConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file; a missing file yields the
    /// defaults.
    pub fn load(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        if !path.exists() {
            return Ok(Config::default());
        }

        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), Box<dyn std::error::Error>> {
        if self.video.fps < FPS_MIN || self.video.fps > FPS_MAX {
            return Err(format!("fps must be {}-{}", FPS_MIN, FPS_MAX).into());
        }

        if self.output.device.is_empty() {
            return Err("Output device must not be empty".into());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::Config;

    #[test]
    fn validate_accepts_fps_bounds() {
        let mut cfg = Config::default();
        cfg.video.fps = 1;
        assert!(cfg.validate().is_ok());
        cfg.video.fps = 60;
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn validate_rejects_fps_out_of_range() {
        let mut cfg = Config::default();
        cfg.video.fps = 0;
        assert!(cfg.validate().is_err());
        cfg.video.fps = 61;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn validate_rejects_empty_device() {
        let mut cfg = Config::default();
        cfg.output.device = String::new();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let cfg: Config = toml::from_str("[video]\nfps = 30\n").expect("parse");
        assert_eq!(cfg.video.fps, 30);
        assert_eq!(cfg.output.device, super::default_device());
    }
}
