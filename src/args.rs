use clap::Parser;
use std::path::PathBuf;

use deskcam_core::config::Config;

#[derive(Parser, Debug)]
#[command(name = "deskcam")]
#[command(version)]
#[command(about = "Stream your screen as a virtual camera for video calls", long_about = None)]
pub struct Args {
    /// Destination: device path, file path, '-' for stdout, or shm[:NAME]
    #[arg(short, long)]
    pub device: Option<String>,

    /// Target frame rate (1-60)
    #[arg(short, long)]
    pub fps: Option<u32>,

    /// Configuration file path
    #[arg(short, long, default_value = "/etc/deskcam.toml")]
    pub config: PathBuf,

    /// Verbose logging
    #[arg(short, long, action)]
    pub verbose: bool,
}

impl Args {
    /// Load the configuration file and apply command-line overrides.
    pub fn load_config(&self) -> Result<Config, Box<dyn std::error::Error>> {
        let mut config = Config::load(&self.config)?;
        if let Some(ref device) = self.device {
            config.output.device = device.clone();
        }
        if let Some(fps) = self.fps {
            config.video.fps = fps;
        }
        Ok(config)
    }
}
