//! deskcam - Main entry point
//!
//! Streams the desktop as a virtual camera: screen capture, BGRA to
//! planar 4:2:0 conversion, and fixed-rate delivery to a loopback
//! device, raw stream, or shared-memory region.

mod args;
mod signals;

use args::Args;
use clap::Parser;
use deskcam_core::capture::{Capturer, FrameSource};
use deskcam_core::pipeline::{CancelToken, Pipeline, PipelineStats};
use deskcam_core::sink::{Sink, SinkTarget};
use deskcam_core::Config;
use log::{error, info};

fn main() {
    let args = Args::parse();

    let config = match args.load_config() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("failed to load config {}: {}", args.config.display(), e);
            std::process::exit(1);
        }
    };

    // Precedence: DESKCAM_LOG env, then -v, then the config file.
    let log_level = if args.verbose { "debug" } else { &config.logging.level };
    env_logger::Builder::new()
        .parse_filters(&std::env::var("DESKCAM_LOG").unwrap_or_else(|_| log_level.to_string()))
        .init();

    if let Err(e) = config.validate() {
        error!("error: {}", e);
        std::process::exit(1);
    }

    match run(&config) {
        Ok(stats) => {
            info!("stopping ({} frames total)", stats.frames_delivered);
        }
        Err(e) => {
            error!("{}", e);
            std::process::exit(1);
        }
    }
}

/// Open capture and sink, wire shutdown signals, and run the pacing
/// loop. Startup failures return `Err`; once streaming has begun the
/// loop always winds down to a summary.
fn run(config: &Config) -> Result<PipelineStats, Box<dyn std::error::Error>> {
    let mut capturer = Capturer::open()?;
    let (width, height) = capturer.dimensions();
    if width % 2 != 0 || height % 2 != 0 {
        return Err(format!("display dimensions {}x{} must be even", width, height).into());
    }

    let target = SinkTarget::parse(&config.output.device);
    let mut sink = Sink::open(&target, width, height, config.video.fps)?;

    let cancel = CancelToken::new();
    signals::install(cancel.clone());

    info!(
        "deskcam: streaming {}x{} @ {} fps -> {} ({})",
        width,
        height,
        config.video.fps,
        target,
        capturer.backend_name()
    );
    info!("deskcam: press Ctrl+C to stop");

    Ok(Pipeline::new(config.video.fps).run(&mut capturer, &mut sink, &cancel))
}
