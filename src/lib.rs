//! deskcam-core - desktop-as-virtual-camera streaming core
//!
//! Captures the screen (X11 MIT-SHM / DXGI Desktop Duplication),
//! converts BGRA to planar 4:2:0, and delivers frames at a fixed rate
//! to a v4l2loopback device, a raw byte stream, or a shared-memory
//! region polled by a consumer process.

pub mod capture;
pub mod config;
pub mod convert;
pub mod pipeline;
pub mod sink;

// Re-exports
pub use capture::{BgraFrame, CaptureError, Capturer, FrameSource};
pub use config::Config;
pub use convert::{bgra_to_i420, i420_size};
pub use pipeline::{CancelToken, Pipeline, PipelineStats};
pub use sink::{FrameOutput, Sink, SinkError, SinkTarget};
