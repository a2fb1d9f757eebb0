//! Frame delivery sinks
//!
//! A sink accepts one frame per `deliver()` call. The destination is
//! parsed from the `--device` value: a v4l2loopback device, a raw byte
//! stream (file or stdout), or a cross-process shared-memory region.

pub mod shm;
mod stream;
#[cfg(target_os = "linux")]
mod v4l2;

pub use shm::SHM_DEFAULT_NAME;
#[cfg(unix)]
pub use shm::ShmSink;
pub use stream::StreamSink;
#[cfg(target_os = "linux")]
pub use v4l2::V4l2Sink;

use crate::capture::BgraFrame;
use std::fmt;
use std::io;
use std::path::PathBuf;

/// Sink errors
#[derive(Debug)]
pub enum SinkError {
    /// Destination could not be opened
    Open { target: String, source: io::Error },
    /// Device refused the fixed format/resolution at open time
    Negotiate(String),
    /// Frame shorter than one full frame for the negotiated dimensions
    ShortFrame { expected: usize, actual: usize },
    /// Dimensions exceed the shared-memory protocol maximum
    TooLarge { width: u32, height: u32 },
    /// Downstream reader went away; terminal but clean
    BrokenPipe,
    /// Any other write failure; fatal
    Io(io::Error),
    /// Payload kind does not match what this sink carries
    Payload(&'static str),
    /// Destination kind not available on this platform
    Unsupported(String),
}

impl SinkError {
    /// True when the downstream consumer disconnected; the pipeline
    /// ends cleanly rather than reporting a failure.
    pub fn is_disconnect(&self) -> bool {
        matches!(self, SinkError::BrokenPipe)
    }

    fn from_io(e: io::Error) -> Self {
        if e.kind() == io::ErrorKind::BrokenPipe {
            SinkError::BrokenPipe
        } else {
            SinkError::Io(e)
        }
    }
}

impl fmt::Display for SinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SinkError::Open { target, source } => {
                write!(f, "cannot open {}: {}", target, source)
            }
            SinkError::Negotiate(msg) => write!(f, "format negotiation failed: {}", msg),
            SinkError::ShortFrame { expected, actual } => {
                write!(f, "short frame: {} of {} bytes", actual, expected)
            }
            SinkError::TooLarge { width, height } => {
                write!(
                    f,
                    "{}x{} exceeds the {}x{} shared-memory maximum",
                    width,
                    height,
                    shm::SHM_MAX_WIDTH,
                    shm::SHM_MAX_HEIGHT
                )
            }
            SinkError::BrokenPipe => write!(f, "downstream closed the stream"),
            SinkError::Io(e) => write!(f, "write failed: {}", e),
            SinkError::Payload(kind) => write!(f, "sink does not accept {} frames", kind),
            SinkError::Unsupported(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for SinkError {}

/// Pixel layout a sink consumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkKind {
    /// Converted planar 4:2:0 frames (device and stream sinks)
    PlanarI420,
    /// Captured BGRA frames (shared-memory region, per its fixed ABI)
    PackedBgra,
}

/// One frame on its way out, in whichever layout the sink negotiated.
pub enum FramePayload<'a> {
    I420(&'a [u8]),
    Bgra(&'a BgraFrame<'a>),
}

/// A frame consumer. Implemented by the destination backends and by
/// the pipeline's test doubles.
pub trait FrameOutput {
    /// Layout this sink consumes; fixed at open time.
    fn kind(&self) -> SinkKind;

    /// Deliver exactly one frame.
    fn deliver(&mut self, payload: FramePayload<'_>) -> Result<(), SinkError>;
}

/// Parsed destination for the `--device` option.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkTarget {
    /// `-`: raw frames on standard output
    Stdout,
    /// Plain file path
    File(PathBuf),
    /// v4l2loopback device path
    Device(PathBuf),
    /// `shm` / `shm:NAME`: shared-memory region
    SharedMemory(String),
}

impl SinkTarget {
    pub fn parse(spec: &str) -> Self {
        if spec == "-" {
            return SinkTarget::Stdout;
        }
        if spec == "shm" {
            return SinkTarget::SharedMemory(SHM_DEFAULT_NAME.to_string());
        }
        if let Some(name) = spec.strip_prefix("shm:") {
            let name = if name.starts_with('/') {
                name.to_string()
            } else {
                format!("/{}", name)
            };
            return SinkTarget::SharedMemory(name);
        }
        if cfg!(target_os = "linux") && spec.starts_with("/dev/video") {
            return SinkTarget::Device(PathBuf::from(spec));
        }
        SinkTarget::File(PathBuf::from(spec))
    }
}

impl fmt::Display for SinkTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SinkTarget::Stdout => write!(f, "<stdout>"),
            SinkTarget::File(p) => write!(f, "{}", p.display()),
            SinkTarget::Device(p) => write!(f, "{}", p.display()),
            SinkTarget::SharedMemory(name) => write!(f, "shm:{}", name),
        }
    }
}

/// The delivery sink chosen for this session.
pub enum Sink {
    #[cfg(target_os = "linux")]
    Device(V4l2Sink),
    Stream(StreamSink),
    #[cfg(unix)]
    Shm(ShmSink),
}

impl Sink {
    /// Open the destination and negotiate the session's fixed
    /// dimensions with it.
    pub fn open(target: &SinkTarget, width: u32, height: u32, fps: u32) -> Result<Self, SinkError> {
        match target {
            SinkTarget::Stdout => Ok(Sink::Stream(StreamSink::stdout(width, height))),
            SinkTarget::File(path) => Ok(Sink::Stream(StreamSink::create(path, width, height)?)),
            SinkTarget::Device(path) => {
                #[cfg(target_os = "linux")]
                {
                    Ok(Sink::Device(V4l2Sink::open(path, width, height)?))
                }
                #[cfg(not(target_os = "linux"))]
                {
                    Err(SinkError::Unsupported(format!(
                        "v4l2 device {} requires Linux",
                        path.display()
                    )))
                }
            }
            SinkTarget::SharedMemory(name) => {
                #[cfg(unix)]
                {
                    Ok(Sink::Shm(ShmSink::open(name, width, height, fps)?))
                }
                #[cfg(not(unix))]
                {
                    let _ = (name, fps);
                    Err(SinkError::Unsupported(
                        "shared-memory output requires a unix platform".to_string(),
                    ))
                }
            }
        }
    }
}

impl FrameOutput for Sink {
    fn kind(&self) -> SinkKind {
        match self {
            #[cfg(target_os = "linux")]
            Sink::Device(_) => SinkKind::PlanarI420,
            Sink::Stream(_) => SinkKind::PlanarI420,
            #[cfg(unix)]
            Sink::Shm(_) => SinkKind::PackedBgra,
        }
    }

    fn deliver(&mut self, payload: FramePayload<'_>) -> Result<(), SinkError> {
        match self {
            #[cfg(target_os = "linux")]
            Sink::Device(s) => s.deliver(payload),
            Sink::Stream(s) => s.deliver(payload),
            #[cfg(unix)]
            Sink::Shm(s) => s.deliver(payload),
        }
    }
}

/// Write the whole buffer, retrying only on interrupted calls. Any
/// other error propagates to the caller.
pub(crate) fn write_full(out: &mut impl io::Write, mut buf: &[u8]) -> io::Result<()> {
    while !buf.is_empty() {
        match out.write(buf) {
            Ok(0) => return Err(io::ErrorKind::WriteZero.into()),
            Ok(n) => buf = &buf[n..],
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(())
}
