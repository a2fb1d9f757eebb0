//! Screen capture backends
//!
//! One backend is selected at startup by runtime probing and produces
//! one BGRA frame per `grab()` call. Dimensions are fixed for the
//! lifetime of the session; a display-level resolution change surfaces
//! as a fatal error, never as a resize.

mod frame;

#[cfg(windows)]
mod dxgi;
#[cfg(unix)]
mod x11;

pub use frame::BgraFrame;
pub(crate) use frame::pack_rows;

#[cfg(windows)]
pub use dxgi::DxgiCapture;
#[cfg(unix)]
pub use x11::{XImgCapture, XshmCapture};

use std::fmt;

/// Capture errors
#[derive(Debug)]
pub enum CaptureError {
    /// Display server or GPU output unavailable at open time
    DisplayUnavailable(String),
    /// Display reports a pixel layout this pipeline cannot consume
    UnsupportedFormat(String),
    /// Duplication interface invalidated (mode change, exclusive
    /// capture elsewhere); the session must be torn down and reopened
    AccessLost,
    /// Connection to the display server dropped mid-session
    ConnectionLost(String),
    /// Single-frame failure; safe to retry after a short delay
    Transient(String),
}

impl CaptureError {
    /// Whether the loop must stop instead of retrying this session.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, CaptureError::Transient(_))
    }
}

impl fmt::Display for CaptureError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CaptureError::DisplayUnavailable(msg) => {
                write!(f, "cannot open display: {}", msg)
            }
            CaptureError::UnsupportedFormat(msg) => {
                write!(f, "unsupported display format: {}", msg)
            }
            CaptureError::AccessLost => {
                write!(f, "capture access lost (display mode change?), restart required")
            }
            CaptureError::ConnectionLost(msg) => {
                write!(f, "display connection lost: {}", msg)
            }
            CaptureError::Transient(msg) => {
                write!(f, "capture failed: {}", msg)
            }
        }
    }
}

impl std::error::Error for CaptureError {}

/// A source of BGRA frames. Implemented by the platform backends and
/// by the pipeline's test doubles.
pub trait FrameSource {
    /// Fixed dimensions discovered at open time.
    fn dimensions(&self) -> (u32, u32);

    /// Capture one frame. The returned view is valid until the next
    /// call on this source.
    fn grab(&mut self) -> Result<BgraFrame<'_>, CaptureError>;
}

/// The capture backend chosen for this session.
pub enum Capturer {
    /// X11 MIT-SHM fast path: the server writes into a shared segment
    #[cfg(unix)]
    XShm(x11::XshmCapture),
    /// X11 slow path: full image round trip per frame
    #[cfg(unix)]
    XImg(x11::XImgCapture),
    /// DXGI Desktop Duplication
    #[cfg(windows)]
    Dxgi(dxgi::DxgiCapture),
}

impl Capturer {
    /// Probe the platform and open the best available backend.
    pub fn open() -> Result<Self, CaptureError> {
        #[cfg(unix)]
        {
            x11::open()
        }
        #[cfg(windows)]
        {
            Ok(Capturer::Dxgi(dxgi::DxgiCapture::open()?))
        }
    }

    /// Name of the active backend, for logging.
    pub fn backend_name(&self) -> &'static str {
        match self {
            #[cfg(unix)]
            Capturer::XShm(_) => "x11-shm",
            #[cfg(unix)]
            Capturer::XImg(_) => "x11-getimage",
            #[cfg(windows)]
            Capturer::Dxgi(_) => "dxgi-duplication",
        }
    }
}

impl FrameSource for Capturer {
    fn dimensions(&self) -> (u32, u32) {
        match self {
            #[cfg(unix)]
            Capturer::XShm(c) => c.dimensions(),
            #[cfg(unix)]
            Capturer::XImg(c) => c.dimensions(),
            #[cfg(windows)]
            Capturer::Dxgi(c) => c.dimensions(),
        }
    }

    fn grab(&mut self) -> Result<BgraFrame<'_>, CaptureError> {
        match self {
            #[cfg(unix)]
            Capturer::XShm(c) => c.grab(),
            #[cfg(unix)]
            Capturer::XImg(c) => c.grab(),
            #[cfg(windows)]
            Capturer::Dxgi(c) => c.grab(),
        }
    }
}
