//! v4l2loopback device sink
//!
//! Opens a pre-existing loopback device for writing, fixes the output
//! format to YUV420 at the session's dimensions with one `VIDIOC_S_FMT`,
//! then writes exactly one frame per deliver call.

use crate::convert::i420_size;
use crate::sink::{write_full, FramePayload, SinkError};
use log::info;
use std::fs::{File, OpenOptions};
use std::io;
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};

const VIDIOC_S_FMT: libc::c_ulong = 0xC0D0_5605;
const V4L2_BUF_TYPE_VIDEO_OUTPUT: u32 = 2;
const V4L2_FIELD_NONE: u32 = 1;
/// fourcc 'YU12', planar YUV 4:2:0
const V4L2_PIX_FMT_YUV420: u32 =
    (b'Y' as u32) | ((b'U' as u32) << 8) | ((b'1' as u32) << 16) | ((b'2' as u32) << 24);

#[repr(C)]
#[derive(Clone, Copy)]
struct V4l2PixFormat {
    width: u32,
    height: u32,
    pixelformat: u32,
    field: u32,
    bytesperline: u32,
    sizeimage: u32,
    colorspace: u32,
    private: u32,
    flags: u32,
    ycbcr_enc: u32,
    quantization: u32,
    xfer_func: u32,
}

/// Mirrors `struct v4l2_format`: a type tag plus a 200-byte union whose
/// widest members force 8-byte alignment.
#[repr(C)]
union V4l2FormatUnion {
    pix: V4l2PixFormat,
    raw: [u8; 200],
    _align: [u64; 25],
}

#[repr(C)]
struct V4l2Format {
    type_: u32,
    fmt: V4l2FormatUnion,
}

pub struct V4l2Sink {
    file: File,
    path: PathBuf,
    frame_size: usize,
}

impl V4l2Sink {
    /// Open the loopback device and negotiate the fixed output format.
    pub fn open(path: &Path, width: u32, height: u32) -> Result<Self, SinkError> {
        let file = OpenOptions::new().write(true).open(path).map_err(|e| SinkError::Open {
            target: path.display().to_string(),
            source: e,
        })?;

        let frame_size = i420_size(width, height);
        let mut format = V4l2Format {
            type_: V4L2_BUF_TYPE_VIDEO_OUTPUT,
            fmt: V4l2FormatUnion { raw: [0; 200] },
        };
        format.fmt.pix = V4l2PixFormat {
            width,
            height,
            pixelformat: V4L2_PIX_FMT_YUV420,
            field: V4L2_FIELD_NONE,
            bytesperline: 0,
            sizeimage: frame_size as u32,
            colorspace: 0,
            private: 0,
            flags: 0,
            ycbcr_enc: 0,
            quantization: 0,
            xfer_func: 0,
        };

        let rc =
            unsafe { libc::ioctl(file.as_raw_fd(), VIDIOC_S_FMT, &mut format as *mut V4l2Format) };
        if rc < 0 {
            return Err(SinkError::Negotiate(format!(
                "VIDIOC_S_FMT on {}: {}",
                path.display(),
                io::Error::last_os_error()
            )));
        }

        info!("vcam: opened {} {}x{} yuv420p", path.display(), width, height);
        Ok(Self { file, path: path.to_path_buf(), frame_size })
    }

    /// Device path this sink writes to.
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub(super) fn deliver(&mut self, payload: FramePayload<'_>) -> Result<(), SinkError> {
        let frame = match payload {
            FramePayload::I420(frame) => frame,
            FramePayload::Bgra(_) => return Err(SinkError::Payload("BGRA")),
        };
        if frame.len() < self.frame_size {
            return Err(SinkError::ShortFrame { expected: self.frame_size, actual: frame.len() });
        }
        write_full(&mut self.file, &frame[..self.frame_size]).map_err(SinkError::from_io)
    }
}

#[cfg(test)]
mod tests {
    use super::{V4l2Format, V4L2_PIX_FMT_YUV420, VIDIOC_S_FMT};
    use std::mem;

    #[test]
    fn format_struct_matches_kernel_abi() {
        // sizeof(struct v4l2_format) == 208 on 64-bit, union at offset 8
        assert_eq!(mem::size_of::<V4l2Format>(), 208);
        assert_eq!(mem::align_of::<V4l2Format>(), 8);
        // _IOWR('V', 5, ...) encodes that size
        assert_eq!((VIDIOC_S_FMT >> 16) & 0x3FFF, 208);
    }

    #[test]
    fn yuv420_fourcc() {
        assert_eq!(V4L2_PIX_FMT_YUV420, 0x3231_5559);
    }
}
