//! Shared-memory sink
//!
//! Publishes captured BGRA frames to a POSIX shared-memory region for
//! a consumer in another process (e.g. a camera-extension host).
//!
//! Layout: `[ShmHeader][frame data (width * height * 4 bytes)]`.
//!
//! Synchronization is a single atomic `frame_seq` counter with no
//! locks: the producer copies the payload first, then increments the
//! counter with release ordering so readers that observe the new value
//! also observe the bytes. Readers poll and compare against their
//! last-seen sequence; there is no double buffering, so a reader that
//! races a write may observe a torn frame, which the protocol accepts.

use std::mem;
use std::sync::atomic::AtomicU64;

/// 'S2CM'
pub const SHM_MAGIC: u32 = 0x5332_434D;
pub const SHM_VERSION: u32 = 1;
/// 'BGRA', 32-bit packed
pub const SHM_PIXEL_FMT_BGRA: u32 = 0x4247_5241;
/// Well-known region name shared with consumers.
pub const SHM_DEFAULT_NAME: &str = "/screen2cam";
/// 8K bound enforced at allocation time.
pub const SHM_MAX_WIDTH: u32 = 7680;
pub const SHM_MAX_HEIGHT: u32 = 4320;

/// Region header, written once at open time. Field order and widths
/// are a cross-process ABI shared with consumers; do not reorder.
#[repr(C)]
pub struct ShmHeader {
    pub magic: u32,
    pub version: u32,
    pub width: i32,
    pub height: i32,
    /// Target rate, informational for readers.
    pub fps: i32,
    /// Bytes per row (width * 4).
    pub stride: u32,
    /// Incremented after each completed frame write.
    pub frame_seq: AtomicU64,
    pub pixel_fmt: u32,
    pub reserved: [u32; 5],
}

/// Total region size for the given dimensions.
pub fn shm_total_size(width: u32, height: u32) -> usize {
    mem::size_of::<ShmHeader>() + width as usize * height as usize * 4
}

#[cfg(unix)]
pub use producer::ShmSink;

#[cfg(unix)]
mod producer {
    use super::{
        shm_total_size, ShmHeader, SHM_MAGIC, SHM_MAX_HEIGHT, SHM_MAX_WIDTH, SHM_PIXEL_FMT_BGRA,
        SHM_VERSION,
    };
    use crate::capture::pack_rows;
    use crate::sink::{FramePayload, SinkError};
    use log::info;
    use std::ffi::CString;
    use std::io;
    use std::mem;
    use std::sync::atomic::{AtomicU64, Ordering};

    pub struct ShmSink {
        name: CString,
        region: *mut u8,
        region_size: usize,
        width: u32,
        height: u32,
    }

    // The region pointer is owned exclusively by this sink; consumers
    // attach their own mappings.
    unsafe impl Send for ShmSink {}

    impl ShmSink {
        /// Create (or reuse) the named region, size it for the session
        /// dimensions, and publish the header.
        pub fn open(name: &str, width: u32, height: u32, fps: u32) -> Result<Self, SinkError> {
            if width > SHM_MAX_WIDTH || height > SHM_MAX_HEIGHT {
                return Err(SinkError::TooLarge { width, height });
            }
            let c_name = CString::new(name).map_err(|_| SinkError::Open {
                target: name.to_string(),
                source: io::ErrorKind::InvalidInput.into(),
            })?;
            let open_err = |target: &str| SinkError::Open {
                target: target.to_string(),
                source: io::Error::last_os_error(),
            };

            let region_size = shm_total_size(width, height);
            let fd = unsafe {
                libc::shm_open(c_name.as_ptr(), libc::O_CREAT | libc::O_RDWR, 0o600 as libc::mode_t)
            };
            if fd < 0 {
                return Err(open_err(name));
            }
            if unsafe { libc::ftruncate(fd, region_size as libc::off_t) } < 0 {
                let e = open_err(name);
                unsafe {
                    libc::close(fd);
                    libc::shm_unlink(c_name.as_ptr());
                }
                return Err(e);
            }
            let region = unsafe {
                libc::mmap(
                    std::ptr::null_mut(),
                    region_size,
                    libc::PROT_READ | libc::PROT_WRITE,
                    libc::MAP_SHARED,
                    fd,
                    0,
                )
            };
            unsafe { libc::close(fd) };
            if region == libc::MAP_FAILED {
                let e = open_err(name);
                unsafe { libc::shm_unlink(c_name.as_ptr()) };
                return Err(e);
            }

            let sink = Self { name: c_name, region: region as *mut u8, region_size, width, height };
            unsafe {
                std::ptr::write(
                    sink.region as *mut ShmHeader,
                    ShmHeader {
                        magic: SHM_MAGIC,
                        version: SHM_VERSION,
                        width: width as i32,
                        height: height as i32,
                        fps: fps as i32,
                        stride: width * 4,
                        frame_seq: AtomicU64::new(0),
                        pixel_fmt: SHM_PIXEL_FMT_BGRA,
                        reserved: [0; 5],
                    },
                );
            }

            info!("vcam: shared region {} ({} bytes) {}x{} bgra", name, region_size, width, height);
            Ok(sink)
        }

        /// Sequence number of the last published frame.
        pub fn sequence(&self) -> u64 {
            self.header().frame_seq.load(Ordering::Acquire)
        }

        fn header(&self) -> &ShmHeader {
            unsafe { &*(self.region as *const ShmHeader) }
        }

        pub(super) fn data_area(&mut self) -> &mut [u8] {
            unsafe {
                std::slice::from_raw_parts_mut(
                    self.region.add(mem::size_of::<ShmHeader>()),
                    self.region_size - mem::size_of::<ShmHeader>(),
                )
            }
        }

        pub(in crate::sink) fn deliver(
            &mut self,
            payload: FramePayload<'_>,
        ) -> Result<(), SinkError> {
            let frame = match payload {
                FramePayload::Bgra(frame) => frame,
                FramePayload::I420(_) => return Err(SinkError::Payload("I420")),
            };
            let row_bytes = self.width as usize * 4;
            let height = self.height as usize;
            // Last row needs no padding past the visible pixels, but
            // the error reports the region's logical frame size.
            if frame.data.len() < frame.stride * (height - 1) + row_bytes {
                return Err(SinkError::ShortFrame {
                    expected: row_bytes * height,
                    actual: frame.data.len(),
                });
            }

            let (data, stride) = (frame.data, frame.stride);
            pack_rows(data, stride, row_bytes, height, self.data_area());

            // Payload must be visible before the new counter value is
            self.header().frame_seq.fetch_add(1, Ordering::Release);
            Ok(())
        }
    }

    impl Drop for ShmSink {
        fn drop(&mut self) {
            unsafe {
                libc::munmap(self.region as *mut libc::c_void, self.region_size);
                libc::shm_unlink(self.name.as_ptr());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{shm_total_size, ShmHeader, SHM_MAGIC, SHM_PIXEL_FMT_BGRA};
    use std::mem;

    #[test]
    fn header_layout_is_stable() {
        // 6 u32/i32 fields, an 8-byte counter at offset 24, pixel_fmt,
        // then 5 reserved words: 56 bytes total
        assert_eq!(mem::size_of::<ShmHeader>(), 56);
        assert_eq!(mem::align_of::<ShmHeader>(), 8);
    }

    #[test]
    fn region_size_for_1080p() {
        assert_eq!(
            shm_total_size(1920, 1080),
            mem::size_of::<ShmHeader>() + 1920 * 1080 * 4
        );
    }

    #[test]
    fn protocol_tags() {
        assert_eq!(&SHM_MAGIC.to_be_bytes(), b"S2CM");
        assert_eq!(&SHM_PIXEL_FMT_BGRA.to_be_bytes(), b"BGRA");
    }

    #[cfg(unix)]
    mod producer {
        use crate::capture::BgraFrame;
        use crate::sink::shm::ShmSink;
        use crate::sink::{FramePayload, SinkError};

        fn unique_name(tag: &str) -> String {
            format!("/deskcam-test-{}-{}", tag, std::process::id())
        }

        #[test]
        fn sequence_increments_once_per_frame() {
            let name = unique_name("seq");
            let mut sink = ShmSink::open(&name, 4, 2, 15).expect("open");
            assert_eq!(sink.sequence(), 0);

            let data = vec![0x55u8; 4 * 2 * 4];
            let frame = BgraFrame { data: &data, width: 4, height: 2, stride: 16 };
            sink.deliver(FramePayload::Bgra(&frame)).expect("deliver");
            assert_eq!(sink.sequence(), 1);
            sink.deliver(FramePayload::Bgra(&frame)).expect("deliver");
            assert_eq!(sink.sequence(), 2);
        }

        #[test]
        fn short_frame_is_rejected_before_publish() {
            let name = unique_name("short");
            let mut sink = ShmSink::open(&name, 4, 2, 15).expect("open");

            let data = vec![0u8; 4 * 2 * 4 - 1];
            let frame = BgraFrame { data: &data, width: 4, height: 2, stride: 16 };
            match sink.deliver(FramePayload::Bgra(&frame)) {
                // The reported size is the region's logical frame, not
                // the padded input
                Err(SinkError::ShortFrame { expected: 32, actual: 31 }) => {}
                other => panic!("expected ShortFrame, got {:?}", other.err()),
            }
            assert_eq!(sink.sequence(), 0);
        }

        #[test]
        fn delivered_bytes_land_after_header() {
            let name = unique_name("bytes");
            let mut sink = ShmSink::open(&name, 4, 2, 15).expect("open");

            let data: Vec<u8> = (0..4 * 2 * 4).map(|i| i as u8).collect();
            let frame = BgraFrame { data: &data, width: 4, height: 2, stride: 16 };
            sink.deliver(FramePayload::Bgra(&frame)).expect("deliver");

            assert_eq!(sink.sequence(), 1);
            assert_eq!(sink.data_area(), &data[..]);
        }

        #[test]
        fn oversized_dimensions_are_refused() {
            assert!(matches!(
                ShmSink::open("/deskcam-test-huge", 7681, 100, 15),
                Err(SinkError::TooLarge { .. })
            ));
        }
    }
}
