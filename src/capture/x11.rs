//! X11 screen capture
//!
//! Fast path: MIT-SHM, where the server writes each frame into a SysV
//! shared segment attached once at open time. Slow path: a full
//! `GetImage` round trip per frame for servers without the extension.

use crate::capture::{BgraFrame, CaptureError, Capturer};
use log::{debug, info};
use x11rb::connection::Connection;
use x11rb::protocol::shm;
use x11rb::protocol::xproto::{ConnectionExt, ImageFormat, Window};
use x11rb::xcb_ffi::XCBConnection;

const BYTE_ORDER_LSB_FIRST: u8 = 0;

/// Root window geometry and pixel layout, fixed at open time.
struct ScreenInfo {
    root: Window,
    width: u32,
    height: u32,
    /// Bytes per row as the server pads it.
    stride: usize,
}

impl ScreenInfo {
    fn query(conn: &XCBConnection, screen_num: usize) -> Result<Self, CaptureError> {
        let setup = conn.setup();
        let screen = &setup.roots[screen_num];
        let width = u32::from(screen.width_in_pixels);
        let height = u32::from(screen.height_in_pixels);
        let depth = screen.root_depth;

        if u8::from(setup.image_byte_order) != BYTE_ORDER_LSB_FIRST {
            return Err(CaptureError::UnsupportedFormat(
                "big-endian image byte order".to_string(),
            ));
        }
        if depth != 24 && depth != 32 {
            return Err(CaptureError::UnsupportedFormat(format!(
                "root depth {} (need 24 or 32 bpp BGRA)",
                depth
            )));
        }

        let (bytes_per_pixel, stride) = pixmap_layout(conn, width, depth);
        if bytes_per_pixel != 4 {
            return Err(CaptureError::UnsupportedFormat(format!(
                "{} bytes per pixel (need 4)",
                bytes_per_pixel
            )));
        }

        Ok(Self { root: screen.root, width, height, stride })
    }
}

/// Bytes per pixel and per padded scanline for the given depth.
fn pixmap_layout(conn: &XCBConnection, width: u32, depth: u8) -> (usize, usize) {
    for format in &conn.setup().pixmap_formats {
        if format.depth == depth {
            let bpp = format.bits_per_pixel as usize;
            let pad = format.scanline_pad as usize;
            let bits_per_line = width as usize * bpp;
            let padded_bits = ((bits_per_line + pad - 1) / pad) * pad;
            return ((bpp / 8).max(1), padded_bits / 8);
        }
    }
    (4, width as usize * 4)
}

/// SysV segment shared with the X server.
struct Segment {
    shmseg: u32,
    shmid: i32,
    addr: *mut u8,
    size: usize,
}

impl Segment {
    /// Allocate and attach a segment, undoing every step on failure.
    fn init(conn: &XCBConnection, size: usize) -> Option<Self> {
        let shmseg = conn.generate_id().ok()?;

        let shmid = unsafe { libc::shmget(libc::IPC_PRIVATE, size, libc::IPC_CREAT | 0o600) };
        if shmid < 0 {
            return None;
        }

        let addr = unsafe { libc::shmat(shmid, std::ptr::null(), 0) };
        if addr as isize == -1 {
            unsafe {
                libc::shmctl(shmid, libc::IPC_RMID, std::ptr::null_mut());
            }
            return None;
        }

        if shm::attach(conn, shmseg, shmid as u32, false).is_err() {
            unsafe {
                libc::shmdt(addr);
                libc::shmctl(shmid, libc::IPC_RMID, std::ptr::null_mut());
            }
            return None;
        }
        let _ = conn.flush();

        Some(Self { shmseg, shmid, addr: addr as *mut u8, size })
    }
}

fn shm_available(conn: &XCBConnection) -> bool {
    match shm::query_version(conn) {
        Ok(cookie) => cookie.reply().is_ok(),
        Err(_) => false,
    }
}

/// Connect to the display and open the best available capture path.
pub(super) fn open() -> Result<Capturer, CaptureError> {
    let (conn, screen_num) =
        XCBConnection::connect(None).map_err(|e| CaptureError::DisplayUnavailable(e.to_string()))?;
    let info = ScreenInfo::query(&conn, screen_num)?;

    if shm_available(&conn) {
        let size = info.stride * info.height as usize;
        if let Some(segment) = Segment::init(&conn, size) {
            info!("capture: {}x{} shm=yes", info.width, info.height);
            return Ok(Capturer::XShm(XshmCapture { conn, info, segment }));
        }
        debug!("MIT-SHM segment setup failed, using GetImage");
    } else {
        debug!("MIT-SHM not available, using GetImage");
    }

    info!("capture: {}x{} shm=no", info.width, info.height);
    Ok(Capturer::XImg(XImgCapture { conn, info, last: Vec::new() }))
}

/// MIT-SHM capture: zero allocation per frame.
pub struct XshmCapture {
    conn: XCBConnection,
    info: ScreenInfo,
    segment: Segment,
}

impl XshmCapture {
    pub(super) fn dimensions(&self) -> (u32, u32) {
        (self.info.width, self.info.height)
    }

    pub(super) fn grab(&mut self) -> Result<BgraFrame<'_>, CaptureError> {
        let cookie = shm::get_image(
            &self.conn,
            self.info.root,
            0,
            0,
            self.info.width as u16,
            self.info.height as u16,
            u32::MAX,
            u8::from(ImageFormat::Z_PIXMAP),
            self.segment.shmseg,
            0,
        )
        .map_err(|e| CaptureError::ConnectionLost(e.to_string()))?;
        cookie
            .reply()
            .map_err(|e| CaptureError::Transient(e.to_string()))?;

        // The server has filled the segment; borrow it until next grab.
        let data = unsafe {
            std::slice::from_raw_parts(self.segment.addr as *const u8, self.segment.size)
        };
        Ok(BgraFrame {
            data,
            width: self.info.width,
            height: self.info.height,
            stride: self.info.stride,
        })
    }
}

impl Drop for XshmCapture {
    fn drop(&mut self) {
        let _ = shm::detach(&self.conn, self.segment.shmseg);
        let _ = self.conn.flush();
        unsafe {
            libc::shmdt(self.segment.addr as *mut _);
            libc::shmctl(self.segment.shmid, libc::IPC_RMID, std::ptr::null_mut());
        }
    }
}

/// GetImage capture: one owned reply buffer per frame, replacing the
/// previous one.
pub struct XImgCapture {
    conn: XCBConnection,
    info: ScreenInfo,
    last: Vec<u8>,
}

impl XImgCapture {
    pub(super) fn dimensions(&self) -> (u32, u32) {
        (self.info.width, self.info.height)
    }

    pub(super) fn grab(&mut self) -> Result<BgraFrame<'_>, CaptureError> {
        let reply = self
            .conn
            .get_image(
                ImageFormat::Z_PIXMAP,
                self.info.root,
                0,
                0,
                self.info.width as u16,
                self.info.height as u16,
                u32::MAX,
            )
            .map_err(|e| CaptureError::ConnectionLost(e.to_string()))?
            .reply()
            .map_err(|e| CaptureError::Transient(e.to_string()))?;

        let expected = self.info.stride * self.info.height as usize;
        if reply.data.len() < expected {
            return Err(CaptureError::Transient(format!(
                "truncated image: {} of {} bytes",
                reply.data.len(),
                expected
            )));
        }
        self.last = reply.data;

        Ok(BgraFrame {
            data: &self.last,
            width: self.info.width,
            height: self.info.height,
            stride: self.info.stride,
        })
    }
}
