//! Captured frame view
//!
//! A borrowed window into the capture backend's pixel buffer.

use std::fmt;

/// One captured BGRA frame.
///
/// The pixel slice is borrowed from the capture backend and is only
/// valid until the next `grab()` call, which may overwrite the buffer
/// in place. Callers must finish consuming the frame before grabbing
/// again.
#[derive(Debug)]
pub struct BgraFrame<'a> {
    /// Raw pixel data, 4 bytes per pixel, rows separated by `stride`.
    pub data: &'a [u8],

    /// Frame width in pixels.
    pub width: u32,

    /// Frame height in pixels.
    pub height: u32,

    /// Bytes per row, always >= `width * 4`.
    pub stride: usize,
}

impl BgraFrame<'_> {
    /// Length in bytes of one tightly packed pixel row.
    pub fn row_bytes(&self) -> usize {
        self.width as usize * 4
    }

    /// True when rows carry no padding past the visible pixels.
    pub fn is_packed(&self) -> bool {
        self.stride == self.row_bytes()
    }
}

impl fmt::Display for BgraFrame<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Frame({}x{}, stride={}, {} bytes)",
            self.width,
            self.height,
            self.stride,
            self.data.len()
        )
    }
}

/// Copy `height` rows of `row_bytes` each from a padded source into a
/// tightly packed destination. Falls back to one bulk copy when the
/// source carries no padding.
pub(crate) fn pack_rows(
    src: &[u8],
    src_pitch: usize,
    row_bytes: usize,
    height: usize,
    dst: &mut [u8],
) {
    if src_pitch == row_bytes {
        dst[..row_bytes * height].copy_from_slice(&src[..row_bytes * height]);
        return;
    }
    for row in 0..height {
        let s = row * src_pitch;
        let d = row * row_bytes;
        dst[d..d + row_bytes].copy_from_slice(&src[s..s + row_bytes]);
    }
}

#[cfg(test)]
mod tests {
    use super::{pack_rows, BgraFrame};

    #[test]
    fn frame_reports_packing() {
        let data = vec![0u8; 2 * 8];
        let frame = BgraFrame { data: &data, width: 2, height: 2, stride: 8 };
        assert!(frame.is_packed());
        assert_eq!(frame.row_bytes(), 8);

        let padded = vec![0u8; 2 * 12];
        let frame = BgraFrame { data: &padded, width: 2, height: 2, stride: 12 };
        assert!(!frame.is_packed());
    }

    #[test]
    fn pack_rows_strips_padding() {
        // Two rows of 4 payload bytes, 2 bytes padding each
        let src = [1, 2, 3, 4, 0xEE, 0xEE, 5, 6, 7, 8, 0xEE, 0xEE];
        let mut dst = [0u8; 8];
        pack_rows(&src, 6, 4, 2, &mut dst);
        assert_eq!(dst, [1, 2, 3, 4, 5, 6, 7, 8]);
    }

    #[test]
    fn pack_rows_bulk_copies_packed_input() {
        let src = [9u8; 8];
        let mut dst = [0u8; 8];
        pack_rows(&src, 4, 4, 2, &mut dst);
        assert_eq!(dst, src);
    }
}
