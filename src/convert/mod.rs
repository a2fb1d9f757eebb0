//! BGRA to planar 4:2:0 conversion
//!
//! Integer BT.601 studio-swing conversion: Y in 16..=235, chroma
//! centred on 128. Each 2x2 block's U and V come from the block's
//! top-left pixel, never from an average, so flat-colour regions stay
//! exact and the per-pixel cost stays at one multiply-add row.

/// Bytes in one I420 frame: a full-resolution Y plane plus
/// quarter-resolution U and V planes.
pub fn i420_size(width: u32, height: u32) -> usize {
    let pixels = width as usize * height as usize;
    pixels + pixels / 2
}

#[inline]
fn luma(r: i32, g: i32, b: i32) -> u8 {
    (((66 * r + 129 * g + 25 * b + 128) >> 8) + 16).clamp(0, 255) as u8
}

#[inline]
fn chroma_u(r: i32, g: i32, b: i32) -> u8 {
    (((-38 * r - 74 * g + 112 * b + 128) >> 8) + 128).clamp(0, 255) as u8
}

#[inline]
fn chroma_v(r: i32, g: i32, b: i32) -> u8 {
    (((112 * r - 94 * g - 18 * b + 128) >> 8) + 128).clamp(0, 255) as u8
}

/// Convert one BGRA frame into I420 planes laid out Y, then U, then V.
///
/// `src` rows are `stride` bytes apart; padding past `width * 4` bytes
/// per row is skipped. `dst` must hold at least
/// [`i420_size`]`(width, height)` bytes, and both dimensions must be
/// even.
pub fn bgra_to_i420(src: &[u8], stride: usize, width: u32, height: u32, dst: &mut [u8]) {
    let w = width as usize;
    let h = height as usize;
    debug_assert!(width % 2 == 0 && height % 2 == 0);
    debug_assert!(stride >= w * 4);
    debug_assert!(src.len() >= stride * h);
    debug_assert!(dst.len() >= i420_size(width, height));

    let (y_plane, uv) = dst.split_at_mut(w * h);
    let (u_plane, v_plane) = uv.split_at_mut(w * h / 4);
    let half_w = w / 2;

    for row in 0..h {
        let src_row = &src[row * stride..row * stride + w * 4];
        let y_row = &mut y_plane[row * w..(row + 1) * w];

        for col in 0..w {
            let px = &src_row[col * 4..col * 4 + 4];
            let (b, g, r) = (px[0] as i32, px[1] as i32, px[2] as i32);
            y_row[col] = luma(r, g, b);

            // Top-left pixel of each 2x2 block carries the chroma
            if row % 2 == 0 && col % 2 == 0 {
                let idx = (row / 2) * half_w + col / 2;
                u_plane[idx] = chroma_u(r, g, b);
                v_plane[idx] = chroma_v(r, g, b);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{bgra_to_i420, i420_size};

    fn convert_solid(b: u8, g: u8, r: u8, width: u32, height: u32) -> Vec<u8> {
        let mut src = Vec::with_capacity((width * height * 4) as usize);
        for _ in 0..width * height {
            src.extend_from_slice(&[b, g, r, 0xFF]);
        }
        let mut dst = vec![0u8; i420_size(width, height)];
        bgra_to_i420(&src, width as usize * 4, width, height, &mut dst);
        dst
    }

    fn planes(frame: &[u8], width: usize, height: usize) -> (&[u8], &[u8], &[u8]) {
        let (y, uv) = frame.split_at(width * height);
        let (u, v) = uv.split_at(width * height / 4);
        (y, u, v)
    }

    #[test]
    fn plane_sizes() {
        assert_eq!(i420_size(2, 2), 6);
        assert_eq!(i420_size(1920, 1080), 1920 * 1080 * 3 / 2);
    }

    #[test]
    fn white_maps_to_studio_peak() {
        let frame = convert_solid(255, 255, 255, 4, 4);
        let (y, u, v) = planes(&frame, 4, 4);
        assert!(y.iter().all(|&p| p == 235));
        assert!(u.iter().all(|&p| p == 128));
        assert!(v.iter().all(|&p| p == 128));
    }

    #[test]
    fn black_maps_to_studio_floor() {
        let frame = convert_solid(0, 0, 0, 4, 4);
        let (y, u, v) = planes(&frame, 4, 4);
        assert!(y.iter().all(|&p| p == 16));
        assert!(u.iter().all(|&p| p == 128));
        assert!(v.iter().all(|&p| p == 128));
    }

    #[test]
    fn primaries_stay_in_range() {
        for (b, g, r, want_y) in [(0, 0, 255u8, 82u8), (0, 255, 0, 145), (255, 0, 0, 41)] {
            let frame = convert_solid(b, g, r, 2, 2);
            let (y, u, v) = planes(&frame, 2, 2);
            assert!(y.iter().all(|&p| p == want_y));
            assert!(u.iter().chain(v.iter()).all(|&p| (16..=240).contains(&p)));
        }
    }

    #[test]
    fn chroma_sampled_from_top_left_of_block() {
        // Top-left pixel blue, other three white: chroma must be pure
        // blue's, with no trace of the white neighbours.
        let mut src = vec![255u8; 2 * 2 * 4];
        src[0] = 255; // B
        src[1] = 0; // G
        src[2] = 0; // R
        let mut dst = vec![0u8; i420_size(2, 2)];
        bgra_to_i420(&src, 8, 2, 2, &mut dst);

        let (_, u, v) = planes(&dst, 2, 2);
        assert_eq!(u, [240]);
        assert_eq!(v, [110]);
    }

    #[test]
    fn padded_rows_are_skipped() {
        // 2x2 white with 4 junk bytes of padding per row
        let stride = 2 * 4 + 4;
        let mut src = vec![0xEEu8; stride * 2];
        for row in 0..2 {
            for col in 0..2 {
                let o = row * stride + col * 4;
                src[o..o + 4].copy_from_slice(&[255, 255, 255, 255]);
            }
        }
        let mut dst = vec![0u8; i420_size(2, 2)];
        bgra_to_i420(&src, stride, 2, 2, &mut dst);

        let (y, u, v) = planes(&dst, 2, 2);
        assert!(y.iter().all(|&p| p == 235));
        assert_eq!(u, [128]);
        assert_eq!(v, [128]);
    }
}
