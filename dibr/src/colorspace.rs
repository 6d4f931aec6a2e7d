//! Linear RGB <-> Y'CbCr (ITU-R BT.601) conversion. The internal working
//! colour space is a process-wide, read-only setting threaded
//! through function signatures rather than read from a hidden global.

use serde::Deserialize;

/// The colour space in which blending and inpainting arithmetic is
/// performed, distinct from the on-disk encoding.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
pub enum ColorSpace {
    #[serde(rename = "YUV")]
    Yuv,
    #[serde(rename = "RGB")]
    Rgb,
}

impl Default for ColorSpace {
    fn default() -> Self {
        ColorSpace::Yuv
    }
}

const KR: f32 = 0.299;
const KB: f32 = 0.114;
const KG: f32 = 1.0 - KR - KB;

/// `[r, g, b]` in `[0, 1]` to `[y, cb, cr]` in `[0, 1]` (BT.601, `cb`/`cr`
/// offset by 0.5).
pub fn rgb_to_ycbcr([r, g, b]: [f32; 3]) -> [f32; 3] {
    let y = KR * r + KG * g + KB * b;
    let cb = 0.5 * (b - y) / (1.0 - KB) + 0.5;
    let cr = 0.5 * (r - y) / (1.0 - KR) + 0.5;
    [y, cb, cr]
}

/// Inverse of [`rgb_to_ycbcr`], lossless round-trip within float epsilon.
pub fn ycbcr_to_rgb([y, cb, cr]: [f32; 3]) -> [f32; 3] {
    let r = y + (cr - 0.5) * 2.0 * (1.0 - KR);
    let b = y + (cb - 0.5) * 2.0 * (1.0 - KB);
    let g = (y - KR * r - KB * b) / KG;
    [r, g, b]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_is_lossless() {
        for rgb in [[0.0, 0.0, 0.0], [1.0, 1.0, 1.0], [0.2, 0.7, 0.9], [1.0, 0.0, 0.3]] {
            let back = ycbcr_to_rgb(rgb_to_ycbcr(rgb));
            for i in 0..3 {
                assert!((rgb[i] - back[i]).abs() < 1e-5, "{rgb:?} -> {back:?}");
            }
        }
    }
}
