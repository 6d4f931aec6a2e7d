//! Raw planar YUV 4:2:0 color and depth streams, 8- to 16-bit,
//! little-endian.
//!
//! Chroma planes are resampled with a plain bilinear filter on read and
//! a 2x2 box filter on write rather than cubic interpolation, since this
//! crate has no image-processing library dependency for that; see
//! DESIGN.md for the resulting non-bit-exactness.

use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use crate::colorspace::{rgb_to_ycbcr, ycbcr_to_rgb, ColorSpace};
use crate::error::{Error, Result};
use crate::view::{ColourPlane, Plane, ScalarPlane};

fn bytes_per_sample(bit_depth: u32) -> Result<usize> {
    match bit_depth {
        1..=8 => Ok(1),
        9..=16 => Ok(2),
        other => Err(Error::config(format!("invalid raw YUV bit depth {other}"))),
    }
}

fn max_level(bit_depth: u32) -> f32 {
    ((1u32 << bit_depth) - 1) as f32
}

fn frame_byte_size(width: usize, height: usize, bpp: usize) -> u64 {
    (width * height * bpp * 3 / 2) as u64
}

fn read_plane_samples(reader: &mut impl Read, width: usize, height: usize, bpp: usize) -> Result<Vec<f32>> {
    let mut raw = vec![0u8; width * height * bpp];
    reader.read_exact(&mut raw).map_err(Error::io_ctx("reading raw YUV plane"))?;
    let samples = if bpp == 1 {
        raw.iter().map(|&b| b as f32).collect()
    } else {
        raw.chunks_exact(2).map(|c| u16::from_le_bytes([c[0], c[1]]) as f32).collect()
    };
    Ok(samples)
}

fn write_plane_samples(writer: &mut impl Write, samples: &[f32], bit_depth: u32) -> Result<()> {
    let level = max_level(bit_depth);
    if bytes_per_sample(bit_depth)? == 1 {
        let raw: Vec<u8> = samples.iter().map(|&v| (v.clamp(0.0, 1.0) * level).round() as u8).collect();
        writer.write_all(&raw).map_err(Error::io_ctx("writing raw YUV plane"))?;
    } else {
        let mut raw = Vec::with_capacity(samples.len() * 2);
        for &v in samples {
            raw.extend_from_slice(&((v.clamp(0.0, 1.0) * level).round() as u16).to_le_bytes());
        }
        writer.write_all(&raw).map_err(Error::io_ctx("writing raw YUV plane"))?;
    }
    Ok(())
}

/// Bilinear-upsamples a `(w+1)/2 x (h+1)/2` chroma plane back to `w x h`.
fn upsample_half(half: &[f32], half_w: usize, half_h: usize, w: usize, h: usize) -> Vec<f32> {
    let mut out = vec![0.0f32; w * h];
    for y in 0..h {
        let sy = ((y as f32 + 0.5) / 2.0 - 0.5).clamp(0.0, (half_h.max(1) - 1) as f32);
        let y0 = sy.floor() as usize;
        let y1 = (y0 + 1).min(half_h - 1);
        let fy = sy - y0 as f32;
        for x in 0..w {
            let sx = ((x as f32 + 0.5) / 2.0 - 0.5).clamp(0.0, (half_w.max(1) - 1) as f32);
            let x0 = sx.floor() as usize;
            let x1 = (x0 + 1).min(half_w - 1);
            let fx = sx - x0 as f32;

            let v00 = half[y0 * half_w + x0];
            let v01 = half[y0 * half_w + x1];
            let v10 = half[y1 * half_w + x0];
            let v11 = half[y1 * half_w + x1];
            let top = v00 * (1.0 - fx) + v01 * fx;
            let bot = v10 * (1.0 - fx) + v11 * fx;
            out[y * w + x] = top * (1.0 - fy) + bot * fy;
        }
    }
    out
}

/// Box-downsamples a `w x h` chroma plane to `(w+1)/2 x (h+1)/2`.
fn downsample_half(full: &[f32], w: usize, h: usize) -> (Vec<f32>, usize, usize) {
    let half_w = w.div_ceil(2);
    let half_h = h.div_ceil(2);
    let mut out = vec![0.0f32; half_w * half_h];
    for hy in 0..half_h {
        for hx in 0..half_w {
            let mut sum = 0.0f32;
            let mut count = 0.0f32;
            for dy in 0..2 {
                for dx in 0..2 {
                    let y = hy * 2 + dy;
                    let x = hx * 2 + dx;
                    if y < h && x < w {
                        sum += full[y * w + x];
                        count += 1.0;
                    }
                }
            }
            out[hy * half_w + hx] = sum / count;
        }
    }
    (out, half_w, half_h)
}

/// Reads one frame of planar YUV 4:2:0 color from a raw stream, converting
/// into `space`'s working representation.
pub fn load_color(
    reader: &mut (impl Read + Seek),
    width: usize,
    height: usize,
    bit_depth: u32,
    frame: usize,
    space: ColorSpace,
) -> Result<ColourPlane> {
    let bpp = bytes_per_sample(bit_depth)?;
    reader
        .seek(SeekFrom::Start(frame as u64 * frame_byte_size(width, height, bpp)))
        .map_err(Error::io_ctx("seeking to YUV frame"))?;

    let y_plane = read_plane_samples(reader, width, height, bpp)?;
    let half_w = width.div_ceil(2);
    let half_h = height.div_ceil(2);
    let cb_half = read_plane_samples(reader, half_w, half_h, bpp)?;
    let cr_half = read_plane_samples(reader, half_w, half_h, bpp)?;

    let level = max_level(bit_depth);
    let cb_full = upsample_half(&cb_half, half_w, half_h, width, height);
    let cr_full = upsample_half(&cr_half, half_w, half_h, width, height);

    let mut plane = Plane::filled(width, height, [0.0f32; 3]);
    for y in 0..height {
        for x in 0..width {
            let idx = y * width + x;
            let ycbcr = [y_plane[idx] / level, cb_full[idx] / level, cr_full[idx] / level];
            let out = match space {
                ColorSpace::Yuv => ycbcr,
                ColorSpace::Rgb => ycbcr_to_rgb(ycbcr),
            };
            plane.set(y, x, out);
        }
    }
    Ok(plane)
}

/// Writes one frame of planar YUV 4:2:0 color to a raw stream (append-only;
/// callers open in append mode to build up a multi-frame sequence).
pub fn save_color(writer: &mut impl Write, colour: &ColourPlane, bit_depth: u32, space: ColorSpace) -> Result<()> {
    let w = colour.width();
    let h = colour.height();
    let level = max_level(bit_depth);

    let mut y_plane = vec![0.0f32; w * h];
    let mut cb_plane = vec![0.0f32; w * h];
    let mut cr_plane = vec![0.0f32; w * h];
    for y in 0..h {
        for x in 0..w {
            let c = colour.get(y, x);
            let ycbcr = match space {
                ColorSpace::Yuv => c,
                ColorSpace::Rgb => rgb_to_ycbcr(c),
            };
            let idx = y * w + x;
            y_plane[idx] = ycbcr[0] * level;
            cb_plane[idx] = ycbcr[1] * level;
            cr_plane[idx] = ycbcr[2] * level;
        }
    }

    let (cb_half, _, _) = downsample_half(&cb_plane, w, h);
    let (cr_half, _, _) = downsample_half(&cr_plane, w, h);

    write_plane_samples(writer, &y_plane.iter().map(|v| v / level).collect::<Vec<_>>(), bit_depth)?;
    write_plane_samples(writer, &cb_half.iter().map(|v| v / level).collect::<Vec<_>>(), bit_depth)?;
    write_plane_samples(writer, &cr_half.iter().map(|v| v / level).collect::<Vec<_>>(), bit_depth)?;
    Ok(())
}

/// Reads one frame of a raw disparity stream and linearizes it to depth via
/// `depth = (z_far * z_near) / (z_near + v * (z_far - z_near))`, with
/// exact-zero samples mapped to `NaN` (marks an explicitly invalid pixel,
/// matching the reference convention).
pub fn load_depth(
    reader: &mut (impl Read + Seek),
    width: usize,
    height: usize,
    bit_depth: u32,
    z_near: f32,
    z_far: f32,
    frame: usize,
) -> Result<ScalarPlane> {
    let bpp = bytes_per_sample(bit_depth)?;
    reader
        .seek(SeekFrom::Start(frame as u64 * frame_byte_size(width, height, bpp)))
        .map_err(Error::io_ctx("seeking to YUV depth frame"))?;

    let raw = read_plane_samples(reader, width, height, bpp)?;
    let level = max_level(bit_depth);
    let mut plane = Plane::filled(width, height, 0.0f32);
    for y in 0..height {
        for x in 0..width {
            let v = raw[y * width + x];
            let depth = if v == 0.0 {
                f32::NAN
            } else {
                let disparity = v / level;
                (z_far * z_near) / (z_near + disparity * (z_far - z_near))
            };
            plane.set(y, x, depth);
        }
    }
    Ok(plane)
}

pub fn load_color_file(
    path: impl AsRef<Path>,
    width: usize,
    height: usize,
    bit_depth: u32,
    frame: usize,
    space: ColorSpace,
) -> Result<ColourPlane> {
    let path = path.as_ref();
    let mut file = std::fs::File::open(path).map_err(Error::io_ctx(format!("opening {path:?}")))?;
    load_color(&mut file, width, height, bit_depth, frame, space)
}

pub fn load_depth_file(
    path: impl AsRef<Path>,
    width: usize,
    height: usize,
    bit_depth: u32,
    z_near: f32,
    z_far: f32,
    frame: usize,
) -> Result<ScalarPlane> {
    let path = path.as_ref();
    let mut file = std::fs::File::open(path).map_err(Error::io_ctx(format!("opening {path:?}")))?;
    load_depth(&mut file, width, height, bit_depth, z_near, z_far, frame)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn write_test_frame(w: usize, h: usize, y: u8, cb: u8, cr: u8) -> Vec<u8> {
        let mut buf = vec![y; w * h];
        let half = w.div_ceil(2) * h.div_ceil(2);
        buf.extend(vec![cb; half]);
        buf.extend(vec![cr; half]);
        buf
    }

    #[test]
    fn flat_frame_round_trips_through_yuv_working_space() {
        let data = write_test_frame(4, 4, 128, 64, 192);
        let mut cursor = Cursor::new(data);
        let plane = load_color(&mut cursor, 4, 4, 8, 0, ColorSpace::Yuv).unwrap();
        let c = plane.get(2, 2);
        assert!((c[0] - 128.0 / 255.0).abs() < 1e-5);
        assert!((c[1] - 64.0 / 255.0).abs() < 1e-3);
        assert!((c[2] - 192.0 / 255.0).abs() < 1e-3);
    }

    #[test]
    fn zero_disparity_sample_maps_to_nan() {
        let mut data = vec![0u8; 4 * 4 * 3 / 2];
        data[0] = 0;
        data[1] = 200;
        let mut cursor = Cursor::new(data);
        let depth = load_depth(&mut cursor, 4, 4, 8, 1.0, 10.0, 0).unwrap();
        assert!(depth.get(0, 0).is_nan());
        assert!(depth.get(0, 1).is_finite());
    }

    #[test]
    fn color_round_trip_through_save_and_load() {
        let mut colour = Plane::filled(4, 4, [0.2f32, 0.4, 0.6]);
        colour.set(0, 0, [0.9, 0.1, 0.3]);
        let mut buf = Vec::new();
        save_color(&mut buf, &colour, 8, ColorSpace::Rgb).unwrap();
        let mut cursor = Cursor::new(buf);
        let back = load_color(&mut cursor, 4, 4, 8, 0, ColorSpace::Rgb).unwrap();
        for y in 0..4 {
            for x in 0..4 {
                let a = colour.get(y, x);
                let b = back.get(y, x);
                for i in 0..3 {
                    assert!((a[i] - b[i]).abs() < 0.05, "{a:?} vs {b:?}");
                }
            }
        }
    }
}
