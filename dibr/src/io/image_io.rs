//! Single-frame image I/O: PNG (8/16-bit, via the `image` crate) and
//! OpenEXR (32-bit float, via the `exr` crate).

use std::path::Path;

use image::{DynamicImage, ImageBuffer, Rgb};

use crate::error::{Error, Result};
use crate::view::{ColourPlane, Plane};

/// Loads an 8- or 16-bit PNG into a `[0, 1]`-range colour plane.
pub fn load_png(path: impl AsRef<Path>) -> Result<ColourPlane> {
    let path = path.as_ref();
    let img = image::ImageReader::open(path)
        .map_err(Error::io_ctx(format!("opening {path:?}")))?
        .decode()?;

    let (w, h) = (img.width() as usize, img.height() as usize);
    let mut plane = Plane::filled(w, h, [0.0f32; 3]);

    // `image`'s `DynamicImage` doesn't expose a single generic "widest
    // sample type" accessor, so branch on 16-bit vs 8-bit explicitly.
    if let Some(buf16) = img.as_rgb16() {
        for y in 0..h {
            for x in 0..w {
                let p = buf16.get_pixel(x as u32, y as u32);
                plane.set(
                    y,
                    x,
                    [p[0] as f32 / 65535.0, p[1] as f32 / 65535.0, p[2] as f32 / 65535.0],
                );
            }
        }
    } else {
        let buf8 = img.to_rgb8();
        for y in 0..h {
            for x in 0..w {
                let p = buf8.get_pixel(x as u32, y as u32);
                plane.set(y, x, [p[0] as f32 / 255.0, p[1] as f32 / 255.0, p[2] as f32 / 255.0]);
            }
        }
    }

    Ok(plane)
}

/// Writes a colour plane (values expected in `[0, 1]`, out-of-range
/// clamped) as an 8- or 16-bit PNG.
pub fn save_png(path: impl AsRef<Path>, colour: &ColourPlane, bit_depth: u32) -> Result<()> {
    let path = path.as_ref();
    let (w, h) = (colour.width() as u32, colour.height() as u32);

    if bit_depth > 8 {
        let mut buf = ImageBuffer::<Rgb<u16>, _>::new(w, h);
        for y in 0..h {
            for x in 0..w {
                let c = colour.get(y as usize, x as usize);
                buf.put_pixel(x, y, Rgb(c.map(|v| (v.clamp(0.0, 1.0) * 65535.0).round() as u16)));
            }
        }
        buf.save(path).map_err(|e| Error::Other(format!("saving {path:?}: {e}")))
    } else {
        let mut buf = ImageBuffer::<Rgb<u8>, _>::new(w, h);
        for y in 0..h {
            for x in 0..w {
                let c = colour.get(y as usize, x as usize);
                buf.put_pixel(x, y, Rgb(c.map(|v| (v.clamp(0.0, 1.0) * 255.0).round() as u8)));
            }
        }
        buf.save(path).map_err(|e| Error::Other(format!("saving {path:?}: {e}")))
    }
}

/// Loads a 32-bit-float OpenEXR image into a colour plane.
pub fn load_exr(path: impl AsRef<Path>) -> Result<ColourPlane> {
    use exr::prelude::*;
    let path = path.as_ref();
    let image = read_first_rgba_layer_from_file(
        path,
        |resolution, _| {
            let w = resolution.width();
            let h = resolution.height();
            Plane::filled(w, h, [0.0f32; 3])
        },
        |plane: &mut ColourPlane, pos, (r, g, b, _a): (f32, f32, f32, f32)| {
            plane.set(pos.y(), pos.x(), [r, g, b]);
        },
    )
    .map_err(|e| Error::Other(format!("reading EXR {path:?}: {e}")))?;

    Ok(image.layer_data.channel_data.pixels)
}

/// Writes a colour plane as a 32-bit-float OpenEXR image.
pub fn save_exr(path: impl AsRef<Path>, colour: &ColourPlane) -> Result<()> {
    use exr::prelude::*;
    let path = path.as_ref();
    let w = colour.width();
    let h = colour.height();

    let channels = SpecificChannels::rgb(|pos: Vec2<usize>| {
        let c = colour.get(pos.y(), pos.x());
        (c[0], c[1], c[2])
    });

    let image = Image::from_channels((w, h), channels);
    image
        .write()
        .to_file(path)
        .map_err(|e| Error::Other(format!("writing EXR {path:?}: {e}")))
}

/// Loads a depth map stored as a 32-bit-float OpenEXR image. Depth is
/// stashed in the red channel by [`save_exr_scalar`]; only that channel is
/// read back.
pub fn load_exr_scalar(path: impl AsRef<Path>) -> Result<crate::view::ScalarPlane> {
    use exr::prelude::*;
    let path = path.as_ref();
    let image = read_first_rgba_layer_from_file(
        path,
        |resolution, _| Plane::filled(resolution.width(), resolution.height(), f32::NAN),
        |plane: &mut crate::view::ScalarPlane, pos, (r, _g, _b, _a): (f32, f32, f32, f32)| {
            plane.set(pos.y(), pos.x(), r);
        },
    )
    .map_err(|e| Error::Other(format!("reading EXR {path:?}: {e}")))?;

    Ok(image.layer_data.channel_data.pixels)
}

/// Writes a depth map as a 32-bit-float OpenEXR image, one value per pixel
/// duplicated into every colour channel so it round-trips through the same
/// RGB codec path as [`save_exr`]/[`load_exr_scalar`].
pub fn save_exr_scalar(path: impl AsRef<Path>, plane: &crate::view::ScalarPlane) -> Result<()> {
    use exr::prelude::*;
    let path = path.as_ref();
    let w = plane.width();
    let h = plane.height();

    let channels = SpecificChannels::rgb(|pos: Vec2<usize>| {
        let v = plane.get(pos.y(), pos.x());
        (v, v, v)
    });

    let image = Image::from_channels((w, h), channels);
    image
        .write()
        .to_file(path)
        .map_err(|e| Error::Other(format!("writing EXR {path:?}: {e}")))
}
