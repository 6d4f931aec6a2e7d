//! Pipeline controller: drives the whole synthesis run described by a
//! [`Config`] one frame at a time. For every virtual camera, each input is
//! loaded, synthesized against and blended in, then dropped before the
//! next input is loaded — peak memory is one decoded input view plus the
//! blend accumulator, not every input view resident at once.

use std::path::Path;

use tracing::{info, info_span};

use crate::blend::{MultibandBlender, SimpleBlender};
use crate::camera::CameraParams;
use crate::colorspace::ColorSpace;
use crate::config::{BlendingMethod, Config};
use crate::error::{Error, Result};
use crate::geometry::{Mat3, Pose};
use crate::inpaint;
use crate::io::{image_io, yuv};
use crate::synth;
use crate::view::{BlendedView, ColourPlane, ScalarPlane, SynthesizedView};

/// A single input camera's colour and depth, loaded once per frame and
/// reused across every virtual camera.
struct InputView {
    colour: ColourPlane,
    depth: ScalarPlane,
}

enum Blender {
    Simple(SimpleBlender),
    Multiband(MultibandBlender),
}

impl Blender {
    fn new(method: BlendingMethod, width: usize, height: usize, cfg: &Config) -> Self {
        match method {
            BlendingMethod::Simple => Blender::Simple(SimpleBlender::new(width, height, cfg.blending_factor, cfg.color_space)),
            BlendingMethod::MultiSpectral => Blender::Multiband(MultibandBlender::new(
                width,
                height,
                cfg.blending_low_freq_factor.unwrap_or(1.0),
                cfg.blending_high_freq_factor.unwrap_or(1.0),
                cfg.color_space,
            )),
        }
    }

    fn blend(&mut self, view: &SynthesizedView) {
        match self {
            Blender::Simple(b) => b.blend(view),
            Blender::Multiband(b) => b.blend(view),
        }
    }

    fn into_blended(self) -> BlendedView {
        match self {
            Blender::Simple(b) => b.into_blended(),
            Blender::Multiband(b) => b.into_blended(),
        }
    }
}

/// Loads a single-frame colour or depth plane, dispatching on file
/// extension: `.yuv` for raw planar streams, `.exr` for float EXR, anything
/// else for PNG.
fn is_yuv(path: &Path) -> bool {
    path.extension().and_then(|e| e.to_str()).map(|e| e.eq_ignore_ascii_case("yuv")).unwrap_or(false)
}

fn is_exr(path: &Path) -> bool {
    path.extension().and_then(|e| e.to_str()).map(|e| e.eq_ignore_ascii_case("exr")).unwrap_or(false)
}

fn load_input_view(
    colour_path: &Path,
    depth_path: &Path,
    cam: &CameraParams,
    color_space: ColorSpace,
    bit_depth: u32,
    frame: usize,
) -> Result<InputView> {
    let colour = if is_yuv(colour_path) {
        yuv::load_color_file(colour_path, cam.width, cam.height, bit_depth, frame, color_space)
    } else if is_exr(colour_path) {
        image_io::load_exr(colour_path)
    } else {
        image_io::load_png(colour_path)
    }
    .map_err(|e| e.context(format!("loading colour {colour_path:?}")))?;

    let depth = if is_yuv(depth_path) {
        yuv::load_depth_file(depth_path, cam.width, cam.height, bit_depth, cam.z_near, cam.z_far, frame)
    } else if is_exr(depth_path) {
        image_io::load_exr_scalar(depth_path)
    } else {
        image_io::load_png(depth_path).map(|plane| {
            let mut out = crate::view::Plane::filled(plane.width(), plane.height(), f32::NAN);
            for y in 0..plane.height() {
                for x in 0..plane.width() {
                    out.set(y, x, plane.get(y, x)[0]);
                }
            }
            out
        })
    }
    .map_err(|e| e.context(format!("loading depth {depth_path:?}")))?;

    Ok(InputView { colour, depth })
}

fn save_color_output(path: &Path, colour: &ColourPlane, bit_depth: u32, space: ColorSpace) -> Result<()> {
    if is_yuv(path) {
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(Error::io_ctx(format!("opening {path:?}")))?;
        yuv::save_color(&mut file, colour, bit_depth, space)
    } else if is_exr(path) {
        image_io::save_exr(path, colour)
    } else {
        image_io::save_png(path, colour, bit_depth)
    }
}

/// Box-resamples `src` down to `(dst_w, dst_h)`, matching OpenCV's
/// `INTER_AREA` semantics used to bring an oversampled synthesis result
/// back to the virtual camera's nominal resolution.
fn downscale(src: &ColourPlane, dst_w: usize, dst_h: usize) -> ColourPlane {
    let src_w = src.width();
    let src_h = src.height();
    if src_w == dst_w && src_h == dst_h {
        return src.clone();
    }
    let mut dst = crate::view::Plane::filled(dst_w, dst_h, [0.0f32; 3]);
    for dy in 0..dst_h {
        let y0 = dy * src_h / dst_h;
        let y1 = ((dy + 1) * src_h).div_ceil(dst_h).max(y0 + 1).min(src_h);
        for dx in 0..dst_w {
            let x0 = dx * src_w / dst_w;
            let x1 = ((dx + 1) * src_w).div_ceil(dst_w).max(x0 + 1).min(src_w);

            let mut sum = [0.0f32; 3];
            let mut count = 0.0f32;
            for y in y0..y1 {
                for x in x0..x1 {
                    let c = src.get(y, x);
                    sum[0] += c[0];
                    sum[1] += c[1];
                    sum[2] += c[2];
                    count += 1.0;
                }
            }
            dst.set(dy, dx, [sum[0] / count, sum[1] / count, sum[2] / count]);
        }
    }
    dst
}

fn downscale_mask(src: &crate::view::MaskPlane, dst_w: usize, dst_h: usize) -> crate::view::MaskPlane {
    let src_w = src.width();
    let src_h = src.height();
    let mut dst = crate::view::Plane::filled(dst_w, dst_h, 0u8);
    for dy in 0..dst_h {
        let sy = (dy * src_h / dst_h).min(src_h.saturating_sub(1));
        for dx in 0..dst_w {
            let sx = (dx * src_w / dst_w).min(src_w.saturating_sub(1));
            dst.set(dy, dx, src.get(sy, sx));
        }
    }
    dst
}

/// A fully loaded, ready-to-run synthesis pipeline.
pub struct Pipeline {
    config: Config,
}

impl Pipeline {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let config = Config::open(path)?;
        Ok(Self { config })
    }

    pub fn from_config(config: Config) -> Self {
        Self { config }
    }

    /// Runs every configured frame to completion.
    pub fn run(&self) -> Result<()> {
        for offset in 0..self.config.number_of_frames {
            let frame = self.config.start_frame + offset;
            let _span = info_span!("frame", frame).entered();
            info!("synthesizing frame {frame}");
            self.run_frame(frame, offset)
                .map_err(|e| e.context(Error::pipeline_ctx(frame, "*", None, "run_frame")))?;
        }
        Ok(())
    }

    fn run_frame(&self, frame: u32, offset: u32) -> Result<()> {
        let cfg = &self.config;
        for (vc_idx, virtual_cam) in cfg.virtual_cameras.iter().enumerate() {
            let _span = info_span!("virtual_camera", name = %virtual_cam.name).entered();
            self.run_virtual_camera(frame, offset, vc_idx, virtual_cam)
                .map_err(|e| e.context(Error::pipeline_ctx(frame, &virtual_cam.name, None, "run_virtual_camera")))?;
        }
        Ok(())
    }

    fn run_virtual_camera(&self, frame: u32, offset: u32, vc_idx: usize, virtual_cam: &CameraParams) -> Result<()> {
        let cfg = &self.config;
        let bit_depth_color = 8;
        tracing::debug!(frame, vc_idx, "synthesizing virtual camera");

        let rebased_cam;
        let virtual_cam = if let Some(trace) = &cfg.pose_trace {
            let delta = trace.get(offset as usize).ok_or_else(|| {
                Error::Internal(format!("pose trace has no entry for frame offset {offset}"))
            })?;
            rebased_cam = CameraParams {
                pose: Pose {
                    rotation: delta.rotation.mul_mat(virtual_cam.pose.rotation),
                    translation: delta.translation.add(virtual_cam.pose.translation),
                },
                ..virtual_cam.clone()
            };
            &rebased_cam
        } else {
            virtual_cam
        };

        let oversample = cfg.precision;
        let mut blender = Blender::new(cfg.blending_method, virtual_cam.width, virtual_cam.height, cfg);

        for (input_idx, input_cam) in cfg.input_cameras.iter().enumerate() {
            // Loaded fresh per virtual camera and dropped at the end of this
            // iteration, rather than kept resident for the whole frame, so
            // peak memory stays at one decoded input view plus the
            // accumulator.
            let input_view = load_input_view(
                &cfg.view_image_names[input_idx],
                &cfg.depth_map_names[input_idx],
                input_cam,
                cfg.color_space,
                bit_depth_color,
                offset as usize,
            )
            .map_err(|e| {
                e.context(Error::pipeline_ctx(frame, &virtual_cam.name, Some(&input_cam.name), "load_input_view"))
            })?;

            let synthesized =
                synth::synthesize(&input_view.colour, &input_view.depth, None, input_cam, virtual_cam, oversample);
            blender.blend(&synthesized);
        }

        let blended = blender.into_blended();
        let inpaint_mask = blended.view.inpaint_mask();
        let holes = inpaint_mask.as_slice().iter().filter(|&&m| m != 0).count();
        let total = inpaint_mask.width() * inpaint_mask.height();
        if holes > 0 {
            tracing::debug!(
                holes,
                total,
                coverage_pct = 100.0 * holes as f32 / total as f32,
                "inpainting holes before fill"
            );
        }
        let mut colour = blended.view.colour.clone();
        inpaint::inpaint(&mut colour, &inpaint_mask);

        let colour = downscale(&colour, virtual_cam.width, virtual_cam.height);

        if let Some(Some(path)) = cfg.output_files.get(vc_idx) {
            save_color_output(path, &colour, 8, cfg.color_space)
                .map_err(|e| e.context(format!("writing color output {path:?}")))?;
        }

        if let Some(Some(path)) = cfg.depth_output_files.get(vc_idx) {
            let depth = downscale_scalar(&blended.view.depth, virtual_cam.width, virtual_cam.height);
            image_io::save_exr_scalar(path, &depth).map_err(|e| e.context(format!("writing depth output {path:?}")))?;
        }

        if let Some(threshold) = cfg.validity_threshold {
            let validity_mask = blended.view.validity_mask(threshold);
            let validity_mask = downscale_mask(&validity_mask, virtual_cam.width, virtual_cam.height);

            if let Some(Some(path)) = cfg.output_masks.get(vc_idx) {
                save_mask_png(path, &validity_mask)?;
            }

            if let Some(Some(path)) = cfg.masked_output_files.get(vc_idx) {
                let mut masked = colour.clone();
                for y in 0..masked.height() {
                    for x in 0..masked.width() {
                        if validity_mask.get(y, x) != 0 {
                            masked.set(y, x, [0.5, 0.5, 0.5]);
                        }
                    }
                }
                save_color_output(path, &masked, 8, cfg.color_space)
                    .map_err(|e| e.context(format!("writing masked color output {path:?}")))?;
            }
        }

        Ok(())
    }
}

fn downscale_scalar(src: &ScalarPlane, dst_w: usize, dst_h: usize) -> ScalarPlane {
    let src_w = src.width();
    let src_h = src.height();
    if src_w == dst_w && src_h == dst_h {
        return src.clone();
    }
    let mut dst = crate::view::Plane::filled(dst_w, dst_h, f32::NAN);
    for dy in 0..dst_h {
        let y0 = dy * src_h / dst_h;
        let y1 = ((dy + 1) * src_h).div_ceil(dst_h).max(y0 + 1).min(src_h);
        for dx in 0..dst_w {
            let x0 = dx * src_w / dst_w;
            let x1 = ((dx + 1) * src_w).div_ceil(dst_w).max(x0 + 1).min(src_w);

            let mut sum = 0.0f32;
            let mut count = 0.0f32;
            for y in y0..y1 {
                for x in x0..x1 {
                    let v = src.get(y, x);
                    if v.is_finite() {
                        sum += v;
                        count += 1.0;
                    }
                }
            }
            dst.set(dy, dx, if count > 0.0 { sum / count } else { f32::NAN });
        }
    }
    dst
}

fn save_mask_png(path: &Path, mask: &crate::view::MaskPlane) -> Result<()> {
    let mut colour = crate::view::Plane::filled(mask.width(), mask.height(), [0.0f32; 3]);
    for y in 0..mask.height() {
        for x in 0..mask.width() {
            let v = if mask.get(y, x) != 0 { 1.0 } else { 0.0 };
            colour.set(y, x, [v, v, v]);
        }
    }
    image_io::save_png(path, &colour, 8).map_err(|e| e.context(format!("writing mask {path:?}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn downscale_averages_a_2x_block() {
        let mut src = crate::view::Plane::filled(4, 4, [0.0f32; 3]);
        src.set(0, 0, [1.0, 0.0, 0.0]);
        src.set(0, 1, [0.0, 1.0, 0.0]);
        src.set(1, 0, [0.0, 0.0, 1.0]);
        src.set(1, 1, [1.0, 1.0, 1.0]);
        let dst = downscale(&src, 2, 2);
        let c = dst.get(0, 0);
        assert!((c[0] - 0.5).abs() < 1e-6);
        assert!((c[1] - 0.5).abs() < 1e-6);
        assert!((c[2] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn downscale_is_noop_at_same_resolution() {
        let src = crate::view::Plane::filled(3, 3, [0.2f32, 0.4, 0.6]);
        let dst = downscale(&src, 3, 3);
        assert_eq!(dst.get(1, 1), src.get(1, 1));
    }
}
