//! Blender: combines multiple [`SynthesizedView`]s from the same
//! virtual camera into one [`BlendedView`], either by direct per-pixel
//! weighting ("Simple") or by splitting into low/high frequency bands and
//! blending each with its own exponent ("Multiband"/MultiSpectral).

use crate::colorspace::{empty_colour, ColorSpace};
use crate::view::{BlendedView, MaskPlane, Plane, ScalarPlane, SynthesizedView};

/// Simple blend: weights `w_i = (Q_i/D_i)^α` (or winner-takes-all for
/// `α < 0`, or flat `w_i = 1` for `0 ≤ α < 0.5`).
pub struct SimpleBlender {
    alpha: f32,
    acc: BlendedView,
}

impl SimpleBlender {
    pub fn new(width: usize, height: usize, alpha: f32, space: ColorSpace) -> Self {
        Self {
            alpha,
            acc: BlendedView::empty(width, height, space),
        }
    }

    fn weight(&self, quality: f32, depth: f32) -> f32 {
        if !(quality > 0.0) || !(depth > 0.0) {
            return 0.0;
        }
        let ratio = quality / depth;
        if self.alpha >= 0.5 {
            ratio.powf(self.alpha)
        } else {
            1.0
        }
    }

    pub fn blend(&mut self, view: &SynthesizedView) {
        if self.acc.empty {
            self.acc.view.colour = view.view.colour.clone();
            self.acc.view.depth = view.view.depth.clone();
            self.acc.view.quality = view.view.quality.clone();
            self.acc.view.validity = view.view.validity.clone();
            self.acc.original_depth = view.original_depth.clone();
            self.acc.empty = false;
            return;
        }

        let w = self.acc.view.width();
        let h = self.acc.view.height();

        for row in 0..h {
            for col in 0..w {
                let c0 = self.acc.view.colour.get(row, col);
                let q0 = self.acc.view.quality.get(row, col);
                let d0 = self.acc.view.depth.get(row, col);
                let orig0 = self.acc.original_depth.get(row, col) != 0;

                let c1 = view.view.colour.get(row, col);
                let q1 = view.view.quality.get(row, col);
                let d1 = view.view.depth.get(row, col);
                let orig1 = view.original_depth.get(row, col) != 0;

                let (colour, depth, quality) = if self.alpha < 0.0 {
                    // Winner-takes-all on raw quality, gated by the
                    // original-vs-prolongated-depth tier: an original-depth
                    // sample always beats a prolongated one regardless of
                    // quality, and only same-tier samples compete on quality.
                    let pick_1 = match (orig0, orig1) {
                        (true, false) => false,
                        (false, true) => true,
                        _ => q1 > q0,
                    };
                    if pick_1 {
                        (c1, d1, q1)
                    } else {
                        (c0, d0, q0)
                    }
                } else {
                    let w0 = self.weight(q0, d0);
                    let w1 = self.weight(q1, d1);
                    let wsum = w0 + w1;
                    if wsum <= 0.0 {
                        (empty_colour(ColorSpace::Rgb), f32::NAN, 0.0)
                    } else {
                        let colour = [
                            (w0 * c0[0] + w1 * c1[0]) / wsum,
                            (w0 * c0[1] + w1 * c1[1]) / wsum,
                            (w0 * c0[2] + w1 * c1[2]) / wsum,
                        ];
                        let d0_fin = if d0.is_finite() { d0 } else { 0.0 };
                        let d1_fin = if d1.is_finite() { d1 } else { 0.0 };
                        let depth = (w0 * d0_fin + w1 * d1_fin) / wsum;
                        let quality = if self.alpha > 0.0 {
                            wsum.powf(1.0 / self.alpha)
                        } else {
                            wsum
                        };
                        (colour, depth, quality)
                    }
                };

                self.acc.view.colour.set(row, col, colour);
                self.acc.view.depth.set(row, col, depth);
                self.acc.view.quality.set(row, col, quality);
                self.acc.view.validity.set(row, col, quality);
                // AND of per-input prolongation masks == OR of per-input
                // original-depth masks.
                self.acc.original_depth.set(row, col, (orig0 || orig1) as u8);
            }
        }
    }

    pub fn into_blended(self) -> BlendedView {
        self.acc
    }

    pub fn blended(&self) -> &BlendedView {
        &self.acc
    }
}

/// Prefix-sum table over a scalar channel, counting only finite,
/// in-mask samples (a prefix-sum table, a.k.a. an "integral image").
struct IntegralImage {
    width: usize,
    height: usize,
    sum: Vec<f64>,
    count: Vec<u32>,
}

impl IntegralImage {
    fn build(values: &ScalarPlane, mask: &MaskPlane) -> Self {
        let w = values.width();
        let h = values.height();
        let mut sum = vec![0f64; (w + 1) * (h + 1)];
        let mut count = vec![0u32; (w + 1) * (h + 1)];
        let stride = w + 1;

        for y in 0..h {
            for x in 0..w {
                let v = values.get(y, x);
                let in_mask = mask.get(y, x) != 0 && v.is_finite();
                let above = sum[y * stride + (x + 1)];
                let left = sum[(y + 1) * stride + x];
                let diag = sum[y * stride + x];
                let val = if in_mask { v as f64 } else { 0.0 };
                sum[(y + 1) * stride + (x + 1)] = val + above + left - diag;

                let above_c = count[y * stride + (x + 1)];
                let left_c = count[(y + 1) * stride + x];
                let diag_c = count[y * stride + x];
                let val_c = in_mask as u32;
                count[(y + 1) * stride + (x + 1)] = val_c + above_c + left_c - diag_c;
            }
        }

        Self {
            width: w,
            height: h,
            sum,
            count,
        }
    }

    /// Mean over the square window of half-size `radius` centred at
    /// `(x, y)`, clipped to the image. Returns `None` if no in-mask finite
    /// sample falls in the window.
    fn window_mean(&self, x: usize, y: usize, radius: usize) -> Option<f32> {
        let stride = self.width + 1;
        let x0 = x.saturating_sub(radius);
        let y0 = y.saturating_sub(radius);
        let x1 = (x + radius + 1).min(self.width);
        let y1 = (y + radius + 1).min(self.height);

        let rect = |arr: &[f64], x0: usize, y0: usize, x1: usize, y1: usize| {
            arr[y1 * stride + x1] - arr[y0 * stride + x1] - arr[y1 * stride + x0] + arr[y0 * stride + x0]
        };
        let rect_c = |arr: &[u32], x0: usize, y0: usize, x1: usize, y1: usize| {
            arr[y1 * stride + x1] as i64 - arr[y0 * stride + x1] as i64 - arr[y1 * stride + x0] as i64
                + arr[y0 * stride + x0] as i64
        };

        let c = rect_c(&self.count, x0, y0, x1, y1);
        if c <= 0 {
            return None;
        }
        let s = rect(&self.sum, x0, y0, x1, y1);
        Some((s / c as f64) as f32)
    }
}

/// Splits `colour` into low/high frequency bands. For
/// `ColorSpace::Yuv` only the luma channel is blurred (chroma's low band
/// is left at zero); for `ColorSpace::Rgb` all three channels are blurred.
fn split_frequencies(
    colour: &Plane<[f32; 3]>,
    mask: &MaskPlane,
    space: ColorSpace,
) -> (Plane<[f32; 3]>, Plane<[f32; 3]>) {
    let w = colour.width();
    let h = colour.height();
    let kernel = (w.max(h) / 20).max(1);
    let radius = kernel / 2;

    let channels_to_blur: &[usize] = match space {
        ColorSpace::Rgb => &[0, 1, 2],
        ColorSpace::Yuv => &[0],
    };

    let mut low = Plane::filled(w, h, [0.0f32; 3]);

    for &ch in channels_to_blur {
        let mut plane = Plane::filled(w, h, 0.0f32);
        for y in 0..h {
            for x in 0..w {
                plane.set(y, x, colour.get(y, x)[ch]);
            }
        }
        let integral = IntegralImage::build(&plane, mask);
        for y in 0..h {
            for x in 0..w {
                let mean = integral.window_mean(x, y, radius).unwrap_or(0.0);
                let mut px = low.get(y, x);
                px[ch] = mean;
                low.set(y, x, px);
            }
        }
    }

    let mut high = Plane::filled(w, h, [0.0f32; 3]);
    for y in 0..h {
        for x in 0..w {
            let c = colour.get(y, x);
            let l = low.get(y, x);
            high.set(y, x, [c[0] - l[0], c[1] - l[1], c[2] - l[2]]);
        }
    }

    (low, high)
}

/// Multiband blend: routes the low/high frequency bands of each incoming
/// view through two independent [`SimpleBlender`]s, then sums their
/// accumulators.
pub struct MultibandBlender {
    space: ColorSpace,
    low: SimpleBlender,
    high: SimpleBlender,
}

impl MultibandBlender {
    pub fn new(width: usize, height: usize, alpha_low: f32, alpha_high: f32, space: ColorSpace) -> Self {
        Self {
            space,
            low: SimpleBlender::new(width, height, alpha_low, space),
            high: SimpleBlender::new(width, height, alpha_high, space),
        }
    }

    pub fn blend(&mut self, view: &SynthesizedView) {
        let mask = view.view.depth_mask();
        let (low_colour, high_colour) = split_frequencies(&view.view.colour, &mask, self.space);

        let mut low_view = view.clone();
        low_view.view.colour = low_colour;
        let mut high_view = view.clone();
        high_view.view.colour = high_colour;

        self.low.blend(&low_view);
        self.high.blend(&high_view);
    }

    pub fn into_blended(self) -> BlendedView {
        let low = self.low.into_blended();
        let high = self.high.into_blended();

        let w = low.view.width();
        let h = low.view.height();
        let mut colour = Plane::filled(w, h, [0.0f32; 3]);
        for y in 0..h {
            for x in 0..w {
                let a = low.view.colour.get(y, x);
                let b = high.view.colour.get(y, x);
                colour.set(y, x, [a[0] + b[0], a[1] + b[1], a[2] + b[2]]);
            }
        }

        BlendedView {
            view: crate::view::View {
                colour,
                depth: high.view.depth,
                quality: high.view.quality,
                validity: high.view.validity,
            },
            original_depth: high.original_depth,
            empty: low.empty && high.empty,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::view::View;

    fn flat_synth(w: usize, h: usize, colour: [f32; 3], quality: f32, depth: f32) -> SynthesizedView {
        SynthesizedView {
            view: View {
                colour: Plane::filled(w, h, colour),
                depth: Plane::filled(w, h, depth),
                quality: Plane::filled(w, h, quality),
                validity: Plane::filled(w, h, quality),
            },
            original_depth: Plane::filled(w, h, 1u8),
        }
    }

    #[test]
    fn first_blend_adopts_view_verbatim() {
        let mut blender = SimpleBlender::new(2, 2, 1.0, ColorSpace::Rgb);
        let v = flat_synth(2, 2, [0.1, 0.2, 0.3], 5.0, 2.0);
        blender.blend(&v);
        let acc = blender.blended();
        assert_eq!(acc.view.colour.get(0, 0), [0.1, 0.2, 0.3]);
    }

    #[test]
    fn higher_quality_dominates_with_alpha_one() {
        let mut blender = SimpleBlender::new(1, 1, 1.0, ColorSpace::Rgb);
        blender.blend(&flat_synth(1, 1, [1.0, 0.0, 0.0], 1.0, 1.0));
        blender.blend(&flat_synth(1, 1, [0.0, 1.0, 0.0], 100.0, 1.0));
        let acc = blender.blended();
        let c = acc.view.colour.get(0, 0);
        assert!(c[1] > c[0]);
    }

    #[test]
    fn multiband_matches_simple_when_exponents_equal() {
        let w = 20;
        let h = 20;
        let v0 = flat_synth(w, h, [0.2, 0.4, 0.6], 3.0, 2.0);
        let v1 = flat_synth(w, h, [0.8, 0.1, 0.3], 7.0, 1.5);

        let mut simple = SimpleBlender::new(w, h, 1.0, ColorSpace::Rgb);
        simple.blend(&v0);
        simple.blend(&v1);
        let simple_out = simple.into_blended();

        let mut multi = MultibandBlender::new(w, h, 1.0, 1.0, ColorSpace::Rgb);
        multi.blend(&v0);
        multi.blend(&v1);
        let multi_out = multi.into_blended();

        for y in 0..h {
            for x in 0..w {
                let a = simple_out.view.colour.get(y, x);
                let b = multi_out.view.colour.get(y, x);
                for ch in 0..3 {
                    assert!((a[ch] - b[ch]).abs() < 1e-2, "{a:?} vs {b:?}");
                }
            }
        }
    }
}
