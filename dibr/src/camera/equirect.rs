//! Equirectangular (360°, ERP) projector.
//!
//! Depth here is a *radius* (distance from the camera), not the
//! camera-forward coordinate the perspective projector uses.

use std::f32::consts::PI;

use crate::geometry::Vec3;

use super::WrappingMethod;

/// Clamp applied to the row coordinate before it feeds `theta`, avoiding
/// the degenerate longitude at the exact poles ("special clamp
/// at the poles so rows 0 and H−1 use i+ε and (H − ε)").
const POLE_EPS: f32 = 1e-3;

#[derive(Clone, Copy, Debug)]
pub struct Equirect {
    width: f32,
    height: f32,
    /// `W_full = max(W, 2H)`, the width a full 360° sweep would have.
    w_full: f32,
    /// `(W_full - W) / 2`.
    offset: f32,
    wrap: WrappingMethod,
}

impl Equirect {
    pub fn new(width: usize, height: usize, phi_range: (f32, f32), _theta_range: (f32, f32)) -> Self {
        let width_f = width as f32;
        let height_f = height as f32;
        let w_full = width_f.max(2.0 * height_f);
        let offset = (w_full - width_f) / 2.0;

        let span = (phi_range.1 - phi_range.0).abs();
        let wrap = if span >= 2.0 * PI - 1e-3 {
            WrappingMethod::Horizontal
        } else {
            WrappingMethod::None
        };

        Self {
            width: width_f,
            height: height_f,
            w_full,
            offset,
            wrap,
        }
    }

    pub fn wrapping(self) -> WrappingMethod {
        self.wrap
    }

    /// `phi = 2π(0.5 - (offset + u) / W_full)`, `theta = π(0.5 - v / H)`
    /// (pole-clamped), direction `(cosφ·cosθ, sinφ·cosθ, sinθ)` scaled by
    /// `depth` (the radius).
    #[inline]
    pub fn unproject(self, u: f32, v: f32, depth: f32) -> Vec3 {
        let phi = 2.0 * PI * (0.5 - (self.offset + u) / self.w_full);
        let v_clamped = v.clamp(POLE_EPS, self.height - POLE_EPS);
        let theta = PI * (0.5 - v_clamped / self.height);

        let (sin_phi, cos_phi) = phi.sin_cos();
        let (sin_theta, cos_theta) = theta.sin_cos();

        Vec3::new(
            cos_phi * cos_theta * depth,
            sin_phi * cos_theta * depth,
            sin_theta * depth,
        )
    }

    /// `radius = ‖xyz‖`, `(φ, θ) = (atan2(y, x), asin(z / radius))`, image
    /// coordinates via the inverse of [`Self::unproject`]'s mapping.
    #[inline]
    pub fn project(self, p: Vec3) -> (f32, f32, f32) {
        let radius = p.norm();
        if !(radius > 0.0) {
            return (f32::NAN, f32::NAN, f32::NAN);
        }

        let phi = p.y.atan2(p.x);
        let theta = (p.z / radius).asin();

        let u = self.w_full * (0.5 - phi / (2.0 * PI)) - self.offset;
        let v = self.height * (0.5 - theta / PI);

        (u, v, radius)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_identity() {
        let proj = Equirect::new(4096, 2048, (-PI, PI), (-PI / 2.0, PI / 2.0));
        for (u, v, d) in [(2048.0, 1024.0, 3.0), (100.0, 500.0, 1.5), (3800.0, 1800.0, 2.2)] {
            let xyz = proj.unproject(u, v, d);
            let (u2, v2, d2) = proj.project(xyz);
            assert!((u - u2).abs() < 1e-2, "{u} vs {u2}");
            assert!((v - v2).abs() < 1e-2, "{v} vs {v2}");
            assert!((d - d2).abs() < 1e-3, "{d} vs {d2}");
        }
    }

    #[test]
    fn full_sweep_wraps_horizontally() {
        let proj = Equirect::new(4096, 2048, (-PI, PI), (-PI / 2.0, PI / 2.0));
        assert_eq!(proj.wrapping(), WrappingMethod::Horizontal);
    }
}
