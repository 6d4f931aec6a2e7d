//! Perspective (pinhole) camera projector.
//!
//! Image plane: `u` right, `v` down. World axes `(x forward, y left,
//! z up)`. Depth is the camera-forward coordinate `x`, not a ray length.

use crate::geometry::Vec3;

use super::WrappingMethod;

#[derive(Clone, Copy, Debug)]
pub struct Perspective {
    pub fx: f32,
    pub fy: f32,
    pub px: f32,
    pub py: f32,
}

impl Perspective {
    pub fn new(fx: f32, fy: f32, px: f32, py: f32) -> Self {
        Self { fx, fy, px, py }
    }

    pub fn wrapping(self) -> WrappingMethod {
        WrappingMethod::None
    }

    /// `x = d`, `y = -(d/fx)(u - px)`, `z = -(d/fy)(v - py)`.
    #[inline]
    pub fn unproject(self, u: f32, v: f32, depth: f32) -> Vec3 {
        let x = depth;
        let y = -(depth / self.fx) * (u - self.px);
        let z = -(depth / self.fy) * (v - self.py);
        Vec3::new(x, y, z)
    }

    /// If `x > 0`: `u = -fx*y/x + px`, `v = -fy*z/x + py`, `depth = x`;
    /// otherwise NaN (behind the camera).
    #[inline]
    pub fn project(self, p: Vec3) -> (f32, f32, f32) {
        if p.x > 0.0 {
            let u = -self.fx * p.y / p.x + self.px;
            let v = -self.fy * p.z / p.x + self.py;
            (u, v, p.x)
        } else {
            (f32::NAN, f32::NAN, f32::NAN)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_identity() {
        let proj = Perspective::new(1000.0, 1000.0, 960.0, 540.0);
        for (u, v, d) in [(960.0, 540.0, 2.0), (400.0, 300.0, 5.0), (1500.0, 800.0, 1.2)] {
            let xyz = proj.unproject(u, v, d);
            let (u2, v2, d2) = proj.project(xyz);
            assert!((u - u2).abs() < 1e-3, "{u} vs {u2}");
            assert!((v - v2).abs() < 1e-3, "{v} vs {v2}");
            assert!((d - d2).abs() < 1e-3, "{d} vs {d2}");
        }
    }

    #[test]
    fn behind_camera_is_invalid() {
        let proj = Perspective::new(1000.0, 1000.0, 960.0, 540.0);
        let (u, v, d) = proj.project(Vec3::new(-1.0, 0.0, 0.0));
        assert!(u.is_nan() && v.is_nan() && d.is_nan());
    }
}
