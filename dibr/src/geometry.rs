//! 3-vectors and 3x3 rotation matrices in the OMAF referential (x forward,
//! y left, z up). No external dependencies: the corpus leans on `glam` for
//! this when a GPU pipeline is in the picture, but the core synthesis
//! kernels here touch every element individually (rasterizer barycentrics,
//! per-pixel unprojection), so plain arrays read and optimize better than a
//! SIMD vector type would.

/// A point or direction in 3-space.
#[derive(Clone, Copy, Debug, PartialEq, Default)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    pub const NAN: Vec3 = Vec3 {
        x: f32::NAN,
        y: f32::NAN,
        z: f32::NAN,
    };

    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    pub fn is_finite(self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }

    pub fn dot(self, rhs: Vec3) -> f32 {
        self.x * rhs.x + self.y * rhs.y + self.z * rhs.z
    }

    pub fn norm(self) -> f32 {
        self.dot(self).sqrt()
    }

    pub fn add(self, rhs: Vec3) -> Vec3 {
        Vec3::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }

    pub fn sub(self, rhs: Vec3) -> Vec3 {
        Vec3::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }

    pub fn scale(self, s: f32) -> Vec3 {
        Vec3::new(self.x * s, self.y * s, self.z * s)
    }
}

/// Row-major 3x3 matrix.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Mat3 {
    pub rows: [[f32; 3]; 3],
}

impl Mat3 {
    pub const IDENTITY: Mat3 = Mat3 {
        rows: [[1., 0., 0.], [0., 1., 0.], [0., 0., 1.]],
    };

    /// Builds a rotation matrix from yaw/pitch/roll in **radians**, using
    /// the same intrinsic Z (yaw) - Y (pitch) - X (roll) convention as the
    /// reference renderer's camera-parameter files (angles given in
    /// degrees on disk, converted to radians at config-load time).
    pub fn from_euler_zyx(yaw: f32, pitch: f32, roll: f32) -> Self {
        let (sy, cy) = yaw.sin_cos();
        let (sp, cp) = pitch.sin_cos();
        let (sr, cr) = roll.sin_cos();

        // R = Rz(yaw) * Ry(pitch) * Rx(roll)
        Mat3 {
            rows: [
                [cy * cp, cy * sp * sr - sy * cr, cy * sp * cr + sy * sr],
                [sy * cp, sy * sp * sr + cy * cr, sy * sp * cr - cy * sr],
                [-sp, cp * sr, cp * cr],
            ],
        }
    }

    pub fn transpose(self) -> Mat3 {
        let r = self.rows;
        Mat3 {
            rows: [
                [r[0][0], r[1][0], r[2][0]],
                [r[0][1], r[1][1], r[2][1]],
                [r[0][2], r[1][2], r[2][2]],
            ],
        }
    }

    pub fn mul_vec(self, v: Vec3) -> Vec3 {
        let r = self.rows;
        Vec3::new(
            r[0][0] * v.x + r[0][1] * v.y + r[0][2] * v.z,
            r[1][0] * v.x + r[1][1] * v.y + r[1][2] * v.z,
            r[2][0] * v.x + r[2][1] * v.y + r[2][2] * v.z,
        )
    }

    pub fn mul_mat(self, rhs: Mat3) -> Mat3 {
        let mut rows = [[0f32; 3]; 3];
        for i in 0..3 {
            for j in 0..3 {
                rows[i][j] = (0..3).map(|k| self.rows[i][k] * rhs.rows[k][j]).sum();
            }
        }
        Mat3 { rows }
    }
}

/// A rigid pose: rotation followed by translation, `x -> R*x + t`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Pose {
    pub rotation: Mat3,
    pub translation: Vec3,
}

impl Pose {
    pub const IDENTITY: Pose = Pose {
        rotation: Mat3::IDENTITY,
        translation: Vec3::new(0., 0., 0.),
    };

    pub fn apply(self, v: Vec3) -> Vec3 {
        self.rotation.mul_vec(v).add(self.translation)
    }
}

/// Relative pose transforming input-view world coordinates into
/// virtual-view world coordinates: `R = R_virtᵀ · R_in`, `t = -R_virtᵀ ·
/// (t_virt − t_in)`, in the OMAF referential.
pub fn relative_pose(input: Pose, virt: Pose) -> Pose {
    let r_virt_t = virt.rotation.transpose();
    let rotation = r_virt_t.mul_mat(input.rotation);
    let translation = r_virt_t
        .mul_vec(virt.translation.sub(input.translation))
        .scale(-1.0);
    Pose {
        rotation,
        translation,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_euler_is_identity() {
        let m = Mat3::from_euler_zyx(0.0, 0.0, 0.0);
        assert_eq!(m, Mat3::IDENTITY);
    }

    #[test]
    fn transpose_is_inverse_for_rotation() {
        let m = Mat3::from_euler_zyx(0.3, -0.2, 0.7);
        let should_be_identity = m.mul_mat(m.transpose());
        for i in 0..3 {
            for j in 0..3 {
                let expected = if i == j { 1.0 } else { 0.0 };
                assert!((should_be_identity.rows[i][j] - expected).abs() < 1e-5);
            }
        }
    }

    #[test]
    fn relative_pose_of_identical_cameras_is_identity() {
        let p = Pose {
            rotation: Mat3::from_euler_zyx(0.1, 0.2, 0.3),
            translation: Vec3::new(1.0, 2.0, 3.0),
        };
        let rel = relative_pose(p, p);
        assert!((rel.translation.norm()).abs() < 1e-5);
        for i in 0..3 {
            for j in 0..3 {
                let expected = if i == j { 1.0 } else { 0.0 };
                assert!((rel.rotation.rows[i][j] - expected).abs() < 1e-5);
            }
        }
    }
}
