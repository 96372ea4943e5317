//! SE3: rigid-body transform used for keyframe poses.

use nalgebra::{Matrix3, Rotation3, UnitQuaternion, Vector3};

/// Rigid transformation: p' = R * p + t.
///
/// Keyframe poses are stored world-to-camera (T_cw), so `transform_point`
/// takes a world point into the camera frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SE3 {
    pub rotation: UnitQuaternion<f64>,
    pub translation: Vector3<f64>,
}

impl SE3 {
    pub fn identity() -> Self {
        Self {
            rotation: UnitQuaternion::identity(),
            translation: Vector3::zeros(),
        }
    }

    pub fn new(rotation: UnitQuaternion<f64>, translation: Vector3<f64>) -> Self {
        Self {
            rotation,
            translation,
        }
    }

    /// Construct from a rotation matrix and translation.
    pub fn from_rt(rotation: Matrix3<f64>, translation: Vector3<f64>) -> Self {
        let rot3 = Rotation3::from_matrix_unchecked(rotation);
        Self {
            rotation: UnitQuaternion::from_rotation_matrix(&rot3),
            translation,
        }
    }

    pub fn rotation_matrix(&self) -> Matrix3<f64> {
        self.rotation.to_rotation_matrix().into_inner()
    }

    pub fn inverse(&self) -> Self {
        let rot_inv = self.rotation.inverse();
        Self {
            rotation: rot_inv,
            translation: -(rot_inv * self.translation),
        }
    }

    /// self ∘ other
    pub fn compose(&self, other: &SE3) -> Self {
        Self {
            rotation: self.rotation * other.rotation,
            translation: self.rotation * other.translation + self.translation,
        }
    }

    pub fn transform_point(&self, p: &Vector3<f64>) -> Vector3<f64> {
        self.rotation * p + self.translation
    }
}

impl Default for SE3 {
    fn default() -> Self {
        Self::identity()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_inverse_roundtrip_on_point() {
        let pose = SE3::new(
            UnitQuaternion::from_axis_angle(&Vector3::y_axis(), 0.3),
            Vector3::new(1.0, -2.0, 0.5),
        );
        let p = Vector3::new(0.2, 0.4, 3.0);
        let back = pose.inverse().transform_point(&pose.transform_point(&p));
        assert_relative_eq!(back, p, epsilon = 1e-12);
    }

    #[test]
    fn test_from_rt_matches_quaternion() {
        let q = UnitQuaternion::from_axis_angle(&Vector3::z_axis(), 1.1);
        let pose = SE3::from_rt(q.to_rotation_matrix().into_inner(), Vector3::zeros());
        assert_relative_eq!(pose.rotation_matrix(), q.to_rotation_matrix().into_inner(), epsilon = 1e-12);
    }
}
