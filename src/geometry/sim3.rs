//! Sim3: 7-DOF similarity transformation (rotation + translation + scale).
//!
//! This is the value type handed to loop-closing callers once the
//! [`Sim3Solver`](crate::loop_closing::Sim3Solver) has accepted a model. With
//! a scale-locked solve (stereo / RGB-D rigs) the scale is exactly 1.

use nalgebra::{Matrix3, Rotation3, UnitQuaternion, Vector3};

use super::SE3;

/// 7-DOF Similarity transformation: rotation + translation + scale.
///
/// Transforms points as: p' = s * R * p + t
#[derive(Debug, Clone, PartialEq)]
pub struct Sim3 {
    pub rotation: UnitQuaternion<f64>,
    pub translation: Vector3<f64>,
    pub scale: f64,
}

impl Sim3 {
    /// Identity transformation (no rotation, no translation, scale = 1).
    pub fn identity() -> Self {
        Self {
            rotation: UnitQuaternion::identity(),
            translation: Vector3::zeros(),
            scale: 1.0,
        }
    }

    /// Construct from rotation matrix, translation, and scale.
    ///
    /// `rotation` must already be orthonormal.
    pub fn from_rts(rotation: Matrix3<f64>, translation: Vector3<f64>, scale: f64) -> Self {
        let rot3 = Rotation3::from_matrix_unchecked(rotation);
        Self {
            rotation: UnitQuaternion::from_rotation_matrix(&rot3),
            translation,
            scale,
        }
    }

    /// Construct from SE3 with scale = 1.0.
    pub fn from_se3(se3: &SE3) -> Self {
        Self {
            rotation: se3.rotation,
            translation: se3.translation,
            scale: 1.0,
        }
    }

    /// Inverse transformation.
    ///
    /// S^{-1} = [(1/s)R^T | -(1/s)R^T*t; 0 | 1]
    pub fn inverse(&self) -> Self {
        let rot_inv = self.rotation.inverse();
        let scale_inv = 1.0 / self.scale;
        let t_inv = -(rot_inv * self.translation) * scale_inv;
        Self {
            rotation: rot_inv,
            translation: t_inv,
            scale: scale_inv,
        }
    }

    /// self ∘ other
    ///
    /// [s1*s2*R1*R2 | s1*R1*t2 + t1]
    pub fn compose(&self, other: &Sim3) -> Self {
        Self {
            rotation: self.rotation * other.rotation,
            translation: self.scale * (self.rotation * other.translation) + self.translation,
            scale: self.scale * other.scale,
        }
    }

    /// Transform a single point: p' = s * R * p + t.
    pub fn transform_point(&self, p: &Vector3<f64>) -> Vector3<f64> {
        self.scale * (self.rotation * p) + self.translation
    }

    /// Get the rotation matrix (without scale).
    pub fn rotation_matrix(&self) -> Matrix3<f64> {
        self.rotation.to_rotation_matrix().into_inner()
    }

    /// Get the scaled rotation matrix (s * R), the form camera reprojection expects.
    pub fn scaled_rotation_matrix(&self) -> Matrix3<f64> {
        self.rotation_matrix() * self.scale
    }

    /// Drop the scale. Lossless when the scale is 1.
    pub fn to_se3(&self) -> SE3 {
        SE3 {
            rotation: self.rotation,
            translation: self.translation,
        }
    }
}

impl Default for Sim3 {
    fn default() -> Self {
        Self::identity()
    }
}
