//! Camera projection capability.
//!
//! The graph and the Sim3 solver never do camera-model math themselves; they
//! only ask a [`Camera`] where a 3D point lands in its image. Two models are
//! provided:
//! - [`PerspectiveCamera`] - pinhole (mono, stereo, RGB-D rigs)
//! - [`EquirectangularCamera`] - full spherical panoramas

pub mod equirectangular;
pub mod perspective;

use nalgebra::{Matrix3, Vector2, Vector3};

pub use equirectangular::EquirectangularCamera;
pub use perspective::PerspectiveCamera;

/// Outcome of projecting a 3D point into an image.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reprojection {
    /// Pixel coordinate in the (left) image.
    pub point: Vector2<f64>,
    /// Abscissa in the right image of a stereo rig; negative when the model has none.
    pub x_right: f64,
    /// False when the point is behind the camera or outside the image.
    /// `point` is still filled in as far as it could be computed.
    pub is_valid: bool,
}

/// Model-specific projection.
///
/// `rot_cw` is allowed to carry a uniform scale: the Sim3 solver passes
/// `s * R` to project through a similarity transform.
pub trait Camera: Send + Sync + std::fmt::Debug {
    /// Project world point `pos_w` through the pose (`rot_cw`, `trans_cw`).
    fn reproject_to_image(
        &self,
        rot_cw: &Matrix3<f64>,
        trans_cw: &Vector3<f64>,
        pos_w: &Vector3<f64>,
    ) -> Reprojection;

    /// Image width in pixels.
    fn cols(&self) -> u32;

    /// Image height in pixels.
    fn rows(&self) -> u32;
}
