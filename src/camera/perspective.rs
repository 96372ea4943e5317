//! Pinhole camera model.

use nalgebra::{Matrix3, Vector2, Vector3};

use super::{Camera, Reprojection};

/// Pinhole camera operating on undistorted keypoints.
///
/// For stereo rigs `focal_x_baseline` (fx * baseline) gives the right-image
/// abscissa; it is 0 for monocular cameras.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PerspectiveCamera {
    pub fx: f64,
    pub fy: f64,
    pub cx: f64,
    pub cy: f64,
    pub cols: u32,
    pub rows: u32,
    pub focal_x_baseline: f64,
}

impl PerspectiveCamera {
    pub fn new(fx: f64, fy: f64, cx: f64, cy: f64, cols: u32, rows: u32) -> Self {
        Self {
            fx,
            fy,
            cx,
            cy,
            cols,
            rows,
            focal_x_baseline: 0.0,
        }
    }

    /// Build from a K matrix [fx 0 cx; 0 fy cy; 0 0 1].
    pub fn from_k(k: &Matrix3<f64>, cols: u32, rows: u32) -> Self {
        Self::new(k[(0, 0)], k[(1, 1)], k[(0, 2)], k[(1, 2)], cols, rows)
    }

    /// Attach a stereo baseline in meters.
    pub fn with_baseline(mut self, baseline: f64) -> Self {
        self.focal_x_baseline = self.fx * baseline;
        self
    }

    fn in_image(&self, point: &Vector2<f64>) -> bool {
        point.x >= 0.0
            && point.x <= self.cols as f64
            && point.y >= 0.0
            && point.y <= self.rows as f64
    }
}

impl Camera for PerspectiveCamera {
    fn reproject_to_image(
        &self,
        rot_cw: &Matrix3<f64>,
        trans_cw: &Vector3<f64>,
        pos_w: &Vector3<f64>,
    ) -> Reprojection {
        let pos_c = rot_cw * pos_w + trans_cw;

        if pos_c.z <= 0.0 {
            return Reprojection {
                point: Vector2::new(f64::NAN, f64::NAN),
                x_right: -1.0,
                is_valid: false,
            };
        }

        let z_inv = 1.0 / pos_c.z;
        let point = Vector2::new(
            self.fx * pos_c.x * z_inv + self.cx,
            self.fy * pos_c.y * z_inv + self.cy,
        );
        let x_right = point.x - self.focal_x_baseline * z_inv;

        Reprojection {
            point,
            x_right,
            is_valid: self.in_image(&point),
        }
    }

    fn cols(&self) -> u32 {
        self.cols
    }

    fn rows(&self) -> u32 {
        self.rows
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn camera() -> PerspectiveCamera {
        PerspectiveCamera::new(500.0, 500.0, 320.0, 240.0, 640, 480)
    }

    #[test]
    fn test_principal_point_projection() {
        let r = camera().reproject_to_image(
            &Matrix3::identity(),
            &Vector3::zeros(),
            &Vector3::new(0.0, 0.0, 4.0),
        );
        assert!(r.is_valid);
        assert_relative_eq!(r.point, Vector2::new(320.0, 240.0), epsilon = 1e-12);
    }

    #[test]
    fn test_point_behind_camera_is_invalid() {
        let r = camera().reproject_to_image(
            &Matrix3::identity(),
            &Vector3::zeros(),
            &Vector3::new(0.0, 0.0, -1.0),
        );
        assert!(!r.is_valid);
    }

    #[test]
    fn test_outside_image_is_invalid_but_computed() {
        let r = camera().reproject_to_image(
            &Matrix3::identity(),
            &Vector3::zeros(),
            &Vector3::new(10.0, 0.0, 1.0),
        );
        assert!(!r.is_valid);
        assert_relative_eq!(r.point.x, 5320.0, epsilon = 1e-9);
    }

    #[test]
    fn test_stereo_right_abscissa() {
        let cam = camera().with_baseline(0.1);
        let r = cam.reproject_to_image(
            &Matrix3::identity(),
            &Vector3::zeros(),
            &Vector3::new(0.0, 0.0, 5.0),
        );
        // disparity = fx * b / z = 500 * 0.1 / 5 = 10 px
        assert_relative_eq!(r.point.x - r.x_right, 10.0, epsilon = 1e-9);
    }

    #[test]
    fn test_scaled_rotation_is_honoured() {
        let r = camera().reproject_to_image(
            &(Matrix3::identity() * 2.0),
            &Vector3::new(0.0, 0.0, 1.0),
            &Vector3::new(0.5, 0.0, 1.0),
        );
        // pos_c = (1, 0, 3)
        assert_relative_eq!(r.point.x, 320.0 + 500.0 / 3.0, epsilon = 1e-9);
    }
}
