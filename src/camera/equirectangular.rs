//! Equirectangular (spherical panorama) camera model.
//!
//! Pixel columns map linearly to longitude and rows to latitude, following
//! "From Google Street View to 3D City Models" (ICCVW 2009).

use std::f64::consts::PI;

use nalgebra::{Matrix3, Vector2, Vector3};

use super::{Camera, Reprojection};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EquirectangularCamera {
    pub cols: u32,
    pub rows: u32,
}

impl EquirectangularCamera {
    pub fn new(cols: u32, rows: u32) -> Self {
        Self { cols, rows }
    }

    /// Unit bearing for an undistorted pixel.
    pub fn pixel_to_bearing(&self, pixel: &Vector2<f64>) -> Vector3<f64> {
        let longitude = (pixel.x / self.cols as f64 - 0.5) * (2.0 * PI);
        let latitude = -(pixel.y / self.rows as f64 - 0.5) * PI;
        Vector3::new(
            latitude.cos() * longitude.sin(),
            -latitude.sin(),
            latitude.cos() * longitude.cos(),
        )
    }

    /// Pixel for a unit bearing.
    pub fn bearing_to_pixel(&self, bearing: &Vector3<f64>) -> Vector2<f64> {
        let latitude = -bearing.y.asin();
        let longitude = bearing.x.atan2(bearing.z);
        Vector2::new(
            self.cols as f64 * (0.5 + longitude / (2.0 * PI)),
            self.rows as f64 * (0.5 - latitude / PI),
        )
    }
}

impl Camera for EquirectangularCamera {
    fn reproject_to_image(
        &self,
        rot_cw: &Matrix3<f64>,
        trans_cw: &Vector3<f64>,
        pos_w: &Vector3<f64>,
    ) -> Reprojection {
        let pos_c = rot_cw * pos_w + trans_cw;

        // Every direction is visible; only the camera centre itself has no bearing.
        let Some(bearing) = pos_c.try_normalize(f64::EPSILON) else {
            return Reprojection {
                point: Vector2::new(f64::NAN, f64::NAN),
                x_right: -1.0,
                is_valid: false,
            };
        };

        Reprojection {
            point: self.bearing_to_pixel(&bearing),
            x_right: -1.0,
            is_valid: true,
        }
    }

    fn cols(&self) -> u32 {
        self.cols
    }

    fn rows(&self) -> u32 {
        self.rows
    }
}
