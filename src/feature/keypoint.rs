use nalgebra::Point2;

/// An undistorted keypoint as stored on a keyframe.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KeyPoint {
    /// Pixel coordinate.
    pub pt: Point2<f64>,
    /// Image-pyramid level the keypoint was detected on.
    pub octave: usize,
    /// Detector response, used by extraction drivers to rank keypoints in a cell.
    pub response: f64,
}

impl KeyPoint {
    pub fn new(x: f64, y: f64, octave: usize) -> Self {
        Self {
            pt: Point2::new(x, y),
            octave,
            response: 0.0,
        }
    }

    pub fn with_response(mut self, response: f64) -> Self {
        self.response = response;
        self
    }
}
