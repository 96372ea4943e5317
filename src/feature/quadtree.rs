//! Quadtree cell used to spread keypoints evenly over an image.
//!
//! A feature-extraction driver keeps splitting the most populated cells with
//! [`QuadtreeNode::divide`] until it has as many cells as it wants keypoints,
//! then keeps the strongest keypoint per cell. Termination and pruning are
//! the driver's business; a node only knows how to split itself.

use nalgebra::Point2;

use super::KeyPoint;

#[derive(Debug, Clone, PartialEq)]
pub struct QuadtreeNode {
    /// Top-left corner (inclusive).
    pub pt_begin: Point2<i32>,
    /// Bottom-right corner.
    pub pt_end: Point2<i32>,
    pub keypoints: Vec<KeyPoint>,
    /// Set when the node holds at most one keypoint and needs no further split.
    pub is_leaf: bool,
}

impl QuadtreeNode {
    pub fn new(pt_begin: Point2<i32>, pt_end: Point2<i32>, keypoints: Vec<KeyPoint>) -> Self {
        let is_leaf = keypoints.len() <= 1;
        Self {
            pt_begin,
            pt_end,
            keypoints,
            is_leaf,
        }
    }

    pub fn size(&self) -> usize {
        self.keypoints.len()
    }

    /// Split into four quadrants ordered top-left, top-right, bottom-left,
    /// bottom-right.
    ///
    /// Midlines sit at `begin + ceil(extent / 2)`. A keypoint lying exactly on
    /// a midline goes to the right / bottom quadrant.
    pub fn divide(&self) -> [QuadtreeNode; 4] {
        let half_x = half_extent(self.pt_begin.x, self.pt_end.x);
        let half_y = half_extent(self.pt_begin.y, self.pt_end.y);

        let mid_x = self.pt_begin.x + half_x;
        let mid_y = self.pt_begin.y + half_y;

        let corners = [
            (self.pt_begin, Point2::new(mid_x, mid_y)),
            (Point2::new(mid_x, self.pt_begin.y), Point2::new(self.pt_end.x, mid_y)),
            (Point2::new(self.pt_begin.x, mid_y), Point2::new(mid_x, self.pt_end.y)),
            (Point2::new(mid_x, mid_y), self.pt_end),
        ];

        let mut buckets: [Vec<KeyPoint>; 4] = Default::default();
        for bucket in buckets.iter_mut() {
            bucket.reserve(self.keypoints.len());
        }

        for keypoint in &self.keypoints {
            let mut idx = 0;
            if mid_x as f64 <= keypoint.pt.x {
                idx += 1;
            }
            if mid_y as f64 <= keypoint.pt.y {
                idx += 2;
            }
            buckets[idx].push(*keypoint);
        }

        let [b0, b1, b2, b3] = buckets;
        [
            QuadtreeNode::new(corners[0].0, corners[0].1, b0),
            QuadtreeNode::new(corners[1].0, corners[1].1, b1),
            QuadtreeNode::new(corners[2].0, corners[2].1, b2),
            QuadtreeNode::new(corners[3].0, corners[3].1, b3),
        ]
    }
}

fn half_extent(begin: i32, end: i32) -> i32 {
    (end - begin + 1).div_euclid(2)
}
