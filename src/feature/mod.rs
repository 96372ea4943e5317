//! Keypoint types and the quadtree used to distribute them.

pub mod keypoint;
pub mod quadtree;

pub use keypoint::KeyPoint;
pub use quadtree::QuadtreeNode;
