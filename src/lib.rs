//! Map backbone for a keyframe-based visual SLAM system.
//!
//! - [`atlas`] - keyframes, landmarks, the covisibility graph and spanning tree
//! - [`loop_closing`] - Sim3 RANSAC verification of loop candidates
//! - [`feature`] - keypoints and the quadtree used to distribute them
//! - [`camera`] - projection models consumed by the solver
//! - [`geometry`] - SE3 / Sim3 value types
//! - [`config`] - YAML configuration

pub mod atlas;
pub mod camera;
pub mod config;
pub mod error;
pub mod feature;
pub mod geometry;
pub mod loop_closing;

pub use atlas::{ErasureOutcome, GraphConfig, GraphNode, KeyFrame, KeyFrameId, Map, MapPoint, MapPointId};
pub use config::{BackboneConfig, CameraConfig};
pub use error::GraphError;
pub use loop_closing::{Sim3Estimate, Sim3Solver, Sim3SolverConfig};
