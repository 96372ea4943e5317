//! Atlas module - SLAM map data structures.
//!
//! Currently a single [`map::Map`] holding:
//! - [`map::KeyFrame`] - KeyFrames with their graph nodes
//! - [`map::MapPoint`] - 3D landmarks with observation tracking
//! - [`map::GraphNode`] - Covisibility graph, spanning tree and loop edges

pub mod map;

// Re-export commonly used types
pub use map::{ErasureOutcome, GraphConfig, GraphNode, KeyFrame, KeyFrameId, Map, MapPoint, MapPointId};
