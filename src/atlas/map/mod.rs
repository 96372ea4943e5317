//! Map module - Core SLAM map data structures.
//!
//! This module contains:
//! - [`KeyFrame`] - Selected frames with poses and feature observations
//! - [`MapPoint`] - 3D landmarks observed by KeyFrames
//! - [`GraphNode`] - A keyframe's covisibility edges, spanning-tree links and loop edges
//! - [`Map`] - Arena owning KeyFrames and MapPoints
//!
//! # Architecture
//!
//! The map forms a bipartite graph structure:
//! - KeyFrames observe MapPoints (KF → MP via landmark slots)
//! - MapPoints track their observers (MP → KF via `observations`)
//!
//! KeyFrames also maintain two graph structures through their GraphNode:
//! - **Covisibility Graph**: Edges weighted by shared MapPoint count
//! - **Spanning Tree**: Rooted at the origin keyframe, repaired on erasure
//!
//! # Example
//!
//! ```ignore
//! use slam_backbone::atlas::map::Map;
//!
//! let map = Map::new();
//! let kf = map.create_keyframe(pose_cw, keypoints, level_sigma_sq, camera);
//! let mp = map.create_map_point(position);
//!
//! // Associate KeyFrame feature with MapPoint (bidirectional)
//! map.add_observation(kf.id, feature_idx, mp.id);
//!
//! // Rebuild covisibility edges and query the neighborhood
//! kf.graph().update_connections(&map);
//! let local_kfs = kf.graph().get_top_n_covisibilities(10);
//! ```

pub mod graph_node;
pub mod keyframe;
pub mod map;
pub mod map_point;
pub mod types;

pub use graph_node::{GraphConfig, GraphNode};
pub use keyframe::KeyFrame;
pub use map::{ErasureOutcome, Map};
pub use map_point::MapPoint;
pub use types::{KeyFrameId, MapPointId};
