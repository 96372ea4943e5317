//! Map - Container for KeyFrames and MapPoints.
//!
//! The Map is the arena that owns every entity of the SLAM graph:
//! - KeyFrames with their poses, features and graph nodes
//! - MapPoints (3D landmarks) with their observations
//!
//! It provides methods for:
//! - Creating and looking up KeyFrames and MapPoints
//! - Creating bidirectional associations (KF↔MP)
//! - Erasing KeyFrames while keeping the spanning tree connected
//! - Registering loop edges
//! - Verifying the spanning tree
//!
//! # Locking
//!
//! The arena tables are leaf locks: they are held only long enough to clone
//! an `Arc` out or to insert/remove an entry, never while a graph node or a
//! keyframe lock is taken.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use nalgebra::Vector3;
use parking_lot::{Mutex, RwLock};
use tracing::{debug, info};

use crate::camera::Camera;
use crate::error::GraphError;
use crate::feature::KeyPoint;
use crate::geometry::SE3;

use super::graph_node::{GraphConfig, GraphNode};
use super::keyframe::KeyFrame;
use super::map_point::MapPoint;
use super::types::{KeyFrameId, MapPointId};

/// Result of a keyframe erasure request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErasureOutcome {
    /// The keyframe was detached and removed from the map.
    Erased,
    /// The keyframe is pinned; erasure runs once the pin is released.
    Deferred,
    /// The origin keyframe is never erased.
    KeptOrigin,
}

/// The SLAM map containing KeyFrames and MapPoints.
pub struct Map {
    /// All KeyFrames in the map.
    keyframes: RwLock<HashMap<KeyFrameId, Arc<KeyFrame>>>,

    /// All MapPoints in the map.
    map_points: RwLock<HashMap<MapPointId, Arc<MapPoint>>>,

    /// Counter for generating unique KeyFrame IDs.
    next_kf_id: AtomicU64,

    /// Counter for generating unique MapPoint IDs.
    next_mp_id: AtomicU64,

    /// First keyframe ever created; root of the spanning tree.
    origin_keyframe_id: Mutex<Option<KeyFrameId>>,

    config: GraphConfig,
}

impl Map {
    /// Create a new empty Map.
    pub fn new() -> Self {
        Self::with_config(GraphConfig::default())
    }

    pub fn with_config(config: GraphConfig) -> Self {
        Self {
            keyframes: RwLock::new(HashMap::new()),
            map_points: RwLock::new(HashMap::new()),
            next_kf_id: AtomicU64::new(0),
            next_mp_id: AtomicU64::new(0),
            origin_keyframe_id: Mutex::new(None),
            config,
        }
    }

    pub fn graph_config(&self) -> &GraphConfig {
        &self.config
    }

    // ─────────────────────────────────────────────────────────────────────────
    // KeyFrames
    // ─────────────────────────────────────────────────────────────────────────

    /// Create a KeyFrame and insert it into the map.
    ///
    /// The first keyframe created becomes the origin.
    pub fn create_keyframe(
        &self,
        pose_cw: SE3,
        keypoints: Vec<KeyPoint>,
        level_sigma_sq: Vec<f64>,
        camera: Arc<dyn Camera>,
    ) -> Arc<KeyFrame> {
        let id = KeyFrameId::new(self.next_kf_id.fetch_add(1, Ordering::Relaxed));

        let is_root = {
            let mut origin = self.origin_keyframe_id.lock();
            if origin.is_none() {
                *origin = Some(id);
                true
            } else {
                false
            }
        };

        let kf = Arc::new(KeyFrame::new(
            id,
            pose_cw,
            keypoints,
            level_sigma_sq,
            camera,
            is_root,
            self.config.covisibility_weight_threshold,
        ));
        self.keyframes.write().insert(id, kf.clone());

        debug!("Created {} (origin: {})", id, is_root);
        kf
    }

    pub fn get_keyframe(&self, id: KeyFrameId) -> Option<Arc<KeyFrame>> {
        self.keyframes.read().get(&id).cloned()
    }

    pub fn contains_keyframe(&self, id: KeyFrameId) -> bool {
        self.keyframes.read().contains_key(&id)
    }

    /// Snapshot of all KeyFrames, sorted by id.
    pub fn keyframes(&self) -> Vec<Arc<KeyFrame>> {
        let mut kfs: Vec<_> = self.keyframes.read().values().cloned().collect();
        kfs.sort_by_key(|kf| kf.id);
        kfs
    }

    pub fn num_keyframes(&self) -> usize {
        self.keyframes.read().len()
    }

    pub fn origin_keyframe_id(&self) -> Option<KeyFrameId> {
        *self.origin_keyframe_id.lock()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // MapPoints
    // ─────────────────────────────────────────────────────────────────────────

    /// Create a MapPoint with no observations.
    pub fn create_map_point(&self, position: Vector3<f64>) -> Arc<MapPoint> {
        let id = MapPointId::new(self.next_mp_id.fetch_add(1, Ordering::Relaxed));
        let mp = Arc::new(MapPoint::new(id, position));
        self.map_points.write().insert(id, mp.clone());
        mp
    }

    pub fn get_map_point(&self, id: MapPointId) -> Option<Arc<MapPoint>> {
        self.map_points.read().get(&id).cloned()
    }

    /// Snapshot of all MapPoints, sorted by id.
    pub fn map_points(&self) -> Vec<Arc<MapPoint>> {
        let mut mps: Vec<_> = self.map_points.read().values().cloned().collect();
        mps.sort_by_key(|mp| mp.id);
        mps
    }

    pub fn num_map_points(&self) -> usize {
        self.map_points.read().len()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Associations
    // ─────────────────────────────────────────────────────────────────────────

    /// Associate feature `feature_idx` of `kf_id` with `mp_id` on both sides.
    ///
    /// Returns false if either entity is missing or the index is out of range.
    /// Covisibility is not updated; call `update_connections` afterwards.
    pub fn add_observation(&self, kf_id: KeyFrameId, feature_idx: usize, mp_id: MapPointId) -> bool {
        let (Some(kf), Some(mp)) = (self.get_keyframe(kf_id), self.get_map_point(mp_id)) else {
            return false;
        };
        if feature_idx >= kf.num_features() {
            return false;
        }

        if let Some(prev) = kf.set_landmark(feature_idx, mp_id) {
            if prev != mp_id {
                if let Some(prev_mp) = self.get_map_point(prev) {
                    prev_mp.erase_observation(kf_id);
                }
            }
        }
        mp.add_observation(kf_id, feature_idx);
        true
    }

    /// Remove the association between `kf_id` and `mp_id` on both sides.
    pub fn erase_observation(&self, kf_id: KeyFrameId, mp_id: MapPointId) -> bool {
        let mut erased = false;
        if let Some(kf) = self.get_keyframe(kf_id) {
            erased |= kf.erase_landmark(mp_id);
        }
        if let Some(mp) = self.get_map_point(mp_id) {
            erased |= mp.erase_observation(kf_id);
        }
        erased
    }

    /// Flag a MapPoint, detach it from every observer and drop it from the map.
    pub fn erase_map_point(&self, mp_id: MapPointId) -> bool {
        let Some(mp) = self.get_map_point(mp_id) else {
            return false;
        };
        mp.prepare_for_erasing();

        for (kf_id, feature_idx) in mp.observations() {
            if let Some(kf) = self.get_keyframe(kf_id) {
                if kf.landmark(feature_idx) == Some(mp_id) {
                    kf.erase_landmark_at(feature_idx);
                }
            }
            mp.erase_observation(kf_id);
        }

        self.map_points.write().remove(&mp_id);
        true
    }

    // ─────────────────────────────────────────────────────────────────────────
    // KeyFrame Erasure
    // ─────────────────────────────────────────────────────────────────────────

    /// Erase a keyframe, or defer it while it is pinned.
    ///
    /// On erasure the keyframe is detached from its landmarks and covisible
    /// neighbors, its spanning children are handed to other keyframes and it
    /// is removed from the map. The origin is never erased.
    pub fn prepare_for_erasing(&self, kf_id: KeyFrameId) -> Result<ErasureOutcome, GraphError> {
        let kf = self
            .get_keyframe(kf_id)
            .ok_or(GraphError::UnknownKeyFrame(kf_id))?;

        if self.origin_keyframe_id() == Some(kf_id) {
            debug!("{} is the origin, keeping it", kf_id);
            return Ok(ErasureOutcome::KeptOrigin);
        }

        if kf.cannot_be_erased() {
            kf.defer_erasure();
            debug!("{} is pinned, erasure deferred", kf_id);
            return Ok(ErasureOutcome::Deferred);
        }

        if kf.graph().get_spanning_parent().is_none() {
            return Err(GraphError::MissingSpanningParent(kf_id));
        }

        if !kf.begin_erasure() {
            return Ok(ErasureOutcome::Erased);
        }

        for (_, mp_id) in kf.landmark_indices() {
            if let Some(mp) = self.get_map_point(mp_id) {
                mp.erase_observation(kf_id);
            }
        }

        kf.graph().erase_all_connections(self);
        kf.graph().recover_spanning_connections(self)?;

        kf.clear_landmarks();
        self.keyframes.write().remove(&kf_id);

        info!("Erased {} ({} keyframes left)", kf_id, self.num_keyframes());
        Ok(ErasureOutcome::Erased)
    }

    /// Release the client pin on `kf_id` and run any deferred erasure.
    ///
    /// Returns `Ok(None)` when nothing was pending.
    pub fn set_to_be_erased(&self, kf_id: KeyFrameId) -> Result<Option<ErasureOutcome>, GraphError> {
        let kf = self
            .get_keyframe(kf_id)
            .ok_or(GraphError::UnknownKeyFrame(kf_id))?;

        if kf.set_to_be_erased() {
            self.prepare_for_erasing(kf_id).map(Some)
        } else {
            Ok(None)
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Loop Edges
    // ─────────────────────────────────────────────────────────────────────────

    /// Register a confirmed loop closure between `kf_a` and `kf_b`.
    ///
    /// Both keyframes record the edge and become permanently pinned.
    pub fn add_loop_edge(&self, kf_a: KeyFrameId, kf_b: KeyFrameId) -> Result<(), GraphError> {
        let a = self
            .get_keyframe(kf_a)
            .ok_or(GraphError::UnknownKeyFrame(kf_a))?;
        let b = self
            .get_keyframe(kf_b)
            .ok_or(GraphError::UnknownKeyFrame(kf_b))?;

        GraphNode::add_loop_edge_pair(a.graph(), b.graph());
        info!("Loop edge added between {} and {}", kf_a, kf_b);
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Spanning Tree Verification
    // ─────────────────────────────────────────────────────────────────────────

    /// Check that the spanning parents of all keyframes form one tree rooted
    /// at the origin, and that parent and child links agree.
    pub fn check_spanning_tree(&self) -> Result<(), GraphError> {
        let Some(origin) = self.origin_keyframe_id() else {
            return Ok(());
        };

        let parents: HashMap<KeyFrameId, Option<KeyFrameId>> = self
            .keyframes()
            .iter()
            .filter(|kf| !kf.will_be_erased())
            .map(|kf| (kf.id, kf.graph().get_spanning_parent()))
            .collect();

        let inconsistent = |node: KeyFrameId, reason: String| GraphError::InconsistentSpanningTree { node, reason };

        for (&id, &parent) in &parents {
            if id == origin {
                continue;
            }
            let parent = parent.ok_or_else(|| inconsistent(id, "no spanning parent".into()))?;

            if !parents.contains_key(&parent) {
                return Err(inconsistent(id, format!("parent {} is not in the map", parent)));
            }
            let parent_lists_child = self
                .get_keyframe(parent)
                .is_some_and(|parent_kf| parent_kf.graph().has_spanning_child(id));
            if !parent_lists_child {
                return Err(inconsistent(id, format!("parent {} does not list it as a child", parent)));
            }

            let mut visited = HashSet::from([id]);
            let mut current = parent;
            while current != origin {
                if !visited.insert(current) {
                    return Err(inconsistent(id, format!("cycle through {}", current)));
                }
                current = parents
                    .get(&current)
                    .copied()
                    .flatten()
                    .ok_or_else(|| inconsistent(id, format!("ancestor {} has no parent", current)))?;
            }
        }

        Ok(())
    }
}

impl Default for Map {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Map {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Map")
            .field("num_keyframes", &self.num_keyframes())
            .field("num_map_points", &self.num_map_points())
            .field("origin", &self.origin_keyframe_id())
            .finish()
    }
}
