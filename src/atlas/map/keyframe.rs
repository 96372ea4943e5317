//! KeyFrame - A selected frame with map structure relationships.
//!
//! KeyFrames are the nodes of the SLAM graph. They contain:
//! - Observation data (undistorted keypoints, per-octave noise, camera model)
//! - Pose estimate (world-to-camera SE3)
//! - Graph relationships, owned by the embedded [`GraphNode`]
//! - Erasure flags controlling when the keyframe may leave the map
//!
//! KeyFrames are shared between threads behind an `Arc`, so every mutable
//! field carries its own lock.

use std::sync::Arc;

use nalgebra::{Matrix3, Vector3};
use parking_lot::{Mutex, RwLock};

use crate::camera::Camera;
use crate::feature::KeyPoint;
use crate::geometry::SE3;

use super::graph_node::GraphNode;
use super::types::{KeyFrameId, MapPointId};

#[derive(Debug, Default)]
struct ErasureState {
    /// Pinned by a client (e.g. loop detection is using this keyframe).
    cannot_be_erased: bool,
    /// Erasure was requested while pinned; runs once the pin is released.
    should_be_erased: bool,
    /// Erasure has begun. Never cleared.
    will_be_erased: bool,
}

/// A KeyFrame in the SLAM map.
pub struct KeyFrame {
    /// Unique identifier for this KeyFrame.
    pub id: KeyFrameId,

    /// Pose: transform from world to camera (T_cw).
    pose_cw: RwLock<SE3>,

    // ─────────────────────────────────────────────────────────────────────────
    // Visual Features
    // ─────────────────────────────────────────────────────────────────────────
    /// Undistorted keypoints.
    keypoints: Vec<KeyPoint>,

    /// Keypoint noise variance per pyramid level.
    level_sigma_sq: Vec<f64>,

    camera: Arc<dyn Camera>,

    // ─────────────────────────────────────────────────────────────────────────
    // Map Associations
    // ─────────────────────────────────────────────────────────────────────────
    /// Feature index → MapPoint association.
    landmarks: RwLock<Vec<Option<MapPointId>>>,

    graph: GraphNode,

    erasure: Mutex<ErasureState>,
}

impl KeyFrame {
    /// Create a new KeyFrame with one empty landmark slot per keypoint.
    ///
    /// `is_root` marks the map origin, which never receives a spanning parent.
    pub fn new(
        id: KeyFrameId,
        pose_cw: SE3,
        keypoints: Vec<KeyPoint>,
        level_sigma_sq: Vec<f64>,
        camera: Arc<dyn Camera>,
        is_root: bool,
        weight_threshold: u32,
    ) -> Self {
        let num_features = keypoints.len();
        Self {
            id,
            pose_cw: RwLock::new(pose_cw),
            keypoints,
            level_sigma_sq,
            camera,
            landmarks: RwLock::new(vec![None; num_features]),
            graph: GraphNode::new(id, is_root, weight_threshold),
            erasure: Mutex::new(ErasureState::default()),
        }
    }

    pub fn graph(&self) -> &GraphNode {
        &self.graph
    }

    pub fn camera(&self) -> &Arc<dyn Camera> {
        &self.camera
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Pose
    // ─────────────────────────────────────────────────────────────────────────

    pub fn pose_cw(&self) -> SE3 {
        *self.pose_cw.read()
    }

    pub fn set_pose_cw(&self, pose_cw: SE3) {
        *self.pose_cw.write() = pose_cw;
    }

    pub fn rotation_cw(&self) -> Matrix3<f64> {
        self.pose_cw.read().rotation_matrix()
    }

    pub fn translation_cw(&self) -> Vector3<f64> {
        self.pose_cw.read().translation
    }

    /// Get the camera position in world frame.
    pub fn camera_center(&self) -> Vector3<f64> {
        let pose = self.pose_cw.read();
        -(pose.rotation.inverse() * pose.translation)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Features
    // ─────────────────────────────────────────────────────────────────────────

    pub fn num_features(&self) -> usize {
        self.keypoints.len()
    }

    pub fn keypoints(&self) -> &[KeyPoint] {
        &self.keypoints
    }

    pub fn keypoint(&self, idx: usize) -> Option<&KeyPoint> {
        self.keypoints.get(idx)
    }

    pub fn level_sigma_sq(&self) -> &[f64] {
        &self.level_sigma_sq
    }

    /// Noise variance of keypoint `idx`, looked up by its octave.
    pub fn sigma_sq_at(&self, idx: usize) -> Option<f64> {
        let keypoint = self.keypoints.get(idx)?;
        self.level_sigma_sq.get(keypoint.octave).copied()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Map Point Associations
    // ─────────────────────────────────────────────────────────────────────────

    /// Get the MapPoint ID for a given feature index.
    pub fn landmark(&self, feature_idx: usize) -> Option<MapPointId> {
        self.landmarks.read().get(feature_idx).copied().flatten()
    }

    /// Snapshot of all landmark slots, indexed by feature.
    pub fn landmarks(&self) -> Vec<Option<MapPointId>> {
        self.landmarks.read().clone()
    }

    /// Associate a feature with a MapPoint.
    ///
    /// Returns the previous MapPoint ID if there was one. Out-of-range indices
    /// are ignored.
    pub fn set_landmark(&self, feature_idx: usize, mp_id: MapPointId) -> Option<MapPointId> {
        let mut landmarks = self.landmarks.write();
        let slot = landmarks.get_mut(feature_idx)?;
        slot.replace(mp_id)
    }

    /// Remove the association for a feature.
    pub fn erase_landmark_at(&self, feature_idx: usize) -> Option<MapPointId> {
        self.landmarks.write().get_mut(feature_idx)?.take()
    }

    /// Clear every slot holding `mp_id`. Returns true if any slot was cleared.
    pub fn erase_landmark(&self, mp_id: MapPointId) -> bool {
        let mut erased = false;
        for slot in self.landmarks.write().iter_mut() {
            if *slot == Some(mp_id) {
                *slot = None;
                erased = true;
            }
        }
        erased
    }

    /// Get all associated MapPoint IDs with their feature indices.
    pub fn landmark_indices(&self) -> Vec<(usize, MapPointId)> {
        self.landmarks
            .read()
            .iter()
            .enumerate()
            .filter_map(|(idx, mp)| mp.map(|id| (idx, id)))
            .collect()
    }

    /// Count the number of associated MapPoints.
    pub fn num_landmarks(&self) -> usize {
        self.landmarks.read().iter().filter(|mp| mp.is_some()).count()
    }

    pub(super) fn clear_landmarks(&self) {
        self.landmarks.write().fill(None);
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Erasure
    // ─────────────────────────────────────────────────────────────────────────

    /// Pin the keyframe so erasure requests are deferred.
    pub fn set_not_to_be_erased(&self) {
        self.erasure.lock().cannot_be_erased = true;
    }

    /// Release the client pin.
    ///
    /// Returns true when an erasure was deferred while pinned and may now run.
    /// Has no effect on a keyframe with loop edges, which stays pinned.
    pub fn set_to_be_erased(&self) -> bool {
        if self.graph.has_loop_edge() {
            return false;
        }
        let mut erasure = self.erasure.lock();
        erasure.cannot_be_erased = false;
        erasure.should_be_erased && !erasure.will_be_erased
    }

    /// Pinned by a client or by a loop edge.
    pub fn cannot_be_erased(&self) -> bool {
        let pinned = self.erasure.lock().cannot_be_erased;
        pinned || self.graph.has_loop_edge()
    }

    pub fn should_be_erased(&self) -> bool {
        self.erasure.lock().should_be_erased
    }

    pub fn will_be_erased(&self) -> bool {
        self.erasure.lock().will_be_erased
    }

    pub(super) fn defer_erasure(&self) {
        self.erasure.lock().should_be_erased = true;
    }

    /// Mark erasure as started. Returns false if it had already started.
    pub(super) fn begin_erasure(&self) -> bool {
        let mut erasure = self.erasure.lock();
        !std::mem::replace(&mut erasure.will_be_erased, true)
    }
}

impl std::fmt::Debug for KeyFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyFrame")
            .field("id", &self.id)
            .field("num_features", &self.num_features())
            .field("num_landmarks", &self.num_landmarks())
            .field("covisibles", &self.graph.degree())
            .field("spanning_parent", &self.graph.get_spanning_parent())
            .field("will_be_erased", &self.will_be_erased())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::PerspectiveCamera;
    use approx::assert_relative_eq;
    use nalgebra::UnitQuaternion;

    fn create_keyframe(id: u64, keypoints: Vec<KeyPoint>) -> KeyFrame {
        let camera = Arc::new(PerspectiveCamera::new(500.0, 500.0, 320.0, 240.0, 640, 480));
        KeyFrame::new(
            KeyFrameId::new(id),
            SE3::identity(),
            keypoints,
            vec![1.0, 1.44, 2.0736],
            camera,
            false,
            15,
        )
    }

    fn create_keyframe_with_features(id: u64, num_features: usize) -> KeyFrame {
        let keypoints = (0..num_features)
            .map(|i| KeyPoint::new(i as f64, i as f64, i % 3))
            .collect();
        create_keyframe(id, keypoints)
    }

    #[test]
    fn test_landmark_association() {
        let kf = create_keyframe_with_features(1, 10);

        // Associate feature 3 with MapPoint 100
        kf.set_landmark(3, MapPointId::new(100));
        assert_eq!(kf.landmark(3), Some(MapPointId::new(100)));
        assert_eq!(kf.landmark(4), None);
        assert_eq!(kf.num_landmarks(), 1);

        let prev = kf.set_landmark(3, MapPointId::new(200));
        assert_eq!(prev, Some(MapPointId::new(100)));

        assert!(kf.erase_landmark(MapPointId::new(200)));
        assert_eq!(kf.landmark(3), None);
        assert!(!kf.erase_landmark(MapPointId::new(200)));

        // Out of range
        assert_eq!(kf.set_landmark(10, MapPointId::new(1)), None);
        assert_eq!(kf.num_landmarks(), 0);
    }

    #[test]
    fn test_sigma_sq_follows_octave() {
        let kf = create_keyframe_with_features(1, 4);
        assert_relative_eq!(kf.sigma_sq_at(0).unwrap(), 1.0);
        assert_relative_eq!(kf.sigma_sq_at(2).unwrap(), 2.0736);
        assert_relative_eq!(kf.sigma_sq_at(3).unwrap(), 1.0);
        assert!(kf.sigma_sq_at(4).is_none());
    }

    #[test]
    fn test_camera_center() {
        let kf = create_keyframe_with_features(1, 0);
        let rotation = UnitQuaternion::from_euler_angles(0.0, 0.0, std::f64::consts::FRAC_PI_2);
        kf.set_pose_cw(SE3::new(rotation, Vector3::new(1.0, 0.0, 0.0)));

        // The camera center maps to the camera-frame origin.
        let center = kf.camera_center();
        let in_camera = kf.rotation_cw() * center + kf.translation_cw();
        assert_relative_eq!(in_camera, Vector3::zeros(), epsilon = 1e-12);
    }

    #[test]
    fn test_pin_defers_erasure() {
        let kf = create_keyframe_with_features(1, 0);
        assert!(!kf.cannot_be_erased());

        kf.set_not_to_be_erased();
        assert!(kf.cannot_be_erased());
        assert!(!kf.set_to_be_erased());

        kf.set_not_to_be_erased();
        kf.defer_erasure();
        assert!(kf.set_to_be_erased());
        assert!(!kf.cannot_be_erased());
    }

    #[test]
    fn test_loop_edge_pins_keyframe() {
        let kf = create_keyframe_with_features(1, 0);
        kf.graph().add_loop_edge(KeyFrameId::new(7));
        kf.defer_erasure();

        assert!(kf.cannot_be_erased());
        assert!(!kf.set_to_be_erased());
        assert!(kf.cannot_be_erased());
    }

    #[test]
    fn test_begin_erasure_once() {
        let kf = create_keyframe_with_features(1, 0);
        assert!(kf.begin_erasure());
        assert!(!kf.begin_erasure());
        assert!(kf.will_be_erased());
    }
}
