//! MapPoint - A 3D landmark observed by KeyFrames.
//!
//! Each MapPoint records which KeyFrames observe it and at which feature
//! index. Those observations are what the covisibility graph counts: two
//! keyframes that both appear in a landmark's observation map share one unit
//! of covisibility weight.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use nalgebra::Vector3;
use parking_lot::RwLock;

use super::types::{KeyFrameId, MapPointId};

/// A 3D map point (landmark) observed by one or more KeyFrames.
///
/// Shared between threads behind an `Arc`; every mutable field has its own
/// lock so readers of the position never wait on observation updates.
#[derive(Debug)]
pub struct MapPoint {
    /// Unique identifier for this MapPoint.
    pub id: MapPointId,

    /// 3D position in world frame.
    position: RwLock<Vector3<f64>>,

    /// observations[kf_id] = feature_idx means keyframe kf_id sees this point at feature_idx.
    observations: RwLock<HashMap<KeyFrameId, usize>>,

    /// Set once the point is scheduled for removal; never cleared.
    will_be_erased: AtomicBool,
}

impl MapPoint {
    pub fn new(id: MapPointId, position: Vector3<f64>) -> Self {
        Self {
            id,
            position: RwLock::new(position),
            observations: RwLock::new(HashMap::new()),
            will_be_erased: AtomicBool::new(false),
        }
    }

    pub fn position(&self) -> Vector3<f64> {
        *self.position.read()
    }

    pub fn set_position(&self, position: Vector3<f64>) {
        *self.position.write() = position;
    }

    /// Record that `kf_id` observes this point at `feature_idx`.
    ///
    /// An existing observation from the same keyframe is overwritten.
    pub fn add_observation(&self, kf_id: KeyFrameId, feature_idx: usize) {
        self.observations.write().insert(kf_id, feature_idx);
    }

    /// Returns true if the observation existed and was removed.
    pub fn erase_observation(&self, kf_id: KeyFrameId) -> bool {
        self.observations.write().remove(&kf_id).is_some()
    }

    /// Snapshot of the observation map.
    pub fn observations(&self) -> HashMap<KeyFrameId, usize> {
        self.observations.read().clone()
    }

    /// Get the number of KeyFrames observing this point.
    pub fn num_observations(&self) -> usize {
        self.observations.read().len()
    }

    /// Feature index of this point in `kf_id`, or `None` when that keyframe
    /// does not observe it.
    pub fn index_in_keyframe(&self, kf_id: KeyFrameId) -> Option<usize> {
        self.observations.read().get(&kf_id).copied()
    }

    pub fn is_observed_in(&self, kf_id: KeyFrameId) -> bool {
        self.observations.read().contains_key(&kf_id)
    }

    pub fn will_be_erased(&self) -> bool {
        self.will_be_erased.load(Ordering::Acquire)
    }

    /// Flag the point for removal. Observers skip it from now on.
    pub fn prepare_for_erasing(&self) {
        self.will_be_erased.store(true, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_observation_lookup() {
        let mp = MapPoint::new(MapPointId::new(0), Vector3::new(1.0, 2.0, 3.0));
        mp.add_observation(KeyFrameId::new(4), 17);

        assert_eq!(mp.index_in_keyframe(KeyFrameId::new(4)), Some(17));
        assert_eq!(mp.index_in_keyframe(KeyFrameId::new(5)), None);
        assert!(mp.is_observed_in(KeyFrameId::new(4)));
        assert_eq!(mp.num_observations(), 1);

        assert!(mp.erase_observation(KeyFrameId::new(4)));
        assert!(!mp.erase_observation(KeyFrameId::new(4)));
        assert_eq!(mp.index_in_keyframe(KeyFrameId::new(4)), None);
    }

    #[test]
    fn test_erasure_flag_is_sticky() {
        let mp = MapPoint::new(MapPointId::new(1), Vector3::zeros());
        assert!(!mp.will_be_erased());
        mp.prepare_for_erasing();
        assert!(mp.will_be_erased());
    }
}
