//! Sim3 solver using Horn's method with RANSAC.
//!
//! Estimates the similarity transformation between two keyframes from
//! landmark correspondences. Candidate models are fitted from three random
//! correspondences in closed form and scored by reprojection: a
//! correspondence is an inlier only if it reprojects within the chi-squared
//! gate in *both* images.
//!
//! For stereo / RGB-D rigs the scale is fixed to 1.0.

use std::sync::Arc;

use nalgebra::{Matrix3, Matrix4, Quaternion, SymmetricEigen, UnitQuaternion, Vector3};
use rand::Rng;
use serde::Deserialize;
use tracing::{debug, info};

use crate::atlas::map::{KeyFrame, Map, MapPointId};
use crate::camera::{Camera, Reprojection};
use crate::geometry::Sim3;

use super::sampling::random_distinct_indices;

/// Chi-squared value at 1% significance with 2 degrees of freedom.
pub const CHI_SQ_2D: f64 = 9.21034;

/// Configuration for Sim3 RANSAC solver.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Sim3SolverConfig {
    /// Fix scale to 1.0 (true for stereo / RGB-D).
    pub fix_scale: bool,
    /// Minimum number of inliers for a valid solution.
    pub min_inliers: usize,
    /// RANSAC iterations run by [`Sim3Solver::solve`].
    pub max_iterations: usize,
}

impl Default for Sim3SolverConfig {
    fn default() -> Self {
        Self {
            fix_scale: true,
            min_inliers: 20,
            max_iterations: 200,
        }
    }
}

/// A similarity transform between frame 1 and frame 2, in both directions.
///
/// `p_2 = scale_21 * rot_21 * p_1 + trans_21`, and the `_12` fields hold the
/// inverse.
#[derive(Debug, Clone, PartialEq)]
pub struct Sim3Estimate {
    pub rot_12: Matrix3<f64>,
    pub trans_12: Vector3<f64>,
    pub scale_12: f64,
    pub rot_21: Matrix3<f64>,
    pub trans_21: Vector3<f64>,
    pub scale_21: f64,
}

impl Sim3Estimate {
    /// All-zero transform reported by a failed solve.
    pub fn zeroed() -> Self {
        Self {
            rot_12: Matrix3::zeros(),
            trans_12: Vector3::zeros(),
            scale_12: 0.0,
            rot_21: Matrix3::zeros(),
            trans_21: Vector3::zeros(),
            scale_21: 0.0,
        }
    }

    /// Build both directions from the 2←1 transform.
    pub fn from_sim3_21(sim3_21: &Sim3) -> Self {
        let rot_21 = sim3_21.rotation_matrix();
        let rot_12 = rot_21.transpose();
        let scale_12 = 1.0 / sim3_21.scale;
        Self {
            rot_12,
            trans_12: -scale_12 * (rot_12 * sim3_21.translation),
            scale_12,
            rot_21,
            trans_21: sim3_21.translation,
            scale_21: sim3_21.scale,
        }
    }

    /// Transform taking frame-2 points into frame 1.
    ///
    /// Only meaningful for an estimate that came out of a valid solve.
    pub fn sim3_12(&self) -> Sim3 {
        Sim3::from_rts(self.rot_12, self.trans_12, self.scale_12)
    }

    /// Transform taking frame-1 points into frame 2.
    pub fn sim3_21(&self) -> Sim3 {
        Sim3::from_rts(self.rot_21, self.trans_21, self.scale_21)
    }
}

/// Compute the Sim3 taking `pts_1` onto `pts_2` with Horn's method.
///
/// Algorithm:
/// 1. Center both point sets on their centroids
/// 2. Build the 4x4 matrix N from the cross-covariance M = Σ p1 p2ᵀ
/// 3. The eigenvector of N's largest eigenvalue is the rotation quaternion
/// 4. Scale: s = Σ p2·(R p1) / Σ |p1|² (or 1 when fixed)
/// 5. Translation: t = c2 - s * R * c1
///
/// Returns `None` for mismatched lengths, fewer than 3 points, or (with a
/// free scale) a source set with no spread.
///
/// Reference: B.K.P. Horn, "Closed-form solution of absolute orientation using unit quaternions"
pub fn compute_sim3(
    pts_1: &[Vector3<f64>],
    pts_2: &[Vector3<f64>],
    fix_scale: bool,
) -> Option<Sim3Estimate> {
    let n = pts_1.len();
    if n < 3 || n != pts_2.len() {
        return None;
    }

    let centroid_1 = compute_centroid(pts_1);
    let centroid_2 = compute_centroid(pts_2);
    let centered_1: Vec<_> = pts_1.iter().map(|p| p - centroid_1).collect();
    let centered_2: Vec<_> = pts_2.iter().map(|p| p - centroid_2).collect();

    let mut m = Matrix3::zeros();
    for (p1, p2) in centered_1.iter().zip(&centered_2) {
        m += p1 * p2.transpose();
    }

    let (sxx, sxy, sxz) = (m[(0, 0)], m[(0, 1)], m[(0, 2)]);
    let (syx, syy, syz) = (m[(1, 0)], m[(1, 1)], m[(1, 2)]);
    let (szx, szy, szz) = (m[(2, 0)], m[(2, 1)], m[(2, 2)]);

    #[rustfmt::skip]
    let n_mat = Matrix4::new(
        sxx + syy + szz, syz - szy,        szx - sxz,        sxy - syx,
        syz - szy,       sxx - syy - szz,  sxy + syx,        szx + sxz,
        szx - sxz,       sxy + syx,        -sxx + syy - szz, syz + szy,
        sxy - syx,       szx + sxz,        syz + szy,        -sxx - syy + szz,
    );

    let eigen = SymmetricEigen::new(n_mat);
    let mut max_idx = 0;
    for idx in 1..4 {
        if eigen.eigenvalues[max_idx] <= eigen.eigenvalues[idx] {
            max_idx = idx;
        }
    }
    let q = eigen.eigenvectors.column(max_idx);
    let rotation = UnitQuaternion::from_quaternion(Quaternion::new(q[0], q[1], q[2], q[3]));
    let rot_21 = rotation.to_rotation_matrix().into_inner();

    let scale_21 = if fix_scale {
        1.0
    } else {
        let denom: f64 = centered_1.iter().map(|p| p.norm_squared()).sum();
        if denom < 1e-10 {
            return None;
        }
        let numer: f64 = centered_1
            .iter()
            .zip(&centered_2)
            .map(|(p1, p2)| p2.dot(&(rot_21 * p1)))
            .sum();
        let scale = numer / denom;
        if !scale.is_finite() || scale <= 0.0 {
            return None;
        }
        scale
    };

    let trans_21 = centroid_2 - scale_21 * (rot_21 * centroid_1);

    let rot_12 = rot_21.transpose();
    let scale_12 = 1.0 / scale_21;
    let trans_12 = -scale_12 * (rot_12 * trans_21);

    Some(Sim3Estimate {
        rot_12,
        trans_12,
        scale_12,
        rot_21,
        trans_21,
        scale_21,
    })
}

/// Compute centroid of a set of 3D points.
fn compute_centroid(points: &[Vector3<f64>]) -> Vector3<f64> {
    if points.is_empty() {
        return Vector3::zeros();
    }
    let sum: Vector3<f64> = points.iter().sum();
    sum / points.len() as f64
}

/// Squared pixel distance test against a precomputed reprojection.
fn reprojects_within(reprojected: &Reprojection, truth: &Reprojection, chi_sq_x_sigma_sq: f64) -> bool {
    reprojected.is_valid && (reprojected.point - truth.point).norm_squared() < chi_sq_x_sigma_sq
}

/// RANSAC Sim3 estimation between one keyframe pair.
///
/// Built once per candidate pair, run once, then read through the accessors.
#[derive(Debug)]
pub struct Sim3Solver {
    fix_scale: bool,
    min_inliers: usize,
    max_iterations: usize,

    camera_1: Arc<dyn Camera>,
    camera_2: Arc<dyn Camera>,

    /// Landmark positions in keyframe 1's camera frame.
    common_pts_1: Vec<Vector3<f64>>,
    /// Matched landmark positions in keyframe 2's camera frame.
    common_pts_2: Vec<Vector3<f64>>,
    chi_sq_x_sigma_sq_1: Vec<f64>,
    chi_sq_x_sigma_sq_2: Vec<f64>,
    /// Each point projected into its own image.
    reprojected_1: Vec<Reprojection>,
    reprojected_2: Vec<Reprojection>,
    /// (feature index in keyframe 1, feature index in keyframe 2).
    matched_indices: Vec<(usize, usize)>,

    solution_is_valid: bool,
    best: Sim3Estimate,
    best_inliers: Vec<bool>,
    num_inliers: usize,
}

impl Sim3Solver {
    /// Gather the usable correspondences between `kf_1` and `kf_2`.
    ///
    /// `matched_lms_in_kf_2[idx_1]` names the landmark believed to match
    /// feature `idx_1` of `kf_1`. A pair is kept only if both landmarks are
    /// in the map and not being erased, and `kf_2` observes its landmark.
    pub fn new(
        map: &Map,
        kf_1: &KeyFrame,
        kf_2: &KeyFrame,
        matched_lms_in_kf_2: &[Option<MapPointId>],
        config: &Sim3SolverConfig,
    ) -> Self {
        let rot_1w = kf_1.rotation_cw();
        let trans_1w = kf_1.translation_cw();
        let rot_2w = kf_2.rotation_cw();
        let trans_2w = kf_2.translation_cw();

        let kf_1_landmarks = kf_1.landmarks();
        let capacity = kf_1_landmarks.len().min(matched_lms_in_kf_2.len());

        let mut common_pts_1 = Vec::with_capacity(capacity);
        let mut common_pts_2 = Vec::with_capacity(capacity);
        let mut chi_sq_x_sigma_sq_1 = Vec::with_capacity(capacity);
        let mut chi_sq_x_sigma_sq_2 = Vec::with_capacity(capacity);
        let mut matched_indices = Vec::with_capacity(capacity);

        for (idx_1, (lm_1, lm_2)) in kf_1_landmarks.iter().zip(matched_lms_in_kf_2).enumerate() {
            let (Some(lm_1), Some(lm_2)) = (lm_1, lm_2) else {
                continue;
            };
            let (Some(mp_1), Some(mp_2)) = (map.get_map_point(*lm_1), map.get_map_point(*lm_2)) else {
                continue;
            };
            if mp_1.will_be_erased() || mp_2.will_be_erased() {
                continue;
            }
            let Some(idx_2) = mp_2.index_in_keyframe(kf_2.id) else {
                continue;
            };
            let (Some(sigma_sq_1), Some(sigma_sq_2)) = (kf_1.sigma_sq_at(idx_1), kf_2.sigma_sq_at(idx_2)) else {
                continue;
            };

            chi_sq_x_sigma_sq_1.push(CHI_SQ_2D * sigma_sq_1);
            chi_sq_x_sigma_sq_2.push(CHI_SQ_2D * sigma_sq_2);
            matched_indices.push((idx_1, idx_2));
            common_pts_1.push(rot_1w * mp_1.position() + trans_1w);
            common_pts_2.push(rot_2w * mp_2.position() + trans_2w);
        }

        let camera_1 = kf_1.camera().clone();
        let camera_2 = kf_2.camera().clone();
        let reprojected_1 = reproject_to_same_image(camera_1.as_ref(), &common_pts_1);
        let reprojected_2 = reproject_to_same_image(camera_2.as_ref(), &common_pts_2);

        debug!(
            "Sim3 solver {} <-> {}: {} common points",
            kf_1.id,
            kf_2.id,
            common_pts_1.len()
        );

        Self {
            fix_scale: config.fix_scale,
            min_inliers: config.min_inliers,
            max_iterations: config.max_iterations,
            camera_1,
            camera_2,
            common_pts_1,
            common_pts_2,
            chi_sq_x_sigma_sq_1,
            chi_sq_x_sigma_sq_2,
            reprojected_1,
            reprojected_2,
            matched_indices,
            solution_is_valid: false,
            best: Sim3Estimate::zeroed(),
            best_inliers: Vec::new(),
            num_inliers: 0,
        }
    }

    /// Run RANSAC for the configured number of iterations.
    pub fn solve(&mut self) -> bool {
        self.find_via_ransac(self.max_iterations)
    }

    /// Run RANSAC for `max_iterations` iterations with the thread-local RNG.
    pub fn find_via_ransac(&mut self, max_iterations: usize) -> bool {
        let mut rng = rand::thread_rng();
        self.find_via_ransac_with_rng(max_iterations, &mut rng)
    }

    /// Run RANSAC with a caller-supplied RNG.
    ///
    /// Every iteration runs; the model with the strictly highest inlier count
    /// wins. Returns whether the solution is valid.
    pub fn find_via_ransac_with_rng<R: Rng + ?Sized>(&mut self, max_iterations: usize, rng: &mut R) -> bool {
        self.solution_is_valid = false;
        self.best = Sim3Estimate::zeroed();
        self.best_inliers.clear();
        self.num_inliers = 0;

        let num_common_pts = self.num_common_points();
        if num_common_pts < 3 || num_common_pts < self.min_inliers {
            debug!(
                "Sim3 RANSAC skipped: {} common points, {} inliers required",
                num_common_pts, self.min_inliers
            );
            return false;
        }

        let mut best: Option<(Sim3Estimate, Vec<bool>)> = None;
        let mut max_num_inliers = 0;

        for _ in 0..max_iterations {
            let Some(indices) = random_distinct_indices(rng, 3, 0, num_common_pts - 1) else {
                break;
            };
            let pts_1: Vec<_> = indices.iter().map(|&i| self.common_pts_1[i]).collect();
            let pts_2: Vec<_> = indices.iter().map(|&i| self.common_pts_2[i]).collect();

            let Some(estimate) = compute_sim3(&pts_1, &pts_2, self.fix_scale) else {
                continue;
            };

            let (inliers, num_inliers) = self.count_inliers(&estimate);
            if max_num_inliers < num_inliers {
                max_num_inliers = num_inliers;
                best = Some((estimate, inliers));
            }
        }

        match best {
            Some((estimate, inliers)) if max_num_inliers >= self.min_inliers => {
                self.solution_is_valid = true;
                self.best = estimate;
                self.best_inliers = inliers;
                self.num_inliers = max_num_inliers;
                info!(
                    "Sim3 RANSAC: {}/{} inliers, scale {:.4}",
                    max_num_inliers, num_common_pts, self.best.scale_21
                );
            }
            _ => {
                debug!(
                    "Sim3 RANSAC failed: best {} inliers, {} required",
                    max_num_inliers, self.min_inliers
                );
            }
        }

        self.solution_is_valid
    }

    /// Flag the correspondences that reproject within both gates under `estimate`.
    fn count_inliers(&self, estimate: &Sim3Estimate) -> (Vec<bool>, usize) {
        let scaled_rot_21 = estimate.scale_21 * estimate.rot_21;
        let scaled_rot_12 = estimate.scale_12 * estimate.rot_12;

        let inliers: Vec<bool> = (0..self.num_common_points())
            .map(|i| {
                let in_2 = self
                    .camera_2
                    .reproject_to_image(&scaled_rot_21, &estimate.trans_21, &self.common_pts_1[i]);
                let in_1 = self
                    .camera_1
                    .reproject_to_image(&scaled_rot_12, &estimate.trans_12, &self.common_pts_2[i]);

                reprojects_within(&in_2, &self.reprojected_2[i], self.chi_sq_x_sigma_sq_2[i])
                    && reprojects_within(&in_1, &self.reprojected_1[i], self.chi_sq_x_sigma_sq_1[i])
            })
            .collect();

        let num_inliers = inliers.iter().filter(|&&inlier| inlier).count();
        (inliers, num_inliers)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Results
    // ─────────────────────────────────────────────────────────────────────────

    pub fn solution_is_valid(&self) -> bool {
        self.solution_is_valid
    }

    pub fn best_rotation_12(&self) -> Matrix3<f64> {
        self.best.rot_12
    }

    pub fn best_translation_12(&self) -> Vector3<f64> {
        self.best.trans_12
    }

    pub fn best_scale_12(&self) -> f64 {
        self.best.scale_12
    }

    pub fn best_rotation_21(&self) -> Matrix3<f64> {
        self.best.rot_21
    }

    pub fn best_translation_21(&self) -> Vector3<f64> {
        self.best.trans_21
    }

    pub fn best_scale_21(&self) -> f64 {
        self.best.scale_21
    }

    /// Winning model; zeroed unless the solution is valid.
    pub fn best_estimate(&self) -> &Sim3Estimate {
        &self.best
    }

    /// Inlier flags of the winning model, parallel to [`matched_indices`](Self::matched_indices).
    pub fn best_inliers(&self) -> &[bool] {
        &self.best_inliers
    }

    pub fn num_inliers(&self) -> usize {
        self.num_inliers
    }

    pub fn num_common_points(&self) -> usize {
        self.common_pts_1.len()
    }

    pub fn matched_indices(&self) -> &[(usize, usize)] {
        &self.matched_indices
    }
}

fn reproject_to_same_image(camera: &dyn Camera, pts: &[Vector3<f64>]) -> Vec<Reprojection> {
    let identity = Matrix3::identity();
    let zero = Vector3::zeros();
    pts.iter()
        .map(|p| camera.reproject_to_image(&identity, &zero, p))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::PerspectiveCamera;
    use crate::feature::KeyPoint;
    use crate::geometry::SE3;
    use approx::assert_relative_eq;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn random_points(rng: &mut StdRng, n: usize) -> Vec<Vector3<f64>> {
        (0..n)
            .map(|_| {
                Vector3::new(
                    rng.gen_range(-2.0..2.0),
                    rng.gen_range(-1.5..1.5),
                    rng.gen_range(6.0..10.0),
                )
            })
            .collect()
    }

    #[test]
    fn test_compute_sim3_worked_example() {
        let pts_1 = vec![
            Vector3::new(0.0, 0.0, 0.0),
            Vector3::new(1.0, 0.0, 0.0),
            Vector3::new(0.0, 1.0, 0.0),
        ];
        let pts_2 = vec![
            Vector3::new(5.0, 0.0, 0.0),
            Vector3::new(7.0, 0.0, 0.0),
            Vector3::new(5.0, 2.0, 0.0),
        ];

        let estimate = compute_sim3(&pts_1, &pts_2, false).unwrap();

        assert_relative_eq!(estimate.rot_21, Matrix3::identity(), epsilon = 1e-10);
        assert_relative_eq!(estimate.scale_21, 2.0, epsilon = 1e-10);
        assert_relative_eq!(estimate.trans_21, Vector3::new(5.0, 0.0, 0.0), epsilon = 1e-10);
        assert_relative_eq!(estimate.scale_12, 0.5, epsilon = 1e-10);
        assert_relative_eq!(estimate.trans_12, Vector3::new(-2.5, 0.0, 0.0), epsilon = 1e-10);
    }

    #[test]
    fn test_compute_sim3_recovers_random_transform() {
        let mut rng = StdRng::seed_from_u64(42);
        for _ in 0..20 {
            let rotation = UnitQuaternion::from_euler_angles(
                rng.gen_range(-3.0..3.0),
                rng.gen_range(-1.5..1.5),
                rng.gen_range(-3.0..3.0),
            );
            let truth = Sim3 {
                rotation,
                translation: Vector3::new(
                    rng.gen_range(-5.0..5.0),
                    rng.gen_range(-5.0..5.0),
                    rng.gen_range(-5.0..5.0),
                ),
                scale: rng.gen_range(0.5..2.0),
            };
            let num_points = 3 + rng.gen_range(0..10);
            let pts_1 = random_points(&mut rng, num_points);
            let pts_2: Vec<_> = pts_1.iter().map(|p| truth.transform_point(p)).collect();

            let estimate = compute_sim3(&pts_1, &pts_2, false).unwrap();

            assert_relative_eq!(estimate.rot_21, truth.rotation_matrix(), epsilon = 1e-8);
            assert_relative_eq!(estimate.scale_21, truth.scale, epsilon = 1e-8);
            assert_relative_eq!(estimate.trans_21, truth.translation, epsilon = 1e-7);
            assert_relative_eq!(estimate.rot_21 * estimate.rot_12, Matrix3::identity(), epsilon = 1e-10);
            assert_relative_eq!(estimate.scale_21 * estimate.scale_12, 1.0, epsilon = 1e-12);
            for (p1, p2) in pts_1.iter().zip(&pts_2) {
                assert_relative_eq!(estimate.sim3_12().transform_point(p2), *p1, epsilon = 1e-7);
            }
        }
    }

    #[test]
    fn test_compute_sim3_fixed_scale_is_one() {
        let mut rng = StdRng::seed_from_u64(3);
        let pts_1 = random_points(&mut rng, 6);
        let pts_2: Vec<_> = pts_1.iter().map(|p| p * 3.0 + Vector3::new(1.0, 0.0, 0.0)).collect();

        let estimate = compute_sim3(&pts_1, &pts_2, true).unwrap();

        assert_eq!(estimate.scale_21, 1.0);
        assert_eq!(estimate.scale_12, 1.0);
        assert_relative_eq!(estimate.rot_21, Matrix3::identity(), epsilon = 1e-10);
    }

    #[test]
    fn test_compute_sim3_rejects_bad_input() {
        let p = Vector3::new(1.0, 2.0, 3.0);
        assert!(compute_sim3(&[p, p], &[p, p], true).is_none());
        assert!(compute_sim3(&[p, p, p], &[p, p], true).is_none());
        // No spread in the source set
        assert!(compute_sim3(&[p, p, p], &[p, p * 2.0, p * 3.0], false).is_none());
    }

    #[test]
    fn test_estimate_from_sim3_is_consistent() {
        let sim3_21 = Sim3 {
            rotation: UnitQuaternion::from_euler_angles(0.1, -0.2, 0.3),
            translation: Vector3::new(1.0, 2.0, 3.0),
            scale: 1.5,
        };
        let estimate = Sim3Estimate::from_sim3_21(&sim3_21);
        let p = Vector3::new(0.3, -0.7, 4.0);

        assert_relative_eq!(
            estimate.sim3_12().transform_point(&sim3_21.transform_point(&p)),
            p,
            epsilon = 1e-10
        );
    }

    /// A map with two keyframes observing the same scene.
    ///
    /// Keyframe 2 sees its landmarks through `sim3_21` applied to keyframe 1's
    /// landmark positions. Keyframe 1 sits at the world origin, so `sim3_21`
    /// maps keyframe-1 camera coordinates to keyframe-2 camera coordinates.
    struct Scene {
        map: Map,
        kf_1: Arc<KeyFrame>,
        kf_2: Arc<KeyFrame>,
        matches: Vec<Option<MapPointId>>,
    }

    fn pose_2() -> SE3 {
        SE3::new(
            UnitQuaternion::from_euler_angles(0.0, 0.05, 0.0),
            Vector3::new(0.3, 0.0, 0.2),
        )
    }

    fn build_scene(
        positions: &[Vector3<f64>],
        world_scale: f64,
        sigma_sq_1: f64,
        sigma_sq_2: f64,
    ) -> Scene {
        let map = Map::new();
        let camera = Arc::new(PerspectiveCamera::new(500.0, 500.0, 320.0, 240.0, 640, 480));
        let n = positions.len();
        let keypoints: Vec<_> = (0..n).map(|_| KeyPoint::new(0.0, 0.0, 0)).collect();

        let kf_1 = map.create_keyframe(SE3::identity(), keypoints.clone(), vec![sigma_sq_1], camera.clone());
        let kf_2 = map.create_keyframe(pose_2(), keypoints, vec![sigma_sq_2], camera);

        let mut matches = Vec::with_capacity(n);
        for (i, pos) in positions.iter().enumerate() {
            let mp_1 = map.create_map_point(*pos);
            let mp_2 = map.create_map_point(pos * world_scale);
            map.add_observation(kf_1.id, i, mp_1.id);
            // Keyframe 2 stores its features in reverse order.
            map.add_observation(kf_2.id, n - 1 - i, mp_2.id);
            matches.push(Some(mp_2.id));
        }

        Scene {
            map,
            kf_1,
            kf_2,
            matches,
        }
    }

    fn solver(scene: &Scene, config: &Sim3SolverConfig) -> Sim3Solver {
        Sim3Solver::new(&scene.map, &scene.kf_1, &scene.kf_2, &scene.matches, config)
    }

    fn true_estimate(world_scale: f64) -> Sim3Estimate {
        let pose = pose_2();
        Sim3Estimate::from_sim3_21(&Sim3 {
            rotation: pose.rotation,
            translation: pose.translation,
            scale: world_scale,
        })
    }

    #[test]
    fn test_solver_collects_usable_pairs() {
        let mut rng = StdRng::seed_from_u64(5);
        let mut scene = build_scene(&random_points(&mut rng, 6), 1.0, 1.0, 1.0);

        // No candidate for feature 0
        scene.matches[0] = None;
        // Landmark pending erasure
        let erased = scene.matches[1].unwrap();
        scene.map.get_map_point(erased).unwrap().prepare_for_erasing();
        // Landmark not observed by keyframe 2
        let unobserved = scene.map.create_map_point(Vector3::new(0.0, 0.0, 8.0));
        scene.matches[2] = Some(unobserved.id);

        let solver = solver(&scene, &Sim3SolverConfig::default());

        assert_eq!(solver.num_common_points(), 3);
        assert_eq!(solver.matched_indices(), &[(3, 2), (4, 1), (5, 0)]);
    }

    #[test]
    fn test_solver_recovers_rigid_transform() {
        let mut rng = StdRng::seed_from_u64(11);
        let scene = build_scene(&random_points(&mut rng, 40), 1.0, 1.0, 1.0);
        let mut solver = solver(&scene, &Sim3SolverConfig::default());

        assert!(solver.find_via_ransac_with_rng(50, &mut rng));

        let truth = true_estimate(1.0);
        assert_eq!(solver.num_inliers(), 40);
        assert!(solver.best_inliers().iter().all(|&inlier| inlier));
        assert_eq!(solver.best_scale_12(), 1.0);
        assert_relative_eq!(solver.best_rotation_21(), truth.rot_21, epsilon = 1e-8);
        assert_relative_eq!(solver.best_translation_21(), truth.trans_21, epsilon = 1e-8);
        assert_relative_eq!(solver.best_rotation_12(), truth.rot_12, epsilon = 1e-8);
        assert_relative_eq!(solver.best_translation_12(), truth.trans_12, epsilon = 1e-8);
    }

    #[test]
    fn test_solver_recovers_scale_with_outliers() {
        let mut rng = StdRng::seed_from_u64(23);
        let inlier_positions = random_points(&mut rng, 40);
        let mut scene = build_scene(&inlier_positions, 1.5, 1.0, 1.0);

        // Rewire ten correspondences to unrelated landmarks of keyframe 2.
        for i in 0..10 {
            let j = (i * 7 + 3) % 40;
            scene.matches.swap(i, j);
        }
        let outliers = (0..40)
            .filter(|&i| {
                let mp = scene.map.get_map_point(scene.matches[i].unwrap()).unwrap();
                mp.index_in_keyframe(scene.kf_2.id) != Some(40 - 1 - i)
            })
            .count();
        assert!(outliers > 0);

        let config = Sim3SolverConfig {
            fix_scale: false,
            ..Default::default()
        };
        let mut solver = solver(&scene, &config);

        assert!(solver.find_via_ransac_with_rng(200, &mut rng));

        let truth = true_estimate(1.5);
        assert_eq!(solver.num_inliers(), 40 - outliers);
        assert_relative_eq!(solver.best_scale_21(), 1.5, epsilon = 1e-8);
        assert_relative_eq!(solver.best_scale_12(), 1.0 / 1.5, epsilon = 1e-8);
        assert_relative_eq!(solver.best_rotation_21(), truth.rot_21, epsilon = 1e-8);
        assert_relative_eq!(solver.best_translation_21(), truth.trans_21, epsilon = 1e-8);
    }

    #[test]
    fn test_inlier_requires_both_directions() {
        let mut rng = StdRng::seed_from_u64(8);
        let positions = random_points(&mut rng, 10);

        // Keyframe 1 gates tightly, keyframe 2 loosely.
        let tight = build_scene(&positions, 1.0, 0.01, 1.0);
        // Shift one of keyframe 2's landmarks by 2 cm: about one pixel in either image.
        let moved = tight.map.get_map_point(tight.matches[4].unwrap()).unwrap();
        moved.set_position(moved.position() + Vector3::new(0.02, 0.0, 0.0));

        let solver_tight = solver(&tight, &Sim3SolverConfig::default());
        let (inliers, num_inliers) = solver_tight.count_inliers(&true_estimate(1.0));

        assert_eq!(num_inliers, 9);
        assert!(!inliers[4]);

        // The same shift passes when both gates are loose.
        let loose = build_scene(&positions, 1.0, 1.0, 1.0);
        let moved = loose.map.get_map_point(loose.matches[4].unwrap()).unwrap();
        moved.set_position(moved.position() + Vector3::new(0.02, 0.0, 0.0));

        let solver_loose = solver(&loose, &Sim3SolverConfig::default());
        let (inliers, num_inliers) = solver_loose.count_inliers(&true_estimate(1.0));

        assert_eq!(num_inliers, 10);
        assert!(inliers[4]);
    }

    #[test]
    fn test_too_few_correspondences_is_invalid() {
        let mut rng = StdRng::seed_from_u64(2);
        let scene = build_scene(&random_points(&mut rng, 2), 1.0, 1.0, 1.0);
        let config = Sim3SolverConfig {
            min_inliers: 0,
            ..Default::default()
        };
        let mut solver = solver(&scene, &config);

        assert!(!solver.find_via_ransac_with_rng(100, &mut rng));
        assert!(!solver.solution_is_valid());
        assert_eq!(solver.best_estimate(), &Sim3Estimate::zeroed());
        assert!(solver.best_inliers().is_empty());
    }

    #[test]
    fn test_min_inliers_above_common_points_is_invalid() {
        let mut rng = StdRng::seed_from_u64(4);
        let scene = build_scene(&random_points(&mut rng, 10), 1.0, 1.0, 1.0);
        let config = Sim3SolverConfig {
            min_inliers: 11,
            ..Default::default()
        };
        let mut solver = solver(&scene, &config);

        assert!(!solver.solve());
        assert_eq!(solver.num_inliers(), 0);
        assert_eq!(solver.best_scale_21(), 0.0);
        assert_eq!(solver.best_rotation_12(), Matrix3::zeros());
    }
}
