//! Loop closing geometry.
//!
//! Once a loop candidate with landmark correspondences is known, the
//! [`Sim3Solver`] checks it geometrically: RANSAC over closed-form Sim3 fits,
//! scored by two-sided reprojection. A valid solution is what the caller
//! feeds back into the map as a loop edge (`Map::add_loop_edge`).

pub mod sampling;
pub mod sim3_solver;

pub use sampling::random_distinct_indices;
pub use sim3_solver::{compute_sim3, Sim3Estimate, Sim3Solver, Sim3SolverConfig, CHI_SQ_2D};
