//! Error types.
//!
//! Only contract violations live here. Running out of correspondences or
//! inliers during Sim3 estimation is an ordinary outcome and is reported
//! through [`Sim3Solver::solution_is_valid`](crate::loop_closing::Sim3Solver::solution_is_valid).

use thiserror::Error;

use crate::atlas::map::KeyFrameId;

/// Violations of the covisibility-graph / spanning-tree contract.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
    /// `set_spanning_parent` was called on a node whose parent is already assigned.
    #[error("spanning parent of {node} is already set to {parent}")]
    SpanningParentAlreadySet {
        node: KeyFrameId,
        parent: KeyFrameId,
    },

    /// The node has no spanning parent, so its children cannot be handed over.
    #[error("{0} has no spanning parent to recover connections through")]
    MissingSpanningParent(KeyFrameId),

    /// An id referenced by the graph is not present in the map arena.
    #[error("{0} is not present in the map")]
    UnknownKeyFrame(KeyFrameId),

    /// The spanning tree over live keyframes is not a single rooted tree.
    #[error("spanning tree is inconsistent at {node}: {reason}")]
    InconsistentSpanningTree { node: KeyFrameId, reason: String },
}
