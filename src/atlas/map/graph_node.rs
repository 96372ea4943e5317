//! GraphNode - one keyframe's slice of the covisibility graph and spanning tree.
//!
//! Every KeyFrame owns exactly one GraphNode. The node stores:
//! - **Covisibility edges**: neighbor → number of co-observed landmarks, plus
//!   the same edges sorted by descending weight for top-N / over-weight queries
//! - **Spanning tree links**: parent (unset only for the origin) and children
//! - **Loop edges**: confirmed loop closures, never removed
//!
//! # Locking
//!
//! Each node guards its state with its own mutex. Operations that touch
//! several nodes (`update_connections`, `erase_all_connections`,
//! `change_spanning_parent`, `recover_spanning_connections`) are sequences of
//! single-node critical sections: a node never holds its lock while calling
//! into another node. The one exception is [`GraphNode::add_loop_edge_pair`],
//! which holds two locks at once and always acquires them in ascending
//! keyframe-id order.
//!
//! Neighbors are stored by id and resolved through the [`Map`] arena, so the
//! keyframe ↔ node ↔ neighbor references never form ownership cycles.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use parking_lot::Mutex;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::GraphError;

use super::map::Map;
use super::types::KeyFrameId;

/// Configuration for covisibility-edge materialization.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    /// Neighbors sharing more than this many landmarks become covisibility
    /// edges in `update_connections`.
    pub covisibility_weight_threshold: u32,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            covisibility_weight_threshold: 15,
        }
    }
}

#[derive(Debug, Default)]
struct GraphState {
    /// Covisibility weights: connected KeyFrame → number of shared landmarks.
    weights: HashMap<KeyFrameId, u32>,

    /// `weights` sorted by descending weight. Always rebuilt together with
    /// `ordered_weights`, so the two stay index-aligned.
    ordered_covisibilities: Vec<KeyFrameId>,
    ordered_weights: Vec<u32>,

    spanning_parent: Option<KeyFrameId>,
    spanning_children: BTreeSet<KeyFrameId>,

    loop_edges: BTreeSet<KeyFrameId>,
}

impl GraphState {
    fn update_covisibility_orders(&mut self) {
        let (ids, weights) = sort_by_weight(self.weights.iter().map(|(id, w)| (*id, *w)));
        self.ordered_covisibilities = ids;
        self.ordered_weights = weights;
    }
}

/// Sort (keyframe, weight) pairs by descending weight, ties by descending id.
fn sort_by_weight(
    pairs: impl Iterator<Item = (KeyFrameId, u32)>,
) -> (Vec<KeyFrameId>, Vec<u32>) {
    let mut pairs: Vec<(KeyFrameId, u32)> = pairs.collect();
    pairs.sort_unstable_by(|a, b| b.1.cmp(&a.1).then_with(|| b.0.cmp(&a.0)));
    pairs.into_iter().unzip()
}

/// Covisibility / spanning-tree node of a single keyframe.
#[derive(Debug)]
pub struct GraphNode {
    owner: KeyFrameId,
    /// The origin keyframe never receives a spanning parent from `update_connections`.
    is_root: bool,
    weight_threshold: u32,
    state: Mutex<GraphState>,
}

impl GraphNode {
    pub fn new(owner: KeyFrameId, is_root: bool, weight_threshold: u32) -> Self {
        Self {
            owner,
            is_root,
            weight_threshold,
            state: Mutex::new(GraphState::default()),
        }
    }

    /// The keyframe this node belongs to.
    pub fn owner(&self) -> KeyFrameId {
        self.owner
    }

    pub fn is_root(&self) -> bool {
        self.is_root
    }

    pub fn weight_threshold(&self) -> u32 {
        self.weight_threshold
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Covisibility Graph
    // ─────────────────────────────────────────────────────────────────────────

    /// Insert or update the edge to `peer`.
    ///
    /// Only this node changes; the caller is responsible for the reciprocal
    /// update on `peer`'s node.
    pub fn add_connection(&self, peer: KeyFrameId, weight: u32) {
        if peer == self.owner {
            return;
        }
        let mut state = self.state.lock();
        if state.weights.insert(peer, weight) != Some(weight) {
            state.update_covisibility_orders();
        }
    }

    /// Remove the edge to `peer` if present.
    pub fn erase_connection(&self, peer: KeyFrameId) {
        let mut state = self.state.lock();
        if state.weights.remove(&peer).is_some() {
            state.update_covisibility_orders();
        }
    }

    /// Remove this node from every neighbor, then drop all of its own edges.
    pub fn erase_all_connections(&self, map: &Map) {
        let peers: Vec<KeyFrameId> = self.state.lock().weights.keys().copied().collect();

        for peer in peers {
            match map.get_keyframe(peer) {
                Some(peer_kf) => peer_kf.graph().erase_connection(self.owner),
                None => warn!("{}: covisible {} is no longer in the map", self.owner, peer),
            }
        }

        let mut state = self.state.lock();
        state.weights.clear();
        state.ordered_covisibilities.clear();
        state.ordered_weights.clear();
    }

    /// Recompute this node's edges from the owning keyframe's landmarks.
    ///
    /// Each live landmark adds one unit of weight towards every other keyframe
    /// observing it. Neighbors above the weight threshold become edges; when
    /// none qualifies the single strongest neighbor is kept so the node is
    /// never isolated. Every kept neighbor receives the reciprocal edge.
    ///
    /// The first successful call on a non-root node also attaches it to the
    /// spanning tree under its strongest neighbor.
    pub fn update_connections(&self, map: &Map) {
        let Some(owner_kf) = map.get_keyframe(self.owner) else {
            warn!("{}: update_connections on a keyframe missing from the map", self.owner);
            return;
        };

        let mut weights: BTreeMap<KeyFrameId, u32> = BTreeMap::new();
        for mp_id in owner_kf.landmarks().into_iter().flatten() {
            let Some(mp) = map.get_map_point(mp_id) else {
                continue;
            };
            if mp.will_be_erased() {
                continue;
            }
            for kf_id in mp.observations().into_keys() {
                if kf_id == self.owner || !map.contains_keyframe(kf_id) {
                    continue;
                }
                *weights.entry(kf_id).or_insert(0) += 1;
            }
        }

        if weights.is_empty() {
            return;
        }

        let mut connections: Vec<(KeyFrameId, u32)> = weights
            .iter()
            .filter(|(_, &w)| w > self.weight_threshold)
            .map(|(id, w)| (*id, *w))
            .collect();

        if connections.is_empty() {
            // Ties go to the highest id, matching the head of the sorted order.
            if let Some((id, w)) = weights.iter().max_by_key(|(id, w)| (**w, **id)) {
                connections.push((*id, *w));
            }
        }

        for &(peer, weight) in &connections {
            if let Some(peer_kf) = map.get_keyframe(peer) {
                peer_kf.graph().add_connection(self.owner, weight);
            }
        }

        let (ordered_covisibilities, ordered_weights) =
            sort_by_weight(connections.iter().copied());

        let new_parent = {
            let mut state = self.state.lock();
            state.weights = connections.into_iter().collect();
            state.ordered_covisibilities = ordered_covisibilities;
            state.ordered_weights = ordered_weights;

            if state.spanning_parent.is_none() && !self.is_root {
                let parent = state.ordered_covisibilities.first().copied();
                state.spanning_parent = parent;
                parent
            } else {
                None
            }
        };

        if let Some(parent) = new_parent {
            match map.get_keyframe(parent) {
                Some(parent_kf) => {
                    parent_kf.graph().add_spanning_child(self.owner);
                    debug!("{}: spanning parent set to {}", self.owner, parent);
                }
                None => warn!("{}: spanning parent {} vanished from the map", self.owner, parent),
            }
        }
    }

    /// Re-derive the ordered neighbor/weight lists from the weight map.
    ///
    /// Every mutator already does this; exposed for callers that want to
    /// force a rebuild.
    pub fn update_covisibility_orders(&self) {
        self.state.lock().update_covisibility_orders();
    }

    /// All connected keyframes, unordered.
    pub fn get_connected_keyframes(&self) -> HashSet<KeyFrameId> {
        self.state.lock().weights.keys().copied().collect()
    }

    /// Connected keyframes, strongest first.
    pub fn get_covisibilities(&self) -> Vec<KeyFrameId> {
        self.state.lock().ordered_covisibilities.clone()
    }

    /// The `n` strongest neighbors (fewer if the node has fewer edges).
    pub fn get_top_n_covisibilities(&self, n: usize) -> Vec<KeyFrameId> {
        let state = self.state.lock();
        let n = n.min(state.ordered_covisibilities.len());
        state.ordered_covisibilities[..n].to_vec()
    }

    /// Neighbors whose weight is strictly greater than `weight`, strongest first.
    pub fn get_covisibilities_over_weight(&self, weight: u32) -> Vec<KeyFrameId> {
        let state = self.state.lock();
        let num = state.ordered_weights.partition_point(|&w| w > weight);
        state.ordered_covisibilities[..num].to_vec()
    }

    /// Ordered weights, parallel to [`get_covisibilities`](Self::get_covisibilities).
    pub fn get_ordered_weights(&self) -> Vec<u32> {
        self.state.lock().ordered_weights.clone()
    }

    /// Covisibility weight with `peer`; 0 when not connected.
    pub fn get_weight(&self, peer: KeyFrameId) -> u32 {
        self.state.lock().weights.get(&peer).copied().unwrap_or(0)
    }

    /// Number of covisibility edges.
    pub fn degree(&self) -> usize {
        self.state.lock().weights.len()
    }

    /// Whether the ordered lists are a descending sort of the weight map.
    pub fn covisibility_orders_are_consistent(&self) -> bool {
        let state = self.state.lock();
        if state.ordered_covisibilities.len() != state.weights.len()
            || state.ordered_weights.len() != state.weights.len()
        {
            return false;
        }
        let descending = state.ordered_weights.windows(2).all(|w| w[0] >= w[1]);
        let aligned = state
            .ordered_covisibilities
            .iter()
            .zip(&state.ordered_weights)
            .all(|(id, w)| state.weights.get(id) == Some(w));
        descending && aligned
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Spanning Tree
    // ─────────────────────────────────────────────────────────────────────────

    /// Assign the spanning parent. Fails if one is already assigned.
    ///
    /// The parent's child set is not touched.
    pub fn set_spanning_parent(&self, parent: KeyFrameId) -> Result<(), GraphError> {
        let mut state = self.state.lock();
        if let Some(existing) = state.spanning_parent {
            return Err(GraphError::SpanningParentAlreadySet {
                node: self.owner,
                parent: existing,
            });
        }
        state.spanning_parent = Some(parent);
        Ok(())
    }

    pub fn get_spanning_parent(&self) -> Option<KeyFrameId> {
        self.state.lock().spanning_parent
    }

    /// Reassign the spanning parent and register this node as its child.
    pub fn change_spanning_parent(&self, new_parent: KeyFrameId, map: &Map) -> Result<(), GraphError> {
        let parent_kf = map
            .get_keyframe(new_parent)
            .ok_or(GraphError::UnknownKeyFrame(new_parent))?;

        self.state.lock().spanning_parent = Some(new_parent);
        parent_kf.graph().add_spanning_child(self.owner);
        Ok(())
    }

    pub fn add_spanning_child(&self, child: KeyFrameId) {
        self.state.lock().spanning_children.insert(child);
    }

    pub fn erase_spanning_child(&self, child: KeyFrameId) {
        self.state.lock().spanning_children.remove(&child);
    }

    pub fn get_spanning_children(&self) -> BTreeSet<KeyFrameId> {
        self.state.lock().spanning_children.clone()
    }

    pub fn has_spanning_child(&self, child: KeyFrameId) -> bool {
        self.state.lock().spanning_children.contains(&child)
    }

    /// Hand this node's spanning children over to other keyframes before it
    /// is erased.
    ///
    /// Children are attached greedily: starting from this node's parent as the
    /// only candidate, the (child, candidate) pair with the largest
    /// covisibility weight is linked, and the child becomes a candidate
    /// itself. Children that share no edge with any candidate fall back to
    /// this node's parent. Finally the node leaves its parent's child set.
    ///
    /// Must not run concurrently with `update_connections` on this node.
    pub fn recover_spanning_connections(&self, map: &Map) -> Result<(), GraphError> {
        let (parent, mut pending) = {
            let state = self.state.lock();
            (state.spanning_parent, state.spanning_children.clone())
        };
        let parent = parent.ok_or(GraphError::MissingSpanningParent(self.owner))?;
        let parent_kf = map
            .get_keyframe(parent)
            .ok_or(GraphError::UnknownKeyFrame(parent))?;

        let mut candidates: BTreeSet<KeyFrameId> = BTreeSet::from([parent]);

        loop {
            let mut best = None;
            let mut max_weight = 0;

            for &child in &pending {
                let Some(child_kf) = map.get_keyframe(child) else {
                    continue;
                };
                if child_kf.will_be_erased() {
                    continue;
                }

                let child_node = child_kf.graph();
                for candidate in child_node.get_covisibilities() {
                    if !candidates.contains(&candidate) {
                        continue;
                    }
                    let weight = child_node.get_weight(candidate);
                    if weight > max_weight {
                        max_weight = weight;
                        best = Some((child_kf.clone(), candidate));
                    }
                }
            }

            let Some((child_kf, new_parent)) = best else {
                break;
            };

            child_kf.graph().change_spanning_parent(new_parent, map)?;
            pending.remove(&child_kf.id);
            candidates.insert(child_kf.id);
            debug!(
                "{}: reattached {} under {} (weight {})",
                self.owner, child_kf.id, new_parent, max_weight
            );
        }

        for child in &pending {
            match map.get_keyframe(*child) {
                Some(child_kf) => {
                    child_kf.graph().change_spanning_parent(parent, map)?;
                    warn!(
                        "{}: no covisible candidate for {}, falling back to {}",
                        self.owner, child, parent
                    );
                }
                None => warn!("{}: spanning child {} is no longer in the map", self.owner, child),
            }
        }

        self.state.lock().spanning_children.clear();
        parent_kf.graph().erase_spanning_child(self.owner);
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Loop Edges
    // ─────────────────────────────────────────────────────────────────────────

    /// Record a loop edge on this node only.
    ///
    /// A node with any loop edge pins its keyframe against erasure for good.
    /// Use [`add_loop_edge_pair`](Self::add_loop_edge_pair) (or
    /// `Map::add_loop_edge`) to register both sides at once.
    pub fn add_loop_edge(&self, peer: KeyFrameId) {
        self.state.lock().loop_edges.insert(peer);
    }

    /// Register a loop edge on both nodes atomically.
    ///
    /// Locks are taken in ascending keyframe-id order.
    pub fn add_loop_edge_pair(a: &GraphNode, b: &GraphNode) {
        if a.owner == b.owner {
            return;
        }
        let (first, second) = if a.owner < b.owner { (a, b) } else { (b, a) };
        let mut first_state = first.state.lock();
        let mut second_state = second.state.lock();
        first_state.loop_edges.insert(second.owner);
        second_state.loop_edges.insert(first.owner);
    }

    pub fn get_loop_edges(&self) -> BTreeSet<KeyFrameId> {
        self.state.lock().loop_edges.clone()
    }

    pub fn has_loop_edge(&self) -> bool {
        !self.state.lock().loop_edges.is_empty()
    }
}
