use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use zkbo_common::{GraphResolutionError, HoldingEdge, NodeId};

/// How far resolution got at one node.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeState {
    /// Outgoing edges were resolved and recorded.
    Expanded,
    /// Every adapter answered and none reported a holding.
    Terminal,
    /// Has holdings beyond the depth ceiling.
    Truncated,
    /// Adapters failed or reported only unusable edges.
    Unresolved,
}

/// Depth-bounded ownership graph rooted at a wallet. May contain cycles.
#[derive(Clone, Debug)]
pub struct OwnershipGraph {
    root: NodeId,
    as_of: DateTime<Utc>,
    max_depth: u8,
    edges: BTreeMap<NodeId, Vec<HoldingEdge>>,
    states: BTreeMap<NodeId, NodeState>,
    depths: BTreeMap<NodeId, u8>,
    errors: Vec<GraphResolutionError>,
}

impl OwnershipGraph {
    pub fn new(root: NodeId, as_of: DateTime<Utc>, max_depth: u8) -> Self {
        let mut depths = BTreeMap::new();
        depths.insert(root.clone(), 0);
        Self {
            root,
            as_of,
            max_depth,
            edges: BTreeMap::new(),
            states: BTreeMap::new(),
            depths,
            errors: Vec::new(),
        }
    }

    pub fn root(&self) -> &NodeId {
        &self.root
    }

    pub fn as_of(&self) -> DateTime<Utc> {
        self.as_of
    }

    pub fn max_depth(&self) -> u8 {
        self.max_depth
    }

    /// Outgoing edges of `node` in canonical order.
    pub fn edges_of(&self, node: &NodeId) -> &[HoldingEdge] {
        self.edges.get(node).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn state(&self, node: &NodeId) -> Option<NodeState> {
        self.states.get(node).copied()
    }

    /// Hop count at which `node` was first discovered.
    pub fn depth_of(&self, node: &NodeId) -> Option<u8> {
        self.depths.get(node).copied()
    }

    pub fn errors(&self) -> &[GraphResolutionError] {
        &self.errors
    }

    pub fn nodes(&self) -> impl Iterator<Item = (&NodeId, NodeState)> {
        self.states.iter().map(|(node, state)| (node, *state))
    }

    pub fn node_count(&self) -> usize {
        self.states.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.values().map(Vec::len).sum()
    }

    pub fn count_in_state(&self, state: NodeState) -> usize {
        self.states.values().filter(|s| **s == state).count()
    }

    pub fn set_edges(&mut self, node: NodeId, mut edges: Vec<HoldingEdge>) {
        edges.sort_by(|a, b| a.canonical_key().cmp(&b.canonical_key()));
        self.edges.insert(node, edges);
    }

    pub fn set_state(&mut self, node: NodeId, state: NodeState) {
        self.states.insert(node, state);
    }

    /// Records the discovery depth; returns false if the node was already known.
    pub fn discover(&mut self, node: NodeId, depth: u8) -> bool {
        if self.depths.contains_key(&node) {
            return false;
        }
        self.depths.insert(node, depth);
        true
    }

    pub fn push_error(&mut self, error: GraphResolutionError) {
        self.errors.push(error);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use zkbo_common::{Fraction, ProtocolKind};

    #[test]
    fn edges_are_kept_in_canonical_order() {
        let as_of = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let mut graph = OwnershipGraph::new("w".into(), as_of, 4);
        let half = Fraction::from_bps(5000);
        graph.set_edges(
            "w".into(),
            vec![
                HoldingEdge::new("w", "b-share", ProtocolKind::Vault, half, "b"),
                HoldingEdge::new("w", "a-lp", ProtocolKind::LpPool, half, "a"),
            ],
        );
        let targets: Vec<_> = graph
            .edges_of(&"w".into())
            .iter()
            .map(|e| e.target.as_str().to_string())
            .collect();
        assert_eq!(targets, vec!["a", "b"]);
        assert_eq!(graph.edge_count(), 2);
        assert!(graph.edges_of(&"missing".into()).is_empty());
    }

    #[test]
    fn discovery_is_first_writer_wins() {
        let as_of = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let mut graph = OwnershipGraph::new("w".into(), as_of, 4);
        assert!(graph.discover("v".into(), 1));
        assert!(!graph.discover("v".into(), 3));
        assert_eq!(graph.depth_of(&"v".into()), Some(1));
        assert!(!graph.discover("w".into(), 2));
    }
}
