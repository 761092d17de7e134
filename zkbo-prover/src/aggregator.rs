//! Depth-first reduction of an ownership graph into terminal-asset exposure.

use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;

use zkbo_common::{Fraction, HoldingEdge, NodeId, ProtocolKind, TerminalExposure, WitnessError};

use crate::graph::{NodeState, OwnershipGraph};

/// Upper bound on root-to-leaf edge traversals in one request.
pub const MAX_TRAVERSAL_STEPS: usize = 1 << 16;

/// One edge traversal on one path from the root.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TraversalStep {
    /// Hop number of this edge, starting at 1 for the root's own holdings.
    pub depth: u8,
    pub edge: HoldingEdge,
    /// Fraction of the root carried into `edge.holder` along this path.
    pub parent_exposure: Fraction,
    /// `floor(parent_exposure × edge.share)`.
    pub child_exposure: Fraction,
    /// Whether `edge.target` is a named terminal asset on this path.
    pub terminal: bool,
}

impl TraversalStep {
    /// Depth-0 step binding the root to itself. Stands in for an empty walk so
    /// every proof folds at least one leaf.
    pub fn anchor(root: &NodeId) -> Self {
        Self {
            depth: 0,
            edge: HoldingEdge::new(
                root.clone(),
                root.clone(),
                ProtocolKind::Custody,
                Fraction::ONE,
                root.clone(),
            ),
            parent_exposure: Fraction::ONE,
            child_exposure: Fraction::ONE,
            terminal: false,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Aggregation {
    /// Sorted by descending fraction, ties by asset id.
    pub exposures: Vec<TerminalExposure>,
    /// Share of the root not attributed to any named asset.
    pub residual: Fraction,
    pub truncated_paths: usize,
    pub cyclic_paths: usize,
    pub unresolved_paths: usize,
    pub nesting_depth: u8,
    pub protocols_traversed: Vec<ProtocolKind>,
    /// Pre-order traversal steps, one per edge per path, or a single
    /// [`TraversalStep::anchor`] when the root has no usable holdings.
    pub steps: Vec<TraversalStep>,
}

impl Aggregation {
    pub fn total_fraction(&self) -> Fraction {
        self.exposures
            .iter()
            .fold(Fraction::ZERO, |acc, e| acc.saturating_add(e.fraction))
    }

    pub fn is_complete(&self) -> bool {
        self.truncated_paths == 0 && self.cyclic_paths == 0 && self.unresolved_paths == 0
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct ExposureAggregator;

#[derive(Default)]
struct Walk {
    totals: BTreeMap<NodeId, (Fraction, u128)>,
    steps: Vec<TraversalStep>,
    truncated: usize,
    cyclic: usize,
    unresolved: usize,
    deepest: Option<(u8, Vec<ProtocolKind>)>,
}

impl ExposureAggregator {
    pub fn new() -> Self {
        Self
    }

    pub fn aggregate(&self, graph: &OwnershipGraph) -> Result<Aggregation, WitnessError> {
        validate_shares(graph)?;

        let mut walk = Walk::default();
        let mut active = BTreeSet::new();
        let mut path = Vec::new();
        let root = graph.root().clone();
        active.insert(root.clone());
        self.visit(graph, &root, Fraction::ONE, &mut active, &mut path, &mut walk)?;

        let mut exposures: Vec<TerminalExposure> = walk
            .totals
            .into_iter()
            .map(|(asset, (fraction, amount))| TerminalExposure {
                asset,
                amount,
                fraction,
            })
            .collect();
        exposures.sort_by(|a, b| b.fraction.cmp(&a.fraction).then_with(|| a.asset.cmp(&b.asset)));

        let named = exposures
            .iter()
            .fold(Fraction::ZERO, |acc, e| acc.saturating_add(e.fraction));
        let (nesting_depth, protocols_traversed) = walk.deepest.unwrap_or_default();
        if walk.steps.is_empty() {
            walk.steps.push(TraversalStep::anchor(&root));
        }

        debug!(
            "aggregated {} asset(s) over {} step(s), depth {}, residual {}",
            exposures.len(),
            walk.steps.len(),
            nesting_depth,
            Fraction::ONE.saturating_sub(named)
        );

        Ok(Aggregation {
            exposures,
            residual: Fraction::ONE.saturating_sub(named),
            truncated_paths: walk.truncated,
            cyclic_paths: walk.cyclic,
            unresolved_paths: walk.unresolved,
            nesting_depth,
            protocols_traversed,
            steps: walk.steps,
        })
    }

    fn visit(
        &self,
        graph: &OwnershipGraph,
        holder: &NodeId,
        exposure: Fraction,
        active: &mut BTreeSet<NodeId>,
        path: &mut Vec<ProtocolKind>,
        walk: &mut Walk,
    ) -> Result<(), WitnessError> {
        for edge in graph.edges_of(holder) {
            if walk.steps.len() >= MAX_TRAVERSAL_STEPS {
                return Err(WitnessError::TraversalTooLarge {
                    limit: MAX_TRAVERSAL_STEPS,
                });
            }
            let child = exposure.mul(edge.share);
            let depth = u8::try_from(path.len() + 1).unwrap_or(u8::MAX);
            let cyclic = active.contains(&edge.target);
            let state = graph.state(&edge.target);
            walk.steps.push(TraversalStep {
                depth,
                edge: edge.clone(),
                parent_exposure: exposure,
                child_exposure: child,
                terminal: !cyclic && state == Some(NodeState::Terminal),
            });
            path.push(edge.protocol.clone());

            if cyclic {
                walk.cyclic += 1;
            } else {
                match state {
                    Some(NodeState::Terminal) => {
                        let amount = exposure.scale_amount(edge.underlying_amount);
                        let entry = walk
                            .totals
                            .entry(edge.target.clone())
                            .or_insert((Fraction::ZERO, 0));
                        entry.0 = entry.0.saturating_add(child);
                        entry.1 = entry.1.saturating_add(amount);

                        let deeper = walk.deepest.as_ref().map_or(true, |(d, _)| depth > *d);
                        if deeper {
                            walk.deepest = Some((depth, path.clone()));
                        }
                    }
                    // A node first reached through a shorter path can sit at the
                    // ceiling here; its holdings would be one hop too far.
                    Some(NodeState::Expanded) if depth >= graph.max_depth() => {
                        if !graph.edges_of(&edge.target).is_empty() {
                            walk.truncated += 1;
                        }
                    }
                    Some(NodeState::Expanded) => {
                        active.insert(edge.target.clone());
                        self.visit(graph, &edge.target, child, active, path, walk)?;
                        active.remove(&edge.target);
                    }
                    Some(NodeState::Truncated) => walk.truncated += 1,
                    Some(NodeState::Unresolved) | None => walk.unresolved += 1,
                }
            }
            path.pop();
        }
        Ok(())
    }
}

/// Share bounds per edge and per holder, checked before any arithmetic.
fn validate_shares(graph: &OwnershipGraph) -> Result<(), WitnessError> {
    for (node, _) in graph.nodes() {
        let mut total = Fraction::ZERO;
        for edge in graph.edges_of(node) {
            if !edge.share.is_unit_share() {
                return Err(WitnessError::ShareOutOfRange {
                    holder: edge.holder.clone(),
                    target: edge.target.clone(),
                    share: edge.share,
                });
            }
            total = total.saturating_add(edge.share);
        }
        if total > Fraction::ONE {
            return Err(WitnessError::OverAllocated {
                node: node.clone(),
                total,
            });
        }
    }
    Ok(())
}
