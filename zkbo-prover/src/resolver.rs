//! Breadth-first resolution of a wallet's holdings into an ownership graph.

use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use zkbo_common::{
    AdapterError, GraphResolutionError, HoldingEdge, NodeId, PipelineConfig, ProtocolKind,
    RetryPolicy,
};

use crate::adapter::{AdapterRegistry, ProtocolAdapter};
use crate::graph::{NodeState, OwnershipGraph};
use crate::retry::with_retry;

type VisitedSet = Arc<Mutex<HashSet<(NodeId, ProtocolKind)>>>;

pub struct OwnershipGraphResolver {
    registry: Arc<AdapterRegistry>,
    workers: usize,
    adapter_timeout: Duration,
    retry: RetryPolicy,
}

#[derive(Debug, Error)]
enum CallError {
    #[error("{0}")]
    Adapter(AdapterError),
    #[error("timed out")]
    Timeout,
}

impl CallError {
    fn is_transient(&self) -> bool {
        match self {
            CallError::Adapter(err) => err.is_transient(),
            CallError::Timeout => true,
        }
    }
}

enum QueryOutcome {
    /// `(node, protocol)` was already queried by another task.
    Skipped,
    Answered(Result<Vec<HoldingEdge>, GraphResolutionError>),
}

impl OwnershipGraphResolver {
    pub fn new(registry: Arc<AdapterRegistry>, config: &PipelineConfig) -> Self {
        Self {
            registry,
            workers: config.resolver_workers.max(1),
            adapter_timeout: config.adapter_timeout(),
            retry: config.retry.clone(),
        }
    }

    pub fn registry(&self) -> &AdapterRegistry {
        &self.registry
    }

    /// Resolve `wallet` at `as_of`, following at most `max_depth` hops.
    ///
    /// Never fails: edge-scoped problems are recorded on the graph and the
    /// affected share is left unattributed.
    pub async fn resolve(
        &self,
        wallet: &NodeId,
        as_of: DateTime<Utc>,
        max_depth: u8,
    ) -> OwnershipGraph {
        let mut graph = OwnershipGraph::new(wallet.clone(), as_of, max_depth);
        let visited: VisitedSet = Arc::new(Mutex::new(HashSet::new()));
        let semaphore = Arc::new(Semaphore::new(self.workers));

        let mut frontier = vec![wallet.clone()];
        let mut depth: u8 = 0;

        while !frontier.is_empty() {
            let at_ceiling = depth >= max_depth;
            debug!(
                "resolving depth {} ({} node(s){})",
                depth,
                frontier.len(),
                if at_ceiling { ", ceiling" } else { "" }
            );

            let mut answers = self
                .query_level(&frontier, as_of, &visited, &semaphore)
                .await;
            let mut next = Vec::new();

            for node in frontier {
                let (accepted, errors) = self.screen(&node, answers.remove(&node));
                let had_errors = !errors.is_empty();
                for error in errors {
                    warn!("excluding edge from {}: {}", node, error);
                    graph.push_error(error);
                }

                let state = if accepted.is_empty() {
                    if had_errors {
                        NodeState::Unresolved
                    } else {
                        NodeState::Terminal
                    }
                } else if at_ceiling {
                    NodeState::Truncated
                } else {
                    NodeState::Expanded
                };

                if state == NodeState::Expanded {
                    for edge in &accepted {
                        if graph.discover(edge.target.clone(), depth + 1) {
                            next.push(edge.target.clone());
                        }
                    }
                    graph.set_edges(node.clone(), accepted);
                }
                graph.set_state(node, state);
            }

            frontier = next;
            depth = depth.saturating_add(1);
        }

        info!(
            "resolved {}: {} node(s), {} edge(s), {} truncated, {} unresolved, {} edge error(s)",
            wallet,
            graph.node_count(),
            graph.edge_count(),
            graph.count_in_state(NodeState::Truncated),
            graph.count_in_state(NodeState::Unresolved),
            graph.errors().len()
        );
        graph
    }

    /// Query every registered adapter for every frontier node on the bounded
    /// worker pool.
    async fn query_level(
        &self,
        frontier: &[NodeId],
        as_of: DateTime<Utc>,
        visited: &VisitedSet,
        semaphore: &Arc<Semaphore>,
    ) -> BTreeMap<NodeId, BTreeMap<ProtocolKind, QueryOutcome>> {
        let mut tasks = JoinSet::new();
        for node in frontier {
            for protocol in self.registry.protocols() {
                let Some(adapter) = self.registry.get(protocol) else {
                    continue;
                };
                let node = node.clone();
                let protocol = protocol.clone();
                let visited = Arc::clone(visited);
                let semaphore = Arc::clone(semaphore);
                let timeout = self.adapter_timeout;
                let retry = self.retry.clone();

                tasks.spawn(async move {
                    if !mark_visited(&visited, &node, &protocol) {
                        return (node, protocol, QueryOutcome::Skipped);
                    }
                    let result = match semaphore.acquire_owned().await {
                        Ok(_permit) => {
                            query_adapter(&*adapter, &node, &protocol, as_of, timeout, &retry)
                                .await
                        }
                        Err(_) => Err(GraphResolutionError::AdapterFailed {
                            node: node.clone(),
                            protocol: protocol.clone(),
                            source: AdapterError::Permanent("worker pool closed".into()),
                        }),
                    };
                    (node, protocol, QueryOutcome::Answered(result))
                });
            }
        }

        let mut answers: BTreeMap<NodeId, BTreeMap<ProtocolKind, QueryOutcome>> = BTreeMap::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((node, protocol, outcome)) => {
                    answers.entry(node).or_default().insert(protocol, outcome);
                }
                Err(err) => warn!("adapter task aborted: {}", err),
            }
        }

        // A task that panicked left no answer; count it as a failed query.
        for node in frontier {
            let per_node = answers.entry(node.clone()).or_default();
            for protocol in self.registry.protocols() {
                per_node.entry(protocol.clone()).or_insert_with(|| {
                    QueryOutcome::Answered(Err(GraphResolutionError::AdapterFailed {
                        node: node.clone(),
                        protocol: protocol.clone(),
                        source: AdapterError::Permanent("adapter task aborted".into()),
                    }))
                });
            }
        }
        answers
    }

    /// Split adapter answers for `node` into usable edges and edge errors.
    fn screen(
        &self,
        node: &NodeId,
        answers: Option<BTreeMap<ProtocolKind, QueryOutcome>>,
    ) -> (Vec<HoldingEdge>, Vec<GraphResolutionError>) {
        let mut accepted = Vec::new();
        let mut errors = Vec::new();

        for (_, outcome) in answers.unwrap_or_default() {
            let edges = match outcome {
                QueryOutcome::Skipped => continue,
                QueryOutcome::Answered(Ok(edges)) => edges,
                QueryOutcome::Answered(Err(err)) => {
                    errors.push(err);
                    continue;
                }
            };
            for edge in edges {
                match self.check_edge(node, &edge) {
                    Ok(()) => accepted.push(edge),
                    Err(err) => errors.push(err),
                }
            }
        }
        (accepted, errors)
    }

    fn check_edge(&self, node: &NodeId, edge: &HoldingEdge) -> Result<(), GraphResolutionError> {
        if &edge.holder != node {
            return Err(GraphResolutionError::MalformedEdge {
                node: node.clone(),
                reason: format!("edge holder {} does not match queried node", edge.holder),
            });
        }
        if edge.target.is_empty() || edge.held_asset.is_empty() {
            return Err(GraphResolutionError::MalformedEdge {
                node: node.clone(),
                reason: "empty target or held asset".into(),
            });
        }
        if !self.registry.contains(&edge.protocol) {
            return Err(GraphResolutionError::UnknownProtocol {
                holder: edge.holder.clone(),
                target: edge.target.clone(),
                protocol: edge.protocol.clone(),
            });
        }
        Ok(())
    }
}

fn mark_visited(visited: &VisitedSet, node: &NodeId, protocol: &ProtocolKind) -> bool {
    let mut guard = visited.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    guard.insert((node.clone(), protocol.clone()))
}

async fn query_adapter(
    adapter: &dyn ProtocolAdapter,
    node: &NodeId,
    protocol: &ProtocolKind,
    as_of: DateTime<Utc>,
    timeout: Duration,
    retry: &RetryPolicy,
) -> Result<Vec<HoldingEdge>, GraphResolutionError> {
    let label = format!("{} adapter for {}", protocol, node);
    let (result, _) = with_retry(retry, &label, CallError::is_transient, || async {
        match tokio::time::timeout(timeout, adapter.list_holdings(node, protocol, as_of)).await {
            Ok(Ok(edges)) => Ok(edges),
            Ok(Err(err)) => Err(CallError::Adapter(err)),
            Err(_) => Err(CallError::Timeout),
        }
    })
    .await;

    result.map_err(|err| match err {
        CallError::Adapter(source) => GraphResolutionError::AdapterFailed {
            node: node.clone(),
            protocol: protocol.clone(),
            source,
        },
        CallError::Timeout => GraphResolutionError::AdapterTimeout {
            node: node.clone(),
            protocol: protocol.clone(),
            timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
        },
    })
}
