use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use zkbo_common::{AdapterError, HoldingEdge, NodeId, ProtocolKind};
use zkbo_prover::ProtocolAdapter;

/// Holdings served from memory, keyed by holder and the protocol whose
/// adapter reports them.
#[derive(Debug, Default)]
pub struct MemoryAdapter {
    edges: BTreeMap<(NodeId, ProtocolKind), Vec<HoldingEdge>>,
    failures: HashMap<NodeId, AdapterError>,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl MemoryAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Edge reported by the adapter of its own protocol.
    pub fn add_edge(&mut self, edge: HoldingEdge) -> &mut Self {
        let reporter = edge.protocol.clone();
        self.add_reported(reporter, edge)
    }

    /// Edge reported while `reporter` is being queried, whatever the edge
    /// itself claims as its protocol.
    pub fn add_reported(&mut self, reporter: ProtocolKind, edge: HoldingEdge) -> &mut Self {
        self.edges
            .entry((edge.holder.clone(), reporter))
            .or_default()
            .push(edge);
        self
    }

    /// Every query about `node` fails with `error`.
    pub fn fail_node(&mut self, node: impl Into<NodeId>, error: AdapterError) -> &mut Self {
        self.failures.insert(node.into(), error);
        self
    }

    /// Sleep before answering; pairs with paused tokio time.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// `(reporter, edge)` pairs in a stable order.
    pub fn entries(&self) -> impl Iterator<Item = (&ProtocolKind, &HoldingEdge)> {
        self.edges
            .iter()
            .flat_map(|((_, reporter), edges)| edges.iter().map(move |edge| (reporter, edge)))
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProtocolAdapter for MemoryAdapter {
    async fn list_holdings(
        &self,
        node: &NodeId,
        protocol: &ProtocolKind,
        _as_of: DateTime<Utc>,
    ) -> Result<Vec<HoldingEdge>, AdapterError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(error) = self.failures.get(node) {
            return Err(error.clone());
        }
        Ok(self
            .edges
            .get(&(node.clone(), protocol.clone()))
            .cloned()
            .unwrap_or_default())
    }
}
