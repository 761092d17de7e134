//! Protocol adapters translate on-chain protocol state into holding edges.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use zkbo_common::{AdapterError, HoldingEdge, NodeId, ProtocolKind};

/// Reports what `node` holds through one protocol at a point in time.
#[async_trait]
pub trait ProtocolAdapter: Send + Sync {
    async fn list_holdings(
        &self,
        node: &NodeId,
        protocol: &ProtocolKind,
        as_of: DateTime<Utc>,
    ) -> Result<Vec<HoldingEdge>, AdapterError>;
}

/// Protocol kinds the resolver understands, each with its adapter.
///
/// Edges that name a protocol without a registered adapter cannot be
/// interpreted and are excluded from the graph.
#[derive(Clone, Default)]
pub struct AdapterRegistry {
    adapters: BTreeMap<ProtocolKind, Arc<dyn ProtocolAdapter>>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, protocol: ProtocolKind, adapter: Arc<dyn ProtocolAdapter>) {
        self.adapters.insert(protocol, adapter);
    }

    pub fn with(mut self, protocol: ProtocolKind, adapter: Arc<dyn ProtocolAdapter>) -> Self {
        self.register(protocol, adapter);
        self
    }

    /// Register one adapter for several protocol kinds.
    pub fn with_all(
        mut self,
        protocols: impl IntoIterator<Item = ProtocolKind>,
        adapter: Arc<dyn ProtocolAdapter>,
    ) -> Self {
        for protocol in protocols {
            self.register(protocol, Arc::clone(&adapter));
        }
        self
    }

    pub fn get(&self, protocol: &ProtocolKind) -> Option<Arc<dyn ProtocolAdapter>> {
        self.adapters.get(protocol).cloned()
    }

    pub fn contains(&self, protocol: &ProtocolKind) -> bool {
        self.adapters.contains_key(protocol)
    }

    /// Registered kinds in canonical order.
    pub fn protocols(&self) -> impl Iterator<Item = &ProtocolKind> {
        self.adapters.keys()
    }

    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }
}

impl std::fmt::Debug for AdapterRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdapterRegistry")
            .field("protocols", &self.adapters.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// The built-in protocol kinds.
pub fn standard_protocols() -> [ProtocolKind; 5] {
    [
        ProtocolKind::Vault,
        ProtocolKind::LpPool,
        ProtocolKind::StakingDerivative,
        ProtocolKind::Collateral,
        ProtocolKind::Custody,
    ]
}
