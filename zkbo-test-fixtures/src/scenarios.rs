//! Ownership graphs with known answers.

use std::sync::Arc;

use zkbo_common::{
    AdapterError, Clock, Fraction, HoldingEdge, NodeId, PipelineConfig, ProofRequest,
    ProtocolKind,
};
use zkbo_prover::{
    standard_protocols, AdapterRegistry, LocalProvingBackend, ProofPipeline, ProvingBackend,
};

use crate::adapter::MemoryAdapter;
use crate::{as_of, clock, KEY_SEED};

pub const WALLET: &str = "0x5eed000000000000000000000000000000000001";

/// A root wallet, the adapter that knows its holdings and the depth to
/// resolve it at.
pub struct Scenario {
    pub name: &'static str,
    pub root: NodeId,
    pub max_depth: u8,
    pub adapter: Arc<MemoryAdapter>,
}

impl Scenario {
    pub fn new(name: &'static str, max_depth: u8, adapter: MemoryAdapter) -> Self {
        Self {
            name,
            root: WALLET.into(),
            max_depth,
            adapter: Arc::new(adapter),
        }
    }

    /// The scenario adapter registered for every standard protocol.
    pub fn registry(&self) -> AdapterRegistry {
        AdapterRegistry::new().with_all(standard_protocols(), self.adapter.clone())
    }

    pub fn request(&self) -> ProofRequest {
        ProofRequest::new(self.root.clone(), as_of()).with_max_depth(self.max_depth)
    }

    /// Pipeline over the local backend with the shared key seed and a fixed
    /// clock.
    pub fn pipeline(&self) -> ProofPipeline {
        self.pipeline_with(
            PipelineConfig::default(),
            Arc::new(LocalProvingBackend::new(&KEY_SEED)),
            Arc::new(clock()),
        )
    }

    pub fn pipeline_with(
        &self,
        config: PipelineConfig,
        backend: Arc<dyn ProvingBackend>,
        clock: Arc<dyn Clock>,
    ) -> ProofPipeline {
        ProofPipeline::new(config, Arc::new(self.registry()), backend, clock)
    }
}

fn edge(
    holder: &str,
    protocol: ProtocolKind,
    bps: u64,
    target: &str,
    amount: u128,
) -> HoldingEdge {
    HoldingEdge::new(
        holder,
        format!("{}-{}", target.to_lowercase(), protocol.tag()),
        protocol,
        Fraction::from_bps(bps),
        target,
    )
    .with_amount(amount)
}

/// W holds 60% of vault V1 (all USDC) and 40% of vault V2 (half ETH, half
/// USDC). At depth 2: USDC 80%, ETH 20%, five traversal steps.
pub fn two_vault() -> Scenario {
    let mut adapter = MemoryAdapter::new();
    adapter
        .add_edge(edge(WALLET, ProtocolKind::Vault, 6_000, "V1", 600))
        .add_edge(edge(WALLET, ProtocolKind::Vault, 4_000, "V2", 400))
        .add_edge(edge("V1", ProtocolKind::Vault, 10_000, "USDC", 1_000_000))
        .add_edge(edge("V2", ProtocolKind::Vault, 5_000, "ETH", 500))
        .add_edge(edge("V2", ProtocolKind::Vault, 5_000, "USDC", 500_000));
    Scenario::new("two-vault", 2, adapter)
}

/// A single path of `depth` hops ending in one asset. Hops rotate through
/// the standard protocols.
pub fn chain(depth: u8) -> Scenario {
    let protocols = standard_protocols();
    let mut adapter = MemoryAdapter::new();
    let mut holder = WALLET.to_string();
    for hop in 1..=depth {
        let target = if hop == depth {
            "ASSET".to_string()
        } else {
            format!("HOP{}", hop)
        };
        let protocol = protocols[usize::from(hop - 1) % protocols.len()].clone();
        adapter.add_edge(edge(&holder, protocol, 10_000, &target, 1_000));
        holder = target;
    }
    Scenario::new("chain", depth.max(1), adapter)
}

/// W owns A outright; A holds half USDC and half B, and B holds A again.
/// Only the USDC half can be attributed.
pub fn cycle() -> Scenario {
    let mut adapter = MemoryAdapter::new();
    adapter
        .add_edge(edge(WALLET, ProtocolKind::Vault, 10_000, "A", 100))
        .add_edge(edge("A", ProtocolKind::Vault, 5_000, "USDC", 1_000))
        .add_edge(edge("A", ProtocolKind::LpPool, 5_000, "B", 100))
        .add_edge(edge("B", ProtocolKind::Custody, 10_000, "A", 100));
    Scenario::new("cycle", 8, adapter)
}

/// Two paths that meet at C before reaching DAI.
pub fn diamond() -> Scenario {
    let mut adapter = MemoryAdapter::new();
    adapter
        .add_edge(edge(WALLET, ProtocolKind::Vault, 5_000, "A", 50))
        .add_edge(edge(WALLET, ProtocolKind::LpPool, 5_000, "B", 50))
        .add_edge(edge("A", ProtocolKind::Collateral, 10_000, "C", 100))
        .add_edge(edge("B", ProtocolKind::Collateral, 10_000, "C", 100))
        .add_edge(edge("C", ProtocolKind::StakingDerivative, 10_000, "DAI", 2_000));
    Scenario::new("diamond", 4, adapter)
}

/// The vault adapter reports half of V's value flowing through a protocol
/// nobody registered; that half stays residual.
pub fn unknown_protocol() -> Scenario {
    let mut adapter = MemoryAdapter::new();
    adapter
        .add_edge(edge(WALLET, ProtocolKind::Vault, 10_000, "V", 100))
        .add_edge(edge("V", ProtocolKind::Vault, 5_000, "USDC", 1_000))
        .add_reported(
            ProtocolKind::Vault,
            edge("V", ProtocolKind::Other("restaking".into()), 5_000, "R", 100),
        );
    Scenario::new("unknown-protocol", 4, adapter)
}

/// W holds half of H1, which heads a 31-hop chain to H32, and half of H32
/// directly. H32 is expanded from the short path; through the long path it
/// sits at the depth ceiling, so only the direct half reaches USDC.
pub fn shortcut() -> Scenario {
    let mut adapter = MemoryAdapter::new();
    adapter.add_edge(edge(WALLET, ProtocolKind::Vault, 5_000, "H1", 100));
    for hop in 1..32 {
        adapter.add_edge(edge(
            &format!("H{}", hop),
            ProtocolKind::Vault,
            10_000,
            &format!("H{}", hop + 1),
            100,
        ));
    }
    adapter
        .add_edge(edge(WALLET, ProtocolKind::Vault, 5_000, "H32", 100))
        .add_edge(edge("H32", ProtocolKind::Vault, 10_000, "USDC", 1_000));
    Scenario::new("shortcut", 32, adapter)
}

/// A wallet no adapter knows anything about.
pub fn empty() -> Scenario {
    Scenario::new("empty", 4, MemoryAdapter::new())
}

/// Every adapter fails for the root itself.
pub fn unreachable_root() -> Scenario {
    let mut adapter = MemoryAdapter::new();
    adapter
        .add_edge(edge(WALLET, ProtocolKind::Vault, 10_000, "V", 100))
        .fail_node(WALLET, AdapterError::Permanent("indexer offline".into()));
    Scenario::new("unreachable-root", 4, adapter)
}
