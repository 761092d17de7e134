//! Core data model shared by the prover, verifier and service.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::RequestError;
use crate::fraction::Fraction;
use crate::{DEFAULT_MAX_DEPTH, MAX_NESTING_DEPTH};

/// Opaque identifier of a graph node: a wallet, a wrapper token or a
/// terminal asset.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for NodeId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// The wrapping mechanism that mediates a holding edge.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProtocolKind {
    Vault,
    LpPool,
    StakingDerivative,
    Collateral,
    Custody,
    Other(String),
}

impl ProtocolKind {
    /// Stable tag used in commitments and transcripts.
    pub fn tag(&self) -> &str {
        match self {
            ProtocolKind::Vault => "vault",
            ProtocolKind::LpPool => "lp_pool",
            ProtocolKind::StakingDerivative => "staking_derivative",
            ProtocolKind::Collateral => "collateral",
            ProtocolKind::Custody => "custody",
            ProtocolKind::Other(name) => name.as_str(),
        }
    }
}

impl fmt::Display for ProtocolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// One hop of custody: `holder` owns `held_asset`, which entitles it to
/// `share` of its value flowing into `target` through `protocol`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HoldingEdge {
    pub holder: NodeId,
    pub held_asset: NodeId,
    pub protocol: ProtocolKind,
    /// Raw fixed-point units; see [`Fraction`].
    pub share: Fraction,
    pub target: NodeId,
    /// Amount of `target` units the holder's position represents.
    #[serde(default)]
    pub underlying_amount: u128,
}

impl HoldingEdge {
    pub fn new(
        holder: impl Into<NodeId>,
        held_asset: impl Into<NodeId>,
        protocol: ProtocolKind,
        share: Fraction,
        target: impl Into<NodeId>,
    ) -> Self {
        Self {
            holder: holder.into(),
            held_asset: held_asset.into(),
            protocol,
            share,
            target: target.into(),
            underlying_amount: 0,
        }
    }

    pub fn with_amount(mut self, amount: u128) -> Self {
        self.underlying_amount = amount;
        self
    }

    /// Canonical ordering key for traversal: target, protocol, held asset.
    pub fn canonical_key(&self) -> (&NodeId, &ProtocolKind, &NodeId) {
        (&self.target, &self.protocol, &self.held_asset)
    }
}

/// The sole input to the proving pipeline.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofRequest {
    pub wallet: NodeId,
    pub as_of: DateTime<Utc>,
    #[serde(default = "default_max_depth")]
    pub max_depth: u8,
}

fn default_max_depth() -> u8 {
    DEFAULT_MAX_DEPTH
}

impl ProofRequest {
    pub fn new(wallet: impl Into<NodeId>, as_of: DateTime<Utc>) -> Self {
        Self {
            wallet: wallet.into(),
            as_of,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }

    pub fn with_max_depth(mut self, max_depth: u8) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Rejects out-of-range depths instead of clamping them.
    pub fn validate(&self) -> Result<(), RequestError> {
        if self.wallet.is_empty() {
            return Err(RequestError::EmptyWallet);
        }
        if self.max_depth == 0 || self.max_depth > MAX_NESTING_DEPTH {
            return Err(RequestError::DepthOutOfRange {
                requested: u32::from(self.max_depth),
                max: MAX_NESTING_DEPTH,
            });
        }
        Ok(())
    }
}

/// Aggregated claim of the root wallet on one terminal asset.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TerminalExposure {
    pub asset: NodeId,
    /// Amount of the asset attributable to the root, in raw asset units.
    #[serde(with = "crate::serde_u128")]
    pub amount: u128,
    pub fraction: Fraction,
}

impl TerminalExposure {
    pub fn percentage_of_root(&self) -> f64 {
        self.fraction.percentage()
    }
}
