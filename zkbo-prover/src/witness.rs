//! Per-step witnesses: hiding commitments as public input, opened values as
//! the private witness.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::task::JoinSet;
use tracing::debug;

use zkbo_common::commitment::{
    commit, derive_blinding, Commitment, Transcript, DOMAIN_ASSET, DOMAIN_EXPOSURE, DOMAIN_LEAF,
    DOMAIN_SHARE, DOMAIN_WALLET,
};
use zkbo_common::{Fraction, Network, NodeId, ProtocolKind, WitnessError};

use crate::aggregator::TraversalStep;

/// What a leaf proof reveals about one traversal step. The holder never
/// appears here.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeafPublicInput {
    pub depth: u8,
    pub protocol: ProtocolKind,
    /// The step ends at a named asset and counts toward the statement.
    #[serde(default)]
    pub terminal: bool,
    pub share: Commitment,
    pub target: Commitment,
    pub parent_exposure: Commitment,
    pub child_exposure: Commitment,
}

impl LeafPublicInput {
    pub fn digest(&self) -> [u8; 32] {
        let mut transcript = Transcript::new(DOMAIN_LEAF);
        transcript
            .append_bytes(&[self.depth, u8::from(self.terminal)])
            .append_str(self.protocol.tag())
            .append_bytes(self.share.as_bytes())
            .append_bytes(self.target.as_bytes())
            .append_bytes(self.parent_exposure.as_bytes())
            .append_bytes(self.child_exposure.as_bytes());
        transcript.finalize()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepBlinding {
    #[serde(with = "zkbo_common::serde_hex32")]
    pub share: [u8; 32],
    #[serde(with = "zkbo_common::serde_hex32")]
    pub target: [u8; 32],
    #[serde(with = "zkbo_common::serde_hex32")]
    pub parent_exposure: [u8; 32],
    #[serde(with = "zkbo_common::serde_hex32")]
    pub child_exposure: [u8; 32],
}

/// Openings of the commitments in [`LeafPublicInput`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrivateWitness {
    pub share: Fraction,
    pub target: NodeId,
    pub parent_exposure: Fraction,
    pub child_exposure: Fraction,
    pub blinding: StepBlinding,
}

impl PrivateWitness {
    /// The leaf relation: commitments open and `child = floor(parent × share)`.
    pub fn satisfies(&self, public: &LeafPublicInput) -> bool {
        self.share.is_unit_share()
            && self.parent_exposure.mul(self.share) == self.child_exposure
            && commit_fraction(DOMAIN_SHARE, self.share, &self.blinding.share) == public.share
            && commit(DOMAIN_ASSET, self.target.as_str().as_bytes(), &self.blinding.target)
                == public.target
            && commit_fraction(
                DOMAIN_EXPOSURE,
                self.parent_exposure,
                &self.blinding.parent_exposure,
            ) == public.parent_exposure
            && commit_fraction(
                DOMAIN_EXPOSURE,
                self.child_exposure,
                &self.blinding.child_exposure,
            ) == public.child_exposure
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeafWitness {
    pub public: LeafPublicInput,
    pub private: PrivateWitness,
}

/// Builds witnesses with blinding derived from the request, so independent
/// provers given the same request reproduce the same witnesses.
#[derive(Clone)]
pub struct WitnessBuilder {
    seed: [u8; 32],
}

impl WitnessBuilder {
    pub fn new(wallet: &NodeId, as_of: DateTime<Utc>, network: Network, salt: &str) -> Self {
        let mut transcript = Transcript::new(DOMAIN_WALLET);
        transcript
            .append_str(wallet.as_str())
            .append_i64(as_of.timestamp())
            .append_bytes(&[network.id()])
            .append_str(salt);
        Self {
            seed: transcript.finalize(),
        }
    }

    pub fn build_step(&self, index: usize, step: &TraversalStep) -> Result<LeafWitness, WitnessError> {
        let edge = &step.edge;
        if !edge.share.is_unit_share() {
            return Err(WitnessError::ShareOutOfRange {
                holder: edge.holder.clone(),
                target: edge.target.clone(),
                share: edge.share,
            });
        }
        if step.parent_exposure.mul(edge.share) != step.child_exposure {
            return Err(WitnessError::ArithmeticMismatch {
                target: edge.target.clone(),
                depth: step.depth,
            });
        }

        let step_id = self.step_id(index, step);
        let blinding = StepBlinding {
            share: derive_blinding(&self.seed, "share", &step_id),
            target: derive_blinding(&self.seed, "target", &step_id),
            parent_exposure: derive_blinding(&self.seed, "parent", &step_id),
            child_exposure: derive_blinding(&self.seed, "child", &step_id),
        };

        let public = LeafPublicInput {
            depth: step.depth,
            protocol: edge.protocol.clone(),
            terminal: step.terminal,
            share: commit_fraction(DOMAIN_SHARE, edge.share, &blinding.share),
            target: commit(DOMAIN_ASSET, edge.target.as_str().as_bytes(), &blinding.target),
            parent_exposure: commit_fraction(
                DOMAIN_EXPOSURE,
                step.parent_exposure,
                &blinding.parent_exposure,
            ),
            child_exposure: commit_fraction(
                DOMAIN_EXPOSURE,
                step.child_exposure,
                &blinding.child_exposure,
            ),
        };

        Ok(LeafWitness {
            public,
            private: PrivateWitness {
                share: edge.share,
                target: edge.target.clone(),
                parent_exposure: step.parent_exposure,
                child_exposure: step.child_exposure,
                blinding,
            },
        })
    }

    /// Build every step concurrently. Output order matches `steps`.
    pub async fn build_all(&self, steps: &[TraversalStep]) -> Result<Vec<LeafWitness>, WitnessError> {
        let steps: Arc<[TraversalStep]> = steps.into();
        let mut tasks = JoinSet::new();
        for index in 0..steps.len() {
            let builder = self.clone();
            let steps = Arc::clone(&steps);
            tasks.spawn(async move { (index, builder.build_step(index, &steps[index])) });
        }

        let mut built: Vec<Option<LeafWitness>> = vec![None; steps.len()];
        while let Some(joined) = tasks.join_next().await {
            let (index, result) = joined.map_err(|_| WitnessError::Cancelled)?;
            // Dropping the JoinSet on early return aborts the remaining tasks.
            built[index] = Some(result?);
        }
        debug!("built {} witness(es)", built.len());
        built
            .into_iter()
            .map(|w| w.ok_or(WitnessError::Cancelled))
            .collect()
    }

    fn step_id(&self, index: usize, step: &TraversalStep) -> [u8; 32] {
        let mut transcript = Transcript::new(DOMAIN_LEAF);
        transcript
            .append_u64(index as u64)
            .append_bytes(&[step.depth])
            .append_str(step.edge.holder.as_str())
            .append_str(step.edge.held_asset.as_str())
            .append_str(step.edge.protocol.tag())
            .append_str(step.edge.target.as_str());
        transcript.finalize()
    }
}

fn commit_fraction(domain: &str, value: Fraction, blinding: &[u8; 32]) -> Commitment {
    commit(domain, &value.to_be_bytes(), blinding)
}
