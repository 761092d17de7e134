//! Proving backends: the capability the composer folds proofs through.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use zkbo_common::accumulator::{
    exposure_sum, exposure_weight, node_key, wrap_challenge, wrap_opening, Accumulator,
};
use zkbo_common::envelope::SEAL_LEN;
use zkbo_common::{
    BackendConfig, BackendError, ProofEnvelope, PublicStatement, SealingKey, VerifyingKey,
};

use crate::witness::{LeafPublicInput, PrivateWitness};

/// A leaf proof or the fold of two proofs. Both carry the same shape.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeProof {
    pub accumulator: Accumulator,
    /// Authenticates the accumulator as produced by this backend.
    #[serde(with = "zkbo_common::serde_hex32")]
    pub tag: [u8; 32],
}

#[async_trait]
pub trait ProvingBackend: Send + Sync {
    fn name(&self) -> &'static str;

    async fn prove_leaf(
        &self,
        public: &LeafPublicInput,
        witness: &PrivateWitness,
    ) -> Result<NodeProof, BackendError>;

    /// Checks both children before combining them.
    async fn fold_proofs(&self, left: &NodeProof, right: &NodeProof)
        -> Result<NodeProof, BackendError>;

    /// Final compression into the fixed-size envelope.
    async fn wrap(&self, root: &NodeProof, statement: &PublicStatement)
        -> Result<Vec<u8>, BackendError>;

    async fn verifying_key(&self) -> Result<VerifyingKey, BackendError>;
}

/// In-process backend over the keyed BLAKE3 accumulation scheme.
pub struct LocalProvingBackend {
    node_key: [u8; 32],
    sealing_key: SealingKey,
}

impl LocalProvingBackend {
    pub fn new(key_seed: &[u8; 32]) -> Self {
        Self {
            node_key: node_key(key_seed),
            sealing_key: SealingKey::from_seed(key_seed),
        }
    }

    pub fn key(&self) -> VerifyingKey {
        self.sealing_key.verifying_key()
    }

    fn tag(&self, accumulator: &Accumulator) -> [u8; 32] {
        *blake3::keyed_hash(&self.node_key, &accumulator.to_bytes()).as_bytes()
    }

    fn authentic(&self, proof: &NodeProof) -> bool {
        blake3::Hash::from(self.tag(&proof.accumulator)) == blake3::Hash::from(proof.tag)
    }

    fn seal_node(&self, accumulator: Accumulator) -> NodeProof {
        let tag = self.tag(&accumulator);
        NodeProof { accumulator, tag }
    }
}

#[async_trait]
impl ProvingBackend for LocalProvingBackend {
    fn name(&self) -> &'static str {
        "local"
    }

    async fn prove_leaf(
        &self,
        public: &LeafPublicInput,
        witness: &PrivateWitness,
    ) -> Result<NodeProof, BackendError> {
        if !witness.satisfies(public) {
            return Err(BackendError::Permanent(format!(
                "witness does not satisfy the leaf relation at depth {}",
                public.depth
            )));
        }
        let (terminal_depth, weight) = if public.terminal {
            (
                public.depth,
                exposure_weight(&witness.target, witness.child_exposure),
            )
        } else {
            (0, 0)
        };
        Ok(self.seal_node(Accumulator::leaf(&public.digest(), terminal_depth, weight)))
    }

    async fn fold_proofs(
        &self,
        left: &NodeProof,
        right: &NodeProof,
    ) -> Result<NodeProof, BackendError> {
        if !self.authentic(left) {
            return Err(BackendError::Permanent("left child failed verification".into()));
        }
        if !self.authentic(right) {
            return Err(BackendError::Permanent("right child failed verification".into()));
        }
        let folded = Accumulator::fold(&left.accumulator, &right.accumulator);
        debug!(
            "folded {} + {} leaves at depth {}",
            left.accumulator.leaf_count, right.accumulator.leaf_count, folded.depth
        );
        Ok(self.seal_node(folded))
    }

    async fn wrap(
        &self,
        root: &NodeProof,
        statement: &PublicStatement,
    ) -> Result<Vec<u8>, BackendError> {
        if !self.authentic(root) {
            return Err(BackendError::Permanent("root proof failed verification".into()));
        }
        let acc = &root.accumulator;
        if acc.leaf_count != statement.leaf_count {
            return Err(BackendError::Permanent(format!(
                "root folds {} leaves but the statement claims {}",
                acc.leaf_count, statement.leaf_count
            )));
        }
        if acc.terminal_depth != statement.nesting_depth {
            return Err(BackendError::Permanent(format!(
                "deepest folded terminal is at depth {} but the statement claims {}",
                acc.terminal_depth, statement.nesting_depth
            )));
        }
        if acc.exposure_sum != exposure_sum(&statement.exposures) {
            return Err(BackendError::Permanent(
                "statement exposures do not match the folded leaves".into(),
            ));
        }

        let statement_digest = statement.digest();
        let challenge = wrap_challenge(&statement_digest, &acc.digest());
        let mut envelope = ProofEnvelope {
            statement_digest,
            accumulator: acc.commitment,
            tree_root: acc.root,
            leaf_count: acc.leaf_count,
            fold_depth: acc.depth,
            nesting_depth: statement.nesting_depth,
            expires_at: statement.expires_at.timestamp(),
            challenge,
            opening: wrap_opening(&challenge, &acc.commitment, &acc.root),
            seal: [0u8; SEAL_LEN],
        };
        envelope.seal = self.sealing_key.seal(&envelope.sealed_prefix());
        Ok(envelope.encode())
    }

    async fn verifying_key(&self) -> Result<VerifyingKey, BackendError> {
        Ok(self.key())
    }
}

/// Instantiate the backend selected by configuration.
pub fn backend_from_config(config: &BackendConfig) -> Result<Arc<dyn ProvingBackend>> {
    match config {
        BackendConfig::Local { key_seed } => Ok(Arc::new(LocalProvingBackend::new(key_seed))),
        #[cfg(feature = "remote")]
        BackendConfig::Remote {
            endpoint,
            api_key,
            request_timeout_ms,
        } => Ok(Arc::new(crate::remote::RemoteProvingBackend::new(
            endpoint,
            api_key.clone(),
            std::time::Duration::from_millis(*request_timeout_ms),
        )?)),
        #[cfg(not(feature = "remote"))]
        BackendConfig::Remote { .. } => Err(anyhow::anyhow!(
            "remote proving backend requires the `remote` feature"
        )),
    }
}
