//! Recursive composition of per-step proofs into one constant-size proof.
//!
//! Leaves are proven concurrently and sorted by public-input digest, then
//! folded pairwise over a balanced tree whose sibling subtrees run in
//! parallel. The root is wrapped together with the public statement into the
//! fixed envelope. Any failure aborts the whole composition; dropping the
//! pending futures cancels sibling work and no partial proof is returned.

use std::sync::Arc;
use std::time::Duration;

use futures::future::{try_join_all, BoxFuture, FutureExt};
use tracing::{debug, info};

use zkbo_common::{
    BackendError, PipelineConfig, Proof, ProofEnvelope, ProofGenerationError, PublicStatement,
    RetryPolicy, VERIFY_GAS,
};

use crate::backend::{NodeProof, ProvingBackend};
use crate::retry::with_retry;
use crate::witness::LeafWitness;

pub struct ProofComposer {
    backend: Arc<dyn ProvingBackend>,
    step_timeout: Duration,
    retry: RetryPolicy,
}

impl ProofComposer {
    pub fn new(backend: Arc<dyn ProvingBackend>, config: &PipelineConfig) -> Self {
        Self {
            backend,
            step_timeout: config.leaf_timeout(),
            retry: config.retry.clone(),
        }
    }

    pub fn backend(&self) -> &Arc<dyn ProvingBackend> {
        &self.backend
    }

    pub async fn compose(
        &self,
        mut witnesses: Vec<LeafWitness>,
        statement: &PublicStatement,
    ) -> Result<Proof, ProofGenerationError> {
        if witnesses.is_empty() {
            return Err(ProofGenerationError::NoLeaves);
        }
        witnesses.sort_by_cached_key(|w| w.public.digest());

        let leaves = try_join_all(
            witnesses
                .iter()
                .enumerate()
                .map(|(index, witness)| self.prove_leaf(index, witness)),
        )
        .await?;
        debug!("proved {} leaf proof(s) on {}", leaves.len(), self.backend.name());

        let root = self.fold_range(&leaves, 0).await?;

        let (result, _) = with_retry(&self.retry, "wrap", BackendError::is_transient, || {
            self.timed(self.backend.wrap(&root, statement))
        })
        .await;
        let bytes = result.map_err(ProofGenerationError::Wrap)?;
        let envelope = ProofEnvelope::decode(&bytes)?;

        info!(
            "composed proof for {}: {} leaves, fold depth {}, nesting depth {}",
            statement.wallet, envelope.leaf_count, envelope.fold_depth, envelope.nesting_depth
        );
        Ok(Proof::new(statement.clone(), bytes, VERIFY_GAS))
    }

    async fn prove_leaf(
        &self,
        index: usize,
        witness: &LeafWitness,
    ) -> Result<NodeProof, ProofGenerationError> {
        let label = format!("leaf {}", index);
        let (result, attempts) = with_retry(&self.retry, &label, BackendError::is_transient, || {
            self.timed(self.backend.prove_leaf(&witness.public, &witness.private))
        })
        .await;
        result.map_err(|source| ProofGenerationError::Leaf {
            index,
            attempts,
            source,
        })
    }

    /// Fold `proofs[..]`, whose first element is leaf `start`. The left
    /// subtree takes the largest power of two below the range length, so an
    /// odd node is carried up unchanged.
    fn fold_range<'a>(
        &'a self,
        proofs: &'a [NodeProof],
        start: usize,
    ) -> BoxFuture<'a, Result<NodeProof, ProofGenerationError>> {
        async move {
            match proofs {
                [] => Err(ProofGenerationError::NoLeaves),
                [single] => Ok(single.clone()),
                _ => {
                    let mid = proofs.len().next_power_of_two() / 2;
                    let (left, right) = proofs.split_at(mid);
                    let (left, right) = tokio::try_join!(
                        self.fold_range(left, start),
                        self.fold_range(right, start + mid)
                    )?;
                    let end = start + proofs.len();
                    let label = format!("fold {}..{}", start, end);
                    let (result, _) =
                        with_retry(&self.retry, &label, BackendError::is_transient, || {
                            self.timed(self.backend.fold_proofs(&left, &right))
                        })
                        .await;
                    result.map_err(|source| ProofGenerationError::Fold { start, end, source })
                }
            }
        }
        .boxed()
    }

    async fn timed<T>(
        &self,
        call: impl std::future::Future<Output = Result<T, BackendError>>,
    ) -> Result<T, BackendError> {
        match tokio::time::timeout(self.step_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(BackendError::Transient(format!(
                "timed out after {}ms",
                self.step_timeout.as_millis()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregator::TraversalStep;
    use crate::backend::LocalProvingBackend;
    use crate::witness::WitnessBuilder;
    use chrono::{TimeZone, Utc};
    use zkbo_common::accumulator::check_envelope;
    use zkbo_common::{Fraction, HoldingEdge, Network, ProtocolKind, PROOF_SIZE_BYTES};

    fn witnesses(n: usize) -> Vec<LeafWitness> {
        let as_of = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let builder = WitnessBuilder::new(&"w".into(), as_of, Network::Mainnet, "zkbo");
        (0..n)
            .map(|i| {
                let share = Fraction::from_bps(100);
                let step = TraversalStep {
                    depth: 1,
                    edge: HoldingEdge::new(
                        "w",
                        format!("t{}-share", i),
                        ProtocolKind::Vault,
                        share,
                        format!("t{}", i),
                    ),
                    parent_exposure: Fraction::ONE,
                    child_exposure: share,
                    terminal: false,
                };
                builder.build_step(i, &step).unwrap()
            })
            .collect()
    }

    fn statement(leaf_count: u32) -> PublicStatement {
        let at = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        PublicStatement {
            wallet: "w".into(),
            network: Network::Mainnet,
            as_of: at,
            nesting_depth: 0,
            protocols_traversed: Vec::new(),
            exposures: Vec::new(),
            leaf_count,
            generated_at: at,
            expires_at: at + chrono::Duration::hours(6),
        }
    }

    fn composer(backend: Arc<LocalProvingBackend>) -> ProofComposer {
        ProofComposer::new(backend, &PipelineConfig::default())
    }

    #[tokio::test]
    async fn test_fold_depth_is_logarithmic() {
        let backend = Arc::new(LocalProvingBackend::new(&[3; 32]));
        for (n, depth) in [(1usize, 0u8), (2, 1), (3, 2), (5, 3), (8, 3), (9, 4)] {
            let proof = composer(backend.clone())
                .compose(witnesses(n), &statement(n as u32))
                .await
                .unwrap();
            assert_eq!(proof.proof_data.len(), PROOF_SIZE_BYTES);
            let envelope = proof.envelope().unwrap();
            assert_eq!(envelope.fold_depth, depth, "n = {}", n);
            assert_eq!(envelope.leaf_count, n as u32);
            assert!(check_envelope(&backend.key(), &envelope));
        }
    }

    #[tokio::test]
    async fn test_leaf_order_does_not_change_the_proof() {
        let backend = Arc::new(LocalProvingBackend::new(&[3; 32]));
        let forward = composer(backend.clone())
            .compose(witnesses(6), &statement(6))
            .await
            .unwrap();
        let mut reversed = witnesses(6);
        reversed.reverse();
        let backward = composer(backend).compose(reversed, &statement(6)).await.unwrap();
        assert_eq!(forward.proof_data, backward.proof_data);
    }

    #[tokio::test]
    async fn test_empty_composition_fails() {
        let backend = Arc::new(LocalProvingBackend::new(&[3; 32]));
        assert!(matches!(
            composer(backend).compose(Vec::new(), &statement(0)).await,
            Err(ProofGenerationError::NoLeaves)
        ));
    }

    #[tokio::test]
    async fn test_invalid_leaf_names_its_index() {
        let backend = Arc::new(LocalProvingBackend::new(&[3; 32]));
        let mut leaves = witnesses(4);
        leaves.sort_by_cached_key(|w| w.public.digest());
        leaves[2].private.child_exposure = Fraction::from_bps(9);
        match composer(backend).compose(leaves, &statement(4)).await {
            Err(ProofGenerationError::Leaf { index, attempts, .. }) => {
                assert_eq!(index, 2);
                assert_eq!(attempts, 1);
            }
            other => panic!("unexpected result: {:?}", other.map(|p| p.leaf_count)),
        }
    }
}
