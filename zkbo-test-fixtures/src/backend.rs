use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use zkbo_common::{BackendError, PublicStatement, VerifyingKey};
use zkbo_prover::{LeafPublicInput, LocalProvingBackend, NodeProof, PrivateWitness, ProvingBackend};

/// Local backend that fails on demand.
pub struct FlakyBackend {
    inner: LocalProvingBackend,
    transient_leaf_failures: AtomicU32,
    transient_wrap_failures: AtomicU32,
    stalled_leaves: AtomicU32,
    stall: Duration,
    permanent_folds: bool,
    leaf_calls: AtomicU32,
    wrap_calls: AtomicU32,
}

impl FlakyBackend {
    pub fn new(key_seed: &[u8; 32]) -> Self {
        Self {
            inner: LocalProvingBackend::new(key_seed),
            transient_leaf_failures: AtomicU32::new(0),
            transient_wrap_failures: AtomicU32::new(0),
            stalled_leaves: AtomicU32::new(0),
            stall: Duration::ZERO,
            permanent_folds: false,
            leaf_calls: AtomicU32::new(0),
            wrap_calls: AtomicU32::new(0),
        }
    }

    /// The next `n` leaf calls fail transiently.
    pub fn fail_leaves(self, n: u32) -> Self {
        self.transient_leaf_failures.store(n, Ordering::SeqCst);
        self
    }

    /// The next `n` wrap calls fail transiently.
    pub fn fail_wraps(self, n: u32) -> Self {
        self.transient_wrap_failures.store(n, Ordering::SeqCst);
        self
    }

    /// The next `n` leaf calls hang for `stall` before answering; pairs with
    /// paused tokio time.
    pub fn stall_leaves(mut self, n: u32, stall: Duration) -> Self {
        self.stalled_leaves.store(n, Ordering::SeqCst);
        self.stall = stall;
        self
    }

    pub fn fail_folds_permanently(mut self) -> Self {
        self.permanent_folds = true;
        self
    }

    pub fn leaf_calls(&self) -> u32 {
        self.leaf_calls.load(Ordering::SeqCst)
    }

    pub fn wrap_calls(&self) -> u32 {
        self.wrap_calls.load(Ordering::SeqCst)
    }
}

fn take_failure(counter: &AtomicU32) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
        .is_ok()
}

#[async_trait]
impl ProvingBackend for FlakyBackend {
    fn name(&self) -> &'static str {
        "flaky"
    }

    async fn prove_leaf(
        &self,
        public: &LeafPublicInput,
        witness: &PrivateWitness,
    ) -> Result<NodeProof, BackendError> {
        self.leaf_calls.fetch_add(1, Ordering::SeqCst);
        if take_failure(&self.transient_leaf_failures) {
            return Err(BackendError::Transient("prover busy".into()));
        }
        if take_failure(&self.stalled_leaves) {
            tokio::time::sleep(self.stall).await;
        }
        self.inner.prove_leaf(public, witness).await
    }

    async fn fold_proofs(
        &self,
        left: &NodeProof,
        right: &NodeProof,
    ) -> Result<NodeProof, BackendError> {
        if self.permanent_folds {
            return Err(BackendError::Permanent("fold circuit rejected input".into()));
        }
        self.inner.fold_proofs(left, right).await
    }

    async fn wrap(
        &self,
        root: &NodeProof,
        statement: &PublicStatement,
    ) -> Result<Vec<u8>, BackendError> {
        self.wrap_calls.fetch_add(1, Ordering::SeqCst);
        if take_failure(&self.transient_wrap_failures) {
            return Err(BackendError::Transient("wrapper unavailable".into()));
        }
        self.inner.wrap(root, statement).await
    }

    async fn verifying_key(&self) -> Result<VerifyingKey, BackendError> {
        self.inner.verifying_key().await
    }
}
