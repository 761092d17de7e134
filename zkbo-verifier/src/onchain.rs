//! Submission of proofs to an on-chain verification routine.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use zkbo_common::{
    ChainError, Clock, Network, Proof, ProofEnvelope, PublicInputs, VerificationError,
    VerifyingKey, PROOF_SIZE_BYTES, VERIFY_GAS,
};

use crate::crypto::CryptoVerifier;
use crate::expiry::ExpiryPolicy;

/// Fixed cost of entering the verifier contract.
pub const CALL_OVERHEAD_GAS: u64 = 10_984;
pub const CALLDATA_GAS_PER_BYTE: u64 = 16;
/// Cost of the single pairing check, independent of the proof.
pub const PAIRING_CHECK_GAS: u64 = 45_000;
/// Calldata size of a well-formed call.
pub const CALLDATA_BYTES: usize = PROOF_SIZE_BYTES + 32 * PublicInputs::WORDS;

const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// Calldata for one verification call.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainCall {
    #[serde(with = "zkbo_common::serde_hex")]
    pub envelope: Vec<u8>,
    pub public_inputs: PublicInputs,
}

impl ChainCall {
    pub fn calldata(&self) -> Vec<u8> {
        let mut data = Vec::with_capacity(self.envelope.len() + 32 * PublicInputs::WORDS);
        data.extend_from_slice(&self.envelope);
        for word in self.public_inputs.to_words() {
            data.extend_from_slice(&word);
        }
        data
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainReceipt {
    pub accepted: bool,
    pub gas_used: u64,
}

/// On-chain verification routine for one network.
#[async_trait]
pub trait ChainVerifier: Send + Sync {
    fn network(&self) -> Network;

    async fn verify(&self, call: &ChainCall, gas_budget: u64) -> Result<ChainReceipt, ChainError>;
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChainStatus {
    Accepted,
    Rejected(VerificationError),
    /// The routine could not be reached; the proof was not checked.
    Unreachable(ChainError),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OnChainVerdict {
    pub accepted: bool,
    pub cost_consumed: u64,
    pub status: ChainStatus,
}

impl OnChainVerdict {
    fn rejected(reason: VerificationError, cost_consumed: u64) -> Self {
        Self {
            accepted: false,
            cost_consumed,
            status: ChainStatus::Rejected(reason),
        }
    }
}

pub struct OnChainVerifierAdapter {
    chain: Arc<dyn ChainVerifier>,
    expiry: ExpiryPolicy,
    clock: Arc<dyn Clock>,
    gas_budget: u64,
    timeout: Duration,
}

impl OnChainVerifierAdapter {
    pub fn new(chain: Arc<dyn ChainVerifier>, expiry: ExpiryPolicy, clock: Arc<dyn Clock>) -> Self {
        Self {
            chain,
            expiry,
            clock,
            gas_budget: VERIFY_GAS,
            timeout: DEFAULT_CALL_TIMEOUT,
        }
    }

    pub fn with_gas_budget(mut self, gas_budget: u64) -> Self {
        self.gas_budget = gas_budget;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn gas_budget(&self) -> u64 {
        self.gas_budget
    }

    pub async fn verify(&self, proof: &Proof) -> OnChainVerdict {
        if self.expiry.is_expired(proof, self.clock.now()) {
            return OnChainVerdict::rejected(VerificationError::Expired, 0);
        }
        let network = self.chain.network();
        if proof.network != network {
            return OnChainVerdict::rejected(
                VerificationError::InconsistentMetadata(format!(
                    "proof for {} submitted to {}",
                    proof.network, network
                )),
                0,
            );
        }
        if let Err(err) = proof.envelope() {
            return OnChainVerdict::rejected(VerificationError::Malformed(err), 0);
        }

        let call = ChainCall {
            envelope: proof.proof_data.clone(),
            public_inputs: proof.public_inputs(),
        };
        let receipt =
            match tokio::time::timeout(self.timeout, self.chain.verify(&call, self.gas_budget))
                .await
            {
                Ok(Ok(receipt)) => receipt,
                Ok(Err(err)) => return self.unreachable(proof, err),
                Err(_) => {
                    let ms = u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX);
                    return self.unreachable(proof, ChainError::Timeout(ms));
                }
            };

        if receipt.gas_used > self.gas_budget {
            warn!(
                "{} verification of {} used {} gas, budget {}",
                network, proof.wallet, receipt.gas_used, self.gas_budget
            );
            return OnChainVerdict::rejected(
                VerificationError::BudgetExceeded {
                    budget: self.gas_budget,
                    consumed: receipt.gas_used,
                },
                receipt.gas_used,
            );
        }

        info!(
            "{} verification of {}: accepted={} gas={}",
            network, proof.wallet, receipt.accepted, receipt.gas_used
        );
        if receipt.accepted {
            OnChainVerdict {
                accepted: true,
                cost_consumed: receipt.gas_used,
                status: ChainStatus::Accepted,
            }
        } else {
            OnChainVerdict::rejected(VerificationError::CryptoRejected, receipt.gas_used)
        }
    }

    fn unreachable(&self, proof: &Proof, err: ChainError) -> OnChainVerdict {
        warn!("{} verifier unreachable for {}: {}", self.chain.network(), proof.wallet, err);
        OnChainVerdict {
            accepted: false,
            cost_consumed: 0,
            status: ChainStatus::Unreachable(err),
        }
    }
}

/// In-process stand-in for the verifier contract. Meters calldata and one
/// pairing check, so a well-formed call always costs [`VERIFY_GAS`].
pub struct SimulatedChainVerifier {
    network: Network,
    primitive: Arc<dyn CryptoVerifier>,
    key: VerifyingKey,
    clock: Arc<dyn Clock>,
}

impl SimulatedChainVerifier {
    pub fn new(
        network: Network,
        primitive: Arc<dyn CryptoVerifier>,
        key: VerifyingKey,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            network,
            primitive,
            key,
            clock,
        }
    }

    pub fn gas_for(call: &ChainCall) -> u64 {
        let calldata = u64::try_from(call.calldata().len()).unwrap_or(u64::MAX);
        CALL_OVERHEAD_GAS
            .saturating_add(calldata.saturating_mul(CALLDATA_GAS_PER_BYTE))
            .saturating_add(PAIRING_CHECK_GAS)
    }
}

#[async_trait]
impl ChainVerifier for SimulatedChainVerifier {
    fn network(&self) -> Network {
        self.network
    }

    async fn verify(&self, call: &ChainCall, gas_budget: u64) -> Result<ChainReceipt, ChainError> {
        let gas = Self::gas_for(call);
        if gas > gas_budget {
            // Out of gas: the call reverts after burning the whole budget.
            return Ok(ChainReceipt {
                accepted: false,
                gas_used: gas_budget,
            });
        }
        let accepted = match ProofEnvelope::decode(&call.envelope) {
            Ok(envelope) => {
                let live = self.clock.now().timestamp() < call.public_inputs.expires_at;
                live & self.primitive.verify(&envelope, &call.public_inputs, &self.key)
            }
            Err(_) => false,
        };
        Ok(ChainReceipt {
            accepted,
            gas_used: gas,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::DigestCryptoVerifier;
    use crate::testing::{sample_proof, TEST_SEED};
    use zkbo_common::FixedClock;

    struct Down;

    #[async_trait]
    impl ChainVerifier for Down {
        fn network(&self) -> Network {
            Network::Mainnet
        }

        async fn verify(&self, _: &ChainCall, _: u64) -> Result<ChainReceipt, ChainError> {
            Err(ChainError::Transport("connection refused".into()))
        }
    }

    struct Stalled;

    #[async_trait]
    impl ChainVerifier for Stalled {
        fn network(&self) -> Network {
            Network::Mainnet
        }

        async fn verify(&self, _: &ChainCall, _: u64) -> Result<ChainReceipt, ChainError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Err(ChainError::InvalidResponse("unreachable".into()))
        }
    }

    /// Reports whatever gas it was built with.
    struct Greedy(u64);

    #[async_trait]
    impl ChainVerifier for Greedy {
        fn network(&self) -> Network {
            Network::Mainnet
        }

        async fn verify(&self, _: &ChainCall, _: u64) -> Result<ChainReceipt, ChainError> {
            Ok(ChainReceipt {
                accepted: true,
                gas_used: self.0,
            })
        }
    }

    fn setup(network: Network) -> (Proof, Arc<FixedClock>, Arc<SimulatedChainVerifier>) {
        let proof = sample_proof();
        let clock = Arc::new(FixedClock::new(proof.generated_at));
        let chain = Arc::new(SimulatedChainVerifier::new(
            network,
            Arc::new(DigestCryptoVerifier),
            VerifyingKey::from_seed(&TEST_SEED),
            clock.clone(),
        ));
        (proof, clock, chain)
    }

    #[test]
    fn gas_constants_add_up() {
        assert_eq!(
            CALL_OVERHEAD_GAS + CALLDATA_BYTES as u64 * CALLDATA_GAS_PER_BYTE + PAIRING_CHECK_GAS,
            VERIFY_GAS
        );
    }

    #[tokio::test]
    async fn valid_proof_costs_exactly_the_declared_gas() {
        let (proof, clock, chain) = setup(Network::Mainnet);
        let adapter = OnChainVerifierAdapter::new(chain, ExpiryPolicy::default(), clock);
        let verdict = adapter.verify(&proof).await;
        assert!(verdict.accepted);
        assert_eq!(verdict.status, ChainStatus::Accepted);
        assert_eq!(verdict.cost_consumed, VERIFY_GAS);
        assert_eq!(verdict.cost_consumed, proof.verification_cost);
    }

    #[tokio::test]
    async fn tampered_proof_is_rejected_on_chain() {
        let (mut proof, clock, chain) = setup(Network::Mainnet);
        proof.proof_data[300] ^= 0x80;
        let adapter = OnChainVerifierAdapter::new(chain, ExpiryPolicy::default(), clock);
        let verdict = adapter.verify(&proof).await;
        assert!(!verdict.accepted);
        assert_eq!(
            verdict.status,
            ChainStatus::Rejected(VerificationError::CryptoRejected)
        );
        assert_eq!(verdict.cost_consumed, VERIFY_GAS);
    }

    #[tokio::test]
    async fn expired_proof_is_never_submitted() {
        let (proof, clock, _) = setup(Network::Mainnet);
        clock.set(proof.expires_at);
        let adapter = OnChainVerifierAdapter::new(Arc::new(Down), ExpiryPolicy::default(), clock);
        let verdict = adapter.verify(&proof).await;
        assert_eq!(
            verdict,
            OnChainVerdict {
                accepted: false,
                cost_consumed: 0,
                status: ChainStatus::Rejected(VerificationError::Expired),
            }
        );
    }

    #[tokio::test]
    async fn wrong_network_is_rejected_before_submission() {
        let (proof, clock, chain) = setup(Network::Base);
        let adapter = OnChainVerifierAdapter::new(chain, ExpiryPolicy::default(), clock);
        let verdict = adapter.verify(&proof).await;
        assert!(!verdict.accepted);
        assert_eq!(verdict.cost_consumed, 0);
        assert!(matches!(
            verdict.status,
            ChainStatus::Rejected(VerificationError::InconsistentMetadata(_))
        ));
    }

    #[tokio::test]
    async fn transport_failure_fails_closed() {
        let (proof, clock, _) = setup(Network::Mainnet);
        let adapter = OnChainVerifierAdapter::new(Arc::new(Down), ExpiryPolicy::default(), clock);
        let verdict = adapter.verify(&proof).await;
        assert!(!verdict.accepted);
        assert!(matches!(
            verdict.status,
            ChainStatus::Unreachable(ChainError::Transport(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_routine_times_out() {
        let (proof, clock, _) = setup(Network::Mainnet);
        let adapter = OnChainVerifierAdapter::new(Arc::new(Stalled), ExpiryPolicy::default(), clock)
            .with_timeout(Duration::from_secs(2));
        let verdict = adapter.verify(&proof).await;
        assert_eq!(verdict.status, ChainStatus::Unreachable(ChainError::Timeout(2_000)));
    }

    #[tokio::test]
    async fn overspending_routine_is_rejected() {
        let (proof, clock, _) = setup(Network::Mainnet);
        let adapter = OnChainVerifierAdapter::new(
            Arc::new(Greedy(VERIFY_GAS + 1)),
            ExpiryPolicy::default(),
            clock,
        );
        let verdict = adapter.verify(&proof).await;
        assert!(!verdict.accepted);
        assert_eq!(
            verdict.status,
            ChainStatus::Rejected(VerificationError::BudgetExceeded {
                budget: VERIFY_GAS,
                consumed: VERIFY_GAS + 1,
            })
        );
    }

    #[tokio::test]
    async fn budget_below_cost_runs_out_of_gas() {
        let (proof, clock, chain) = setup(Network::Mainnet);
        let adapter = OnChainVerifierAdapter::new(chain, ExpiryPolicy::default(), clock)
            .with_gas_budget(VERIFY_GAS - 1);
        let verdict = adapter.verify(&proof).await;
        assert!(!verdict.accepted);
        assert_eq!(verdict.cost_consumed, VERIFY_GAS - 1);
    }
}
