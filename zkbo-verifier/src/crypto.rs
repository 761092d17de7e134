use zkbo_common::accumulator::check_envelope;
use zkbo_common::{ProofEnvelope, PublicInputs, VerifyingKey};

/// Cryptographic half of verification. Structural and metadata checks have
/// already passed when this runs.
pub trait CryptoVerifier: Send + Sync {
    fn name(&self) -> &'static str;

    fn verify(&self, envelope: &ProofEnvelope, inputs: &PublicInputs, key: &VerifyingKey)
        -> bool;
}

/// Checks envelopes produced by the keyed accumulator backend.
#[derive(Clone, Copy, Debug, Default)]
pub struct DigestCryptoVerifier;

impl CryptoVerifier for DigestCryptoVerifier {
    fn name(&self) -> &'static str {
        "digest"
    }

    fn verify(
        &self,
        envelope: &ProofEnvelope,
        inputs: &PublicInputs,
        key: &VerifyingKey,
    ) -> bool {
        let digest_ok = envelope.statement_digest == inputs.statement_digest;
        let expiry_ok = envelope.expires_at == inputs.expires_at;
        digest_ok & expiry_ok & check_envelope(key, envelope)
    }
}
