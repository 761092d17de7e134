//! Off-chain verification of a proof artifact.
//!
//! Checks run cheapest first: envelope structure, expiry, consistency of the
//! public metadata with what the envelope commits to, and finally the
//! cryptographic primitive. An invalid proof is reported through
//! [`VerificationOutcome`]; only input that is not a proof at all is an error.

use std::sync::Arc;

use thiserror::Error;
use tracing::debug;

use zkbo_common::{
    Clock, Fraction, Proof, ProofEnvelope, VerificationError, VerifyingKey, MAX_NESTING_DEPTH,
};

use crate::crypto::{CryptoVerifier, DigestCryptoVerifier};
use crate::expiry::{expired_at, ExpiryPolicy};

#[derive(Debug, Error)]
pub enum VerifierError {
    #[error("input is not a proof: {0}")]
    Malformed(String),
}

/// Verdict plus the first failed check, if any.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VerificationOutcome {
    pub valid: bool,
    pub error: Option<VerificationError>,
}

impl VerificationOutcome {
    pub fn accepted() -> Self {
        Self {
            valid: true,
            error: None,
        }
    }

    pub fn rejected(error: VerificationError) -> Self {
        Self {
            valid: false,
            error: Some(error),
        }
    }

    pub fn code(&self) -> Option<&'static str> {
        self.error.as_ref().map(VerificationError::code)
    }

    pub fn reason(&self) -> Option<String> {
        self.error.as_ref().map(ToString::to_string)
    }
}

pub struct LocalVerifier {
    expiry: ExpiryPolicy,
    clock: Arc<dyn Clock>,
    primitive: Option<(Arc<dyn CryptoVerifier>, VerifyingKey)>,
}

impl LocalVerifier {
    /// Verifier without a cryptographic primitive; every proof that passes
    /// the metadata checks is still reported invalid.
    pub fn new(expiry: ExpiryPolicy, clock: Arc<dyn Clock>) -> Self {
        Self {
            expiry,
            clock,
            primitive: None,
        }
    }

    /// Verifier for envelopes sealed by the local accumulator backend.
    pub fn for_key(key: VerifyingKey, expiry: ExpiryPolicy, clock: Arc<dyn Clock>) -> Self {
        Self::new(expiry, clock).with_primitive(Arc::new(DigestCryptoVerifier), key)
    }

    pub fn with_primitive(mut self, primitive: Arc<dyn CryptoVerifier>, key: VerifyingKey) -> Self {
        self.primitive = Some((primitive, key));
        self
    }

    pub fn verifying_key(&self) -> Option<VerifyingKey> {
        self.primitive.as_ref().map(|(_, key)| *key)
    }

    pub fn verify(&self, proof: &Proof) -> bool {
        self.check(proof).valid
    }

    pub fn check(&self, proof: &Proof) -> VerificationOutcome {
        match self.run_checks(proof) {
            Ok(()) => VerificationOutcome::accepted(),
            Err(error) => {
                debug!("proof for {} rejected: {}", proof.wallet, error);
                VerificationOutcome::rejected(error)
            }
        }
    }

    pub fn verify_json(&self, json: &[u8]) -> Result<VerificationOutcome, VerifierError> {
        let proof = Proof::from_json(json).map_err(|e| VerifierError::Malformed(e.to_string()))?;
        Ok(self.check(&proof))
    }

    fn run_checks(&self, proof: &Proof) -> Result<(), VerificationError> {
        let envelope = proof.envelope()?;
        check_header(&envelope)?;

        let now = self.clock.now();
        if self.expiry.is_expired(proof, now) || now.timestamp() >= envelope.expires_at {
            return Err(VerificationError::Expired);
        }

        check_metadata(proof, &envelope)?;

        let (primitive, key) = self
            .primitive
            .as_ref()
            .ok_or(VerificationError::NoVerificationPrimitive)?;
        if primitive.verify(&envelope, &proof.public_inputs(), key) {
            Ok(())
        } else {
            Err(VerificationError::CryptoRejected)
        }
    }
}

fn check_header(envelope: &ProofEnvelope) -> Result<(), VerificationError> {
    if envelope.leaf_count == 0 {
        return Err(inconsistent("envelope folds no leaves"));
    }
    let expected_depth = u64::from(envelope.leaf_count)
        .next_power_of_two()
        .trailing_zeros();
    if u32::from(envelope.fold_depth) != expected_depth {
        return Err(inconsistent(format!(
            "fold depth {} for {} leaves",
            envelope.fold_depth, envelope.leaf_count
        )));
    }
    if envelope.nesting_depth > MAX_NESTING_DEPTH {
        return Err(inconsistent(format!(
            "nesting depth {} outside 0..={}",
            envelope.nesting_depth, MAX_NESTING_DEPTH
        )));
    }
    Ok(())
}

fn check_metadata(proof: &Proof, envelope: &ProofEnvelope) -> Result<(), VerificationError> {
    if proof.nesting_depth != envelope.nesting_depth {
        return Err(inconsistent(format!(
            "nesting depth {} but envelope commits {}",
            proof.nesting_depth, envelope.nesting_depth
        )));
    }
    if proof.leaf_count != envelope.leaf_count {
        return Err(inconsistent(format!(
            "leaf count {} but envelope commits {}",
            proof.leaf_count, envelope.leaf_count
        )));
    }
    if proof.protocols_traversed.len() != usize::from(proof.nesting_depth) {
        return Err(inconsistent(format!(
            "{} protocols listed for nesting depth {}",
            proof.protocols_traversed.len(),
            proof.nesting_depth
        )));
    }
    if proof.expires_at.timestamp() != envelope.expires_at {
        return Err(inconsistent("expiry differs from the committed bound"));
    }
    if expired_at(proof.expires_at, proof.generated_at) {
        return Err(inconsistent("proof expires before it was generated"));
    }
    let named = proof
        .exposures
        .iter()
        .try_fold(Fraction::ZERO, |acc, e| acc.checked_add(e.fraction))
        .ok_or_else(|| inconsistent("exposure fractions overflow"))?;
    if named > Fraction::ONE.saturating_add(Fraction::EPSILON) {
        return Err(inconsistent(format!("named exposure {} exceeds 100%", named)));
    }
    if proof.statement().digest() != envelope.statement_digest {
        return Err(VerificationError::StatementMismatch);
    }
    Ok(())
}

fn inconsistent(detail: impl Into<String>) -> VerificationError {
    VerificationError::InconsistentMetadata(detail.into())
}
