//! Keyed BLAKE3 accumulation scheme backing the in-process prover.
//!
//! Leaf proofs carry a 64-byte accumulator commitment and a Merkle-style root
//! over leaf public inputs. Folding two accumulators derives a Fiat-Shamir
//! challenge from both and squeezes a fresh commitment. Accumulators also
//! carry the deepest terminal hop and a linear sum of terminal exposure
//! weights, so the wrap step can hold a statement to what was folded. The
//! wrapped envelope is signed with an Ed25519 key only the prover holds; the
//! check a verifier runs is constant-time regardless of how many leaves were
//! folded.

use std::fmt;

use ed25519_dalek::{Signature, Signer, SigningKey};
use serde::{Deserialize, Serialize};

use crate::envelope::{ProofEnvelope, OPENING_LEN, SEAL_LEN};
use crate::fraction::Fraction;
use crate::types::{NodeId, TerminalExposure};

const DOMAIN_SEALING_KEY: &str = "zkbo 2026 sealing key v1";
const DOMAIN_NODE_KEY: &str = "zkbo 2026 node tag key v1";
const DOMAIN_LEAF_ACC: &str = "zkbo 2026 leaf accumulator v1";
const DOMAIN_FOLD_CHALLENGE: &str = "zkbo 2026 fold challenge v1";
const DOMAIN_FOLD_COMMITMENT: &str = "zkbo 2026 fold commitment v1";
const DOMAIN_TREE_NODE: &str = "zkbo 2026 fold tree node v1";
const DOMAIN_ACC_DIGEST: &str = "zkbo 2026 accumulator digest v1";
const DOMAIN_WRAP_CHALLENGE: &str = "zkbo 2026 wrap challenge v1";
const DOMAIN_WRAP_OPENING: &str = "zkbo 2026 wrap opening v1";
const DOMAIN_EXPOSURE_WEIGHT: &str = "zkbo 2026 exposure weight v1";

/// Ed25519 public key that checks envelope seals. Safe to publish.
#[derive(Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VerifyingKey(#[serde(with = "crate::serde_hex32")] [u8; 32]);

impl VerifyingKey {
    /// Public half of [`SealingKey::from_seed`].
    pub fn from_seed(seed: &[u8; 32]) -> Self {
        SealingKey::from_seed(seed).verifying_key()
    }

    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Short identifier safe to log and publish.
    pub fn fingerprint(&self) -> String {
        crate::hash_bytes_hex(&self.0)[..16].to_string()
    }
}

impl fmt::Debug for VerifyingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VerifyingKey({})", self.fingerprint())
    }
}

/// Prover-only Ed25519 key that signs wrapped envelopes.
#[derive(Clone)]
pub struct SealingKey(SigningKey);

impl SealingKey {
    pub fn from_seed(seed: &[u8; 32]) -> Self {
        Self(SigningKey::from_bytes(&blake3::derive_key(DOMAIN_SEALING_KEY, seed)))
    }

    pub fn verifying_key(&self) -> VerifyingKey {
        VerifyingKey(self.0.verifying_key().to_bytes())
    }

    pub fn seal(&self, sealed_prefix: &[u8]) -> [u8; SEAL_LEN] {
        self.0.sign(sealed_prefix).to_bytes()
    }
}

impl fmt::Debug for SealingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SealingKey({})", self.verifying_key().fingerprint())
    }
}

/// Prover-only key authenticating intermediate node proofs.
pub fn node_key(seed: &[u8; 32]) -> [u8; 32] {
    blake3::derive_key(DOMAIN_NODE_KEY, seed)
}

/// Weight of `fraction` of `asset`. Weights add, so the sum over terminal
/// leaves equals the sum over per-asset totals.
pub fn exposure_weight(asset: &NodeId, fraction: Fraction) -> u128 {
    let key = blake3::derive_key(DOMAIN_EXPOSURE_WEIGHT, asset.as_str().as_bytes());
    let mut generator = [0u8; 16];
    generator.copy_from_slice(&key[..16]);
    u128::from_be_bytes(generator).wrapping_mul(u128::from(fraction.raw()))
}

pub fn exposure_sum(exposures: &[TerminalExposure]) -> u128 {
    exposures
        .iter()
        .fold(0u128, |acc, e| acc.wrapping_add(exposure_weight(&e.asset, e.fraction)))
}

/// Folding state of one subtree.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Accumulator {
    #[serde(with = "crate::serde_bytes_64")]
    pub commitment: [u8; 64],
    /// Root of the fold tree over leaf public-input digests.
    #[serde(with = "crate::serde_hex32")]
    pub root: [u8; 32],
    pub leaf_count: u32,
    pub depth: u8,
    /// Deepest hop among terminal leaves, 0 when there are none.
    pub terminal_depth: u8,
    #[serde(with = "crate::serde_u128")]
    pub exposure_sum: u128,
}

impl Accumulator {
    /// Non-terminal leaves pass `terminal_depth = 0` and `exposure_sum = 0`.
    pub fn leaf(public_digest: &[u8; 32], terminal_depth: u8, exposure_sum: u128) -> Self {
        let mut commitment = [0u8; 64];
        let mut hasher = blake3::Hasher::new_derive_key(DOMAIN_LEAF_ACC);
        hasher.update(public_digest);
        hasher.update(&[terminal_depth]);
        hasher.update(&exposure_sum.to_be_bytes());
        hasher.finalize_xof().fill(&mut commitment);
        Self {
            commitment,
            root: *public_digest,
            leaf_count: 1,
            depth: 0,
            terminal_depth,
            exposure_sum,
        }
    }

    pub fn fold(left: &Accumulator, right: &Accumulator) -> Self {
        let challenge = fold_challenge(left, right);
        let terminal_depth = left.terminal_depth.max(right.terminal_depth);
        let exposure_sum = left.exposure_sum.wrapping_add(right.exposure_sum);

        let mut commitment = [0u8; 64];
        let mut hasher = blake3::Hasher::new_derive_key(DOMAIN_FOLD_COMMITMENT);
        hasher.update(&left.commitment);
        hasher.update(&right.commitment);
        hasher.update(&challenge);
        hasher.update(&[terminal_depth]);
        hasher.update(&exposure_sum.to_be_bytes());
        hasher.finalize_xof().fill(&mut commitment);

        let mut node = blake3::Hasher::new_derive_key(DOMAIN_TREE_NODE);
        node.update(&left.root);
        node.update(&right.root);

        Self {
            commitment,
            root: *node.finalize().as_bytes(),
            leaf_count: left.leaf_count.saturating_add(right.leaf_count),
            depth: left.depth.max(right.depth).saturating_add(1),
            terminal_depth,
            exposure_sum,
        }
    }

    pub fn digest(&self) -> [u8; 32] {
        accumulator_digest(&self.commitment, &self.root, self.leaf_count, self.depth)
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(64 + 32 + 4 + 1 + 1 + 16);
        bytes.extend_from_slice(&self.commitment);
        bytes.extend_from_slice(&self.root);
        bytes.extend_from_slice(&self.leaf_count.to_be_bytes());
        bytes.push(self.depth);
        bytes.push(self.terminal_depth);
        bytes.extend_from_slice(&self.exposure_sum.to_be_bytes());
        bytes
    }
}

fn fold_challenge(left: &Accumulator, right: &Accumulator) -> [u8; 32] {
    let mut hasher = blake3::Hasher::new_derive_key(DOMAIN_FOLD_CHALLENGE);
    hasher.update(&left.digest());
    hasher.update(&right.digest());
    *hasher.finalize().as_bytes()
}

pub fn accumulator_digest(
    commitment: &[u8; 64],
    root: &[u8; 32],
    leaf_count: u32,
    depth: u8,
) -> [u8; 32] {
    let mut hasher = blake3::Hasher::new_derive_key(DOMAIN_ACC_DIGEST);
    hasher.update(commitment);
    hasher.update(root);
    hasher.update(&leaf_count.to_be_bytes());
    hasher.update(&[depth]);
    *hasher.finalize().as_bytes()
}

pub fn wrap_challenge(statement_digest: &[u8; 32], accumulator_digest: &[u8; 32]) -> [u8; 32] {
    let mut hasher = blake3::Hasher::new_derive_key(DOMAIN_WRAP_CHALLENGE);
    hasher.update(statement_digest);
    hasher.update(accumulator_digest);
    *hasher.finalize().as_bytes()
}

pub fn wrap_opening(
    challenge: &[u8; 32],
    commitment: &[u8; 64],
    root: &[u8; 32],
) -> [u8; OPENING_LEN] {
    let mut opening = [0u8; OPENING_LEN];
    let mut hasher = blake3::Hasher::new_derive_key(DOMAIN_WRAP_OPENING);
    hasher.update(challenge);
    hasher.update(commitment);
    hasher.update(root);
    hasher.finalize_xof().fill(&mut opening);
    opening
}

pub fn verify_seal(key: &VerifyingKey, sealed_prefix: &[u8], seal: &[u8; SEAL_LEN]) -> bool {
    match ed25519_dalek::VerifyingKey::from_bytes(key.as_bytes()) {
        Ok(public) => public
            .verify_strict(sealed_prefix, &Signature::from_bytes(seal))
            .is_ok(),
        Err(_) => false,
    }
}

/// Recompute every derived field of `envelope` and compare in constant time.
pub fn check_envelope(key: &VerifyingKey, envelope: &ProofEnvelope) -> bool {
    let acc_digest = accumulator_digest(
        &envelope.accumulator,
        &envelope.tree_root,
        envelope.leaf_count,
        envelope.fold_depth,
    );
    let challenge = wrap_challenge(&envelope.statement_digest, &acc_digest);
    let opening = wrap_opening(&challenge, &envelope.accumulator, &envelope.tree_root);
    let seal_ok = verify_seal(key, &envelope.sealed_prefix(), &envelope.seal);

    let challenge_ok = blake3::Hash::from(challenge) == blake3::Hash::from(envelope.challenge);
    let opening_ok = opening
        .iter()
        .zip(envelope.opening.iter())
        .fold(0u8, |acc, (a, b)| acc | (a ^ b))
        == 0;
    challenge_ok & opening_ok & seal_ok
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(byte: u8) -> Accumulator {
        Accumulator::leaf(&[byte; 32], 0, 0)
    }

    fn sealed(key: &SealingKey, acc: &Accumulator) -> ProofEnvelope {
        let statement_digest = [5u8; 32];
        let challenge = wrap_challenge(&statement_digest, &acc.digest());
        let mut envelope = ProofEnvelope {
            statement_digest,
            accumulator: acc.commitment,
            tree_root: acc.root,
            leaf_count: acc.leaf_count,
            fold_depth: acc.depth,
            nesting_depth: 1,
            expires_at: 1_800_000_000,
            challenge,
            opening: wrap_opening(&challenge, &acc.commitment, &acc.root),
            seal: [0; SEAL_LEN],
        };
        envelope.seal = key.seal(&envelope.sealed_prefix());
        envelope
    }

    #[test]
    fn fold_is_order_sensitive_and_counts_leaves() {
        let a = leaf(1);
        let b = leaf(2);
        let ab = Accumulator::fold(&a, &b);
        let ba = Accumulator::fold(&b, &a);
        assert_ne!(ab.commitment, ba.commitment);
        assert_eq!(ab.leaf_count, 2);
        assert_eq!(ab.depth, 1);

        let abc = Accumulator::fold(&ab, &leaf(3));
        assert_eq!(abc.leaf_count, 3);
        assert_eq!(abc.depth, 2);
    }

    #[test]
    fn fold_carries_terminal_depth_and_exposure() {
        let usdc = NodeId::new("USDC");
        let eth = NodeId::new("ETH");
        let a = Accumulator::leaf(&[1; 32], 2, exposure_weight(&usdc, Fraction::from_bps(3000)));
        let b = Accumulator::leaf(&[2; 32], 1, exposure_weight(&usdc, Fraction::from_bps(5000)));
        let c = Accumulator::leaf(&[3; 32], 3, exposure_weight(&eth, Fraction::from_bps(2000)));
        let root = Accumulator::fold(&Accumulator::fold(&a, &b), &Accumulator::fold(&c, &leaf(4)));
        assert_eq!(root.terminal_depth, 3);

        let totals = vec![
            TerminalExposure {
                asset: usdc,
                amount: 0,
                fraction: Fraction::from_bps(8000),
            },
            TerminalExposure {
                asset: eth.clone(),
                amount: 0,
                fraction: Fraction::from_bps(2000),
            },
        ];
        assert_eq!(root.exposure_sum, exposure_sum(&totals));

        let shifted = vec![TerminalExposure {
            asset: eth,
            amount: 0,
            fraction: Fraction::ONE,
        }];
        assert_ne!(root.exposure_sum, exposure_sum(&shifted));
    }

    #[test]
    fn keys_are_domain_separated() {
        let seed = [7u8; 32];
        assert_ne!(VerifyingKey::from_seed(&seed).as_bytes(), &node_key(&seed));
    }

    #[test]
    fn envelope_check_rejects_tampering() {
        let key = SealingKey::from_seed(&[9; 32]);
        let public = key.verifying_key();
        let envelope = sealed(&key, &Accumulator::fold(&leaf(1), &leaf(2)));
        assert!(check_envelope(&public, &envelope));

        let other = VerifyingKey::from_seed(&[8; 32]);
        assert!(!check_envelope(&other, &envelope));

        let mut tampered = envelope.clone();
        tampered.expires_at += 1;
        assert!(!check_envelope(&public, &tampered));

        let mut tampered = envelope;
        tampered.accumulator[0] ^= 1;
        assert!(!check_envelope(&public, &tampered));
    }

    #[test]
    fn published_key_cannot_reseal() {
        let key = SealingKey::from_seed(&[9; 32]);
        let public = key.verifying_key();
        let acc = Accumulator::fold(&leaf(1), &leaf(2));
        let mut envelope = sealed(&key, &acc);
        envelope.statement_digest = [6; 32];
        let challenge = wrap_challenge(&envelope.statement_digest, &acc.digest());
        envelope.challenge = challenge;
        envelope.opening = wrap_opening(&challenge, &envelope.accumulator, &envelope.tree_root);

        // Everything an outsider can derive from the published key.
        let as_seed = SealingKey::from_seed(public.as_bytes());
        envelope.seal = as_seed.seal(&envelope.sealed_prefix());
        assert!(!check_envelope(&public, &envelope));

        let mut keyed = [0u8; SEAL_LEN];
        blake3::Hasher::new_keyed(public.as_bytes())
            .update(&envelope.sealed_prefix())
            .finalize_xof()
            .fill(&mut keyed);
        envelope.seal = keyed;
        assert!(!check_envelope(&public, &envelope));

        envelope.seal = key.seal(&envelope.sealed_prefix());
        assert!(check_envelope(&public, &envelope));
    }

    #[test]
    fn altered_public_key_never_verifies() {
        let key = SealingKey::from_seed(&[9; 32]);
        let envelope = sealed(&key, &leaf(1));
        let mut bytes = *key.verifying_key().as_bytes();
        bytes[31] ^= 0x80;
        assert!(!check_envelope(&VerifyingKey::from_bytes(bytes), &envelope));
    }
}
