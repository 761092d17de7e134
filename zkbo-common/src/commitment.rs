//! Domain-separated BLAKE3 commitments and transcripts.

use std::fmt;

use serde::{Deserialize, Serialize};

pub const DOMAIN_SHARE: &str = "zkbo 2026 share commitment v1";
pub const DOMAIN_ASSET: &str = "zkbo 2026 asset commitment v1";
pub const DOMAIN_EXPOSURE: &str = "zkbo 2026 exposure commitment v1";
pub const DOMAIN_WALLET: &str = "zkbo 2026 wallet commitment v1";
pub const DOMAIN_BLINDING: &str = "zkbo 2026 witness blinding v1";
pub const DOMAIN_STATEMENT: &str = "zkbo 2026 public statement v1";
pub const DOMAIN_LEAF: &str = "zkbo 2026 leaf public input v1";

/// Hiding commitment to a private value.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Commitment(#[serde(with = "crate::serde_hex32")] [u8; 32]);

impl Commitment {
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Debug for Commitment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Commitment(0x{})", hex::encode(&self.0[..8]))
    }
}

/// Commit to `payload` under `domain` with a 32-byte blinding factor.
pub fn commit(domain: &str, payload: &[u8], blinding: &[u8; 32]) -> Commitment {
    let mut hasher = blake3::Hasher::new_derive_key(domain);
    hasher.update(blinding);
    hasher.update(&(payload.len() as u64).to_le_bytes());
    hasher.update(payload);
    Commitment(*hasher.finalize().as_bytes())
}

/// Deterministic blinding factor for one committed value of one step.
pub fn derive_blinding(seed: &[u8; 32], label: &str, step: &[u8; 32]) -> [u8; 32] {
    let mut hasher = blake3::Hasher::new_derive_key(DOMAIN_BLINDING);
    hasher.update(seed);
    hasher.update(&(label.len() as u64).to_le_bytes());
    hasher.update(label.as_bytes());
    hasher.update(step);
    *hasher.finalize().as_bytes()
}

/// Length-prefixed absorb-only transcript over BLAKE3.
#[derive(Clone)]
pub struct Transcript {
    hasher: blake3::Hasher,
}

impl Transcript {
    pub fn new(domain: &str) -> Self {
        Self {
            hasher: blake3::Hasher::new_derive_key(domain),
        }
    }

    pub fn append_bytes(&mut self, bytes: &[u8]) -> &mut Self {
        self.hasher.update(&(bytes.len() as u64).to_le_bytes());
        self.hasher.update(bytes);
        self
    }

    pub fn append_str(&mut self, value: &str) -> &mut Self {
        self.append_bytes(value.as_bytes())
    }

    pub fn append_u64(&mut self, value: u64) -> &mut Self {
        self.hasher.update(&value.to_le_bytes());
        self
    }

    pub fn append_i64(&mut self, value: i64) -> &mut Self {
        self.hasher.update(&value.to_le_bytes());
        self
    }

    pub fn append_u128(&mut self, value: u128) -> &mut Self {
        self.hasher.update(&value.to_le_bytes());
        self
    }

    pub fn finalize(&self) -> [u8; 32] {
        *self.hasher.finalize().as_bytes()
    }

    pub fn finalize_into(&self, out: &mut [u8]) {
        self.hasher.finalize_xof().fill(out);
    }
}
