//! Fixed-size binary proof envelope.
//!
//! Layout (big-endian integers), [`PROOF_SIZE_BYTES`] in total:
//!
//! ```text
//! 0..4      magic "ZKBO"
//! 4..8      version
//! 8..40     statement digest
//! 40..104   accumulator commitment
//! 104..136  fold tree root
//! 136..140  leaf count
//! 140       fold depth
//! 141       nesting depth
//! 142..144  reserved (zero)
//! 144..152  expires_at (unix seconds)
//! 152..184  wrap challenge
//! 184..248  opening
//! 248..312  Ed25519 seal over bytes 0..248
//! ```

use crate::error::EnvelopeError;
use crate::PROOF_SIZE_BYTES;

pub const ENVELOPE_MAGIC: [u8; 4] = *b"ZKBO";
pub const ENVELOPE_VERSION: u32 = 1;
/// Bytes covered by the seal.
pub const SEALED_PREFIX_LEN: usize = 248;
pub const OPENING_LEN: usize = 64;
pub const SEAL_LEN: usize = 64;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProofEnvelope {
    pub statement_digest: [u8; 32],
    pub accumulator: [u8; 64],
    pub tree_root: [u8; 32],
    pub leaf_count: u32,
    pub fold_depth: u8,
    pub nesting_depth: u8,
    pub expires_at: i64,
    pub challenge: [u8; 32],
    pub opening: [u8; OPENING_LEN],
    pub seal: [u8; SEAL_LEN],
}

impl ProofEnvelope {
    pub fn encode(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(PROOF_SIZE_BYTES);
        bytes.extend_from_slice(&ENVELOPE_MAGIC);
        bytes.extend_from_slice(&ENVELOPE_VERSION.to_be_bytes());
        bytes.extend_from_slice(&self.statement_digest);
        bytes.extend_from_slice(&self.accumulator);
        bytes.extend_from_slice(&self.tree_root);
        bytes.extend_from_slice(&self.leaf_count.to_be_bytes());
        bytes.push(self.fold_depth);
        bytes.push(self.nesting_depth);
        bytes.extend_from_slice(&[0u8; 2]);
        bytes.extend_from_slice(&self.expires_at.to_be_bytes());
        bytes.extend_from_slice(&self.challenge);
        bytes.extend_from_slice(&self.opening);
        bytes.extend_from_slice(&self.seal);
        debug_assert_eq!(bytes.len(), PROOF_SIZE_BYTES);
        bytes
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, EnvelopeError> {
        if bytes.len() != PROOF_SIZE_BYTES {
            return Err(EnvelopeError::WrongLength {
                expected: PROOF_SIZE_BYTES,
                actual: bytes.len(),
            });
        }
        if bytes[0..4] != ENVELOPE_MAGIC {
            return Err(EnvelopeError::BadMagic);
        }
        let version = u32::from_be_bytes(array(&bytes[4..8]));
        if version != ENVELOPE_VERSION {
            return Err(EnvelopeError::UnsupportedVersion(version));
        }
        if bytes[142..144] != [0u8; 2] {
            return Err(EnvelopeError::NonZeroReserved);
        }

        Ok(Self {
            statement_digest: array(&bytes[8..40]),
            accumulator: array(&bytes[40..104]),
            tree_root: array(&bytes[104..136]),
            leaf_count: u32::from_be_bytes(array(&bytes[136..140])),
            fold_depth: bytes[140],
            nesting_depth: bytes[141],
            expires_at: i64::from_be_bytes(array(&bytes[144..152])),
            challenge: array(&bytes[152..184]),
            opening: array(&bytes[184..248]),
            seal: array(&bytes[248..312]),
        })
    }

    /// Encoded bytes the seal is computed over.
    pub fn sealed_prefix(&self) -> Vec<u8> {
        let mut bytes = self.encode();
        bytes.truncate(SEALED_PREFIX_LEN);
        bytes
    }
}

// Callers pass slices whose length is fixed by the layout above.
fn array<const N: usize>(slice: &[u8]) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(slice);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ProofEnvelope {
        ProofEnvelope {
            statement_digest: [1; 32],
            accumulator: [2; 64],
            tree_root: [3; 32],
            leaf_count: 7,
            fold_depth: 3,
            nesting_depth: 2,
            expires_at: 1_767_225_600,
            challenge: [4; 32],
            opening: [5; OPENING_LEN],
            seal: [6; SEAL_LEN],
        }
    }

    #[test]
    fn encoded_size_is_fixed() {
        let bytes = sample().encode();
        assert_eq!(bytes.len(), PROOF_SIZE_BYTES);
        assert_eq!(ProofEnvelope::decode(&bytes).unwrap(), sample());
    }

    #[test]
    fn rejects_wrong_shape() {
        let mut bytes = sample().encode();
        assert_eq!(
            ProofEnvelope::decode(&bytes[..10]),
            Err(EnvelopeError::WrongLength {
                expected: PROOF_SIZE_BYTES,
                actual: 10
            })
        );

        bytes[0] = b'X';
        assert_eq!(ProofEnvelope::decode(&bytes), Err(EnvelopeError::BadMagic));

        let mut bytes = sample().encode();
        bytes[7] = 9;
        assert_eq!(
            ProofEnvelope::decode(&bytes),
            Err(EnvelopeError::UnsupportedVersion(9))
        );

        let mut bytes = sample().encode();
        bytes[143] = 1;
        assert_eq!(
            ProofEnvelope::decode(&bytes),
            Err(EnvelopeError::NonZeroReserved)
        );
    }

    #[test]
    fn sealed_prefix_excludes_seal() {
        let envelope = sample();
        let prefix = envelope.sealed_prefix();
        assert_eq!(prefix.len(), SEALED_PREFIX_LEN);
        assert_eq!(&envelope.encode()[..SEALED_PREFIX_LEN], prefix.as_slice());
    }
}
