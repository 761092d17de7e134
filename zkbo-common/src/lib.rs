//! Shared data model for beneficial-ownership proofs: fixed-point fractions,
//! holding edges, the proof artifact, error taxonomy and configuration.

pub mod accumulator;
pub mod clock;
pub mod commitment;
pub mod config;
pub mod envelope;
pub mod error;
pub mod fraction;
pub mod proof;
pub mod types;

use anyhow::{anyhow, Context, Result};

pub use accumulator::{Accumulator, SealingKey, VerifyingKey};
pub use clock::{Clock, FixedClock, SystemClock};
pub use commitment::{commit, derive_blinding, Commitment, Transcript};
pub use config::{BackendConfig, Network, PipelineConfig, RetryPolicy};
pub use envelope::ProofEnvelope;
pub use error::{
    AdapterError, BackendError, ChainError, EnvelopeError, GraphResolutionError,
    ProofGenerationError, ProverError, RequestError, VerificationError, WitnessError,
};
pub use fraction::Fraction;
pub use proof::{Proof, PublicInputs, PublicStatement};
pub use types::{HoldingEdge, NodeId, ProofRequest, ProtocolKind, TerminalExposure};

/// Protocol version reported by the service and client.
pub const VERSION: &str = "1.1.0";
/// Serialized proof size, independent of graph depth.
pub const PROOF_SIZE_BYTES: usize = 312;
/// Gas consumed by one on-chain verification call.
pub const VERIFY_GAS: u64 = 62_000;
/// Deepest nesting a request may ask for.
pub const MAX_NESTING_DEPTH: u8 = 32;
pub const DEFAULT_MAX_DEPTH: u8 = MAX_NESTING_DEPTH;

pub fn hash_bytes_hex(bytes: &[u8]) -> String {
    blake3::hash(bytes).to_hex().to_string()
}

/// Parse a 32-byte value from hex, with or without a `0x` prefix.
pub fn parse_hex32(value: &str) -> Result<[u8; 32]> {
    let trimmed = value.trim();
    let digits = trimmed.strip_prefix("0x").unwrap_or(trimmed);
    let bytes = hex::decode(digits).context("invalid hex")?;
    bytes
        .try_into()
        .map_err(|bytes: Vec<u8>| anyhow!("expected 32 bytes, got {}", bytes.len()))
}

/// `u128` as a decimal string; JSON numbers lose precision above 2^53.
pub mod serde_u128 {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &u128, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&value.to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<u128, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Byte strings as `0x`-prefixed hex.
pub mod serde_hex {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format!("0x{}", hex::encode(bytes)))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        let digits = s.strip_prefix("0x").unwrap_or(&s);
        hex::decode(digits).map_err(serde::de::Error::custom)
    }
}

pub mod serde_hex32 {
    use serde::{Deserializer, Serializer};

    pub fn serialize<S>(bytes: &[u8; 32], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        crate::serde_hex::serialize(bytes, serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<[u8; 32], D::Error>
    where
        D: Deserializer<'de>,
    {
        let vec = crate::serde_hex::deserialize(deserializer)?;
        vec.try_into().map_err(|vec: Vec<u8>| {
            serde::de::Error::custom(format!("expected 32 bytes, got {}", vec.len()))
        })
    }
}

pub mod serde_bytes_64 {
    use serde::{Deserializer, Serializer};

    pub fn serialize<S>(bytes: &[u8; 64], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        crate::serde_hex::serialize(bytes, serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<[u8; 64], D::Error>
    where
        D: Deserializer<'de>,
    {
        let vec = crate::serde_hex::deserialize(deserializer)?;
        if vec.len() != 64 {
            return Err(serde::de::Error::custom(format!(
                "expected 64 bytes, got {}",
                vec.len()
            )));
        }
        let mut arr = [0u8; 64];
        arr.copy_from_slice(&vec);
        Ok(arr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Wire {
        #[serde(with = "serde_u128")]
        amount: u128,
        #[serde(with = "serde_hex32")]
        digest: [u8; 32],
        #[serde(with = "serde_bytes_64")]
        accumulator: [u8; 64],
    }

    #[test]
    fn parse_hex32_accepts_prefix() {
        let hex = format!("0x{}", "ab".repeat(32));
        assert_eq!(parse_hex32(&hex).unwrap(), [0xab; 32]);
        assert_eq!(parse_hex32(&"ab".repeat(32)).unwrap(), [0xab; 32]);
        assert!(parse_hex32("0xabcd").is_err());
        assert!(parse_hex32("zz").is_err());
    }

    #[test]
    fn wire_helpers_survive_json() {
        let wire = Wire {
            amount: u128::MAX,
            digest: [9; 32],
            accumulator: [3; 64],
        };
        let json = serde_json::to_string(&wire).unwrap();
        assert!(json.contains(&u128::MAX.to_string()));
        assert_eq!(serde_json::from_str::<Wire>(&json).unwrap(), wire);
    }

    #[test]
    fn short_hex_array_is_rejected() {
        let json = format!(
            r#"{{"amount":"1","digest":"0x00","accumulator":"0x{}"}}"#,
            "00".repeat(64)
        );
        assert!(serde_json::from_str::<Wire>(&json).is_err());
    }

    #[test]
    fn hash_hex_is_blake3() {
        assert_eq!(hash_bytes_hex(b"").len(), 64);
    }
}
