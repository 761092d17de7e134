//! The emitted proof artifact and the public statement it attests to.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::commitment::{Transcript, DOMAIN_STATEMENT};
use crate::config::Network;
use crate::envelope::ProofEnvelope;
use crate::error::EnvelopeError;
use crate::fraction::Fraction;
use crate::types::{NodeId, ProtocolKind, TerminalExposure};

/// Everything a verifier learns about the ownership graph.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicStatement {
    pub wallet: NodeId,
    pub network: Network,
    pub as_of: DateTime<Utc>,
    pub nesting_depth: u8,
    pub protocols_traversed: Vec<ProtocolKind>,
    pub exposures: Vec<TerminalExposure>,
    pub leaf_count: u32,
    pub generated_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl PublicStatement {
    /// Canonical digest committed inside the proof envelope.
    pub fn digest(&self) -> [u8; 32] {
        let mut transcript = Transcript::new(DOMAIN_STATEMENT);
        transcript
            .append_str(self.wallet.as_str())
            .append_bytes(&[self.network.id()])
            .append_i64(self.as_of.timestamp())
            .append_bytes(&[self.nesting_depth])
            .append_u64(self.protocols_traversed.len() as u64);
        for protocol in &self.protocols_traversed {
            transcript.append_str(protocol.tag());
        }
        transcript.append_u64(self.exposures.len() as u64);
        for exposure in &self.exposures {
            transcript
                .append_str(exposure.asset.as_str())
                .append_u128(exposure.amount)
                .append_u64(exposure.fraction.raw());
        }
        transcript
            .append_u64(u64::from(self.leaf_count))
            .append_i64(self.generated_at.timestamp())
            .append_i64(self.expires_at.timestamp());
        transcript.finalize()
    }

    pub fn public_inputs(&self) -> PublicInputs {
        PublicInputs {
            statement_digest: self.digest(),
            expires_at: self.expires_at.timestamp(),
        }
    }
}

/// Fixed-length public inputs handed to the cryptographic check.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicInputs {
    #[serde(with = "crate::serde_hex32")]
    pub statement_digest: [u8; 32],
    pub expires_at: i64,
}

impl PublicInputs {
    pub const WORDS: usize = 2;

    /// 32-byte words in calldata order; integers are right-aligned.
    pub fn to_words(&self) -> [[u8; 32]; Self::WORDS] {
        let mut expiry = [0u8; 32];
        expiry[24..].copy_from_slice(&self.expires_at.to_be_bytes());
        [self.statement_digest, expiry]
    }
}

/// A beneficial-ownership proof: opaque envelope bytes plus public metadata.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proof {
    #[serde(with = "crate::serde_hex")]
    pub proof_data: Vec<u8>,
    pub wallet: NodeId,
    pub network: Network,
    pub as_of: DateTime<Utc>,
    pub nesting_depth: u8,
    pub protocols_traversed: Vec<ProtocolKind>,
    pub exposures: Vec<TerminalExposure>,
    pub leaf_count: u32,
    pub generated_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    /// Resource units an on-chain check of this proof consumes.
    pub verification_cost: u64,
}

impl Proof {
    pub fn new(statement: PublicStatement, proof_data: Vec<u8>, verification_cost: u64) -> Self {
        Self {
            proof_data,
            wallet: statement.wallet,
            network: statement.network,
            as_of: statement.as_of,
            nesting_depth: statement.nesting_depth,
            protocols_traversed: statement.protocols_traversed,
            exposures: statement.exposures,
            leaf_count: statement.leaf_count,
            generated_at: statement.generated_at,
            expires_at: statement.expires_at,
            verification_cost,
        }
    }

    pub fn statement(&self) -> PublicStatement {
        PublicStatement {
            wallet: self.wallet.clone(),
            network: self.network,
            as_of: self.as_of,
            nesting_depth: self.nesting_depth,
            protocols_traversed: self.protocols_traversed.clone(),
            exposures: self.exposures.clone(),
            leaf_count: self.leaf_count,
            generated_at: self.generated_at,
            expires_at: self.expires_at,
        }
    }

    pub fn public_inputs(&self) -> PublicInputs {
        self.statement().public_inputs()
    }

    pub fn envelope(&self) -> Result<ProofEnvelope, EnvelopeError> {
        ProofEnvelope::decode(&self.proof_data)
    }

    /// Share of the root not attributed to any named asset.
    pub fn residual(&self) -> Fraction {
        let named = self
            .exposures
            .iter()
            .fold(Fraction::ZERO, |acc, e| acc.saturating_add(e.fraction));
        Fraction::ONE.saturating_sub(named)
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(json: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(json)
    }
}
