//! Verification side of beneficial-ownership proofs: the expiry policy shared
//! with the prover, a local verifier and an adapter for on-chain routines.

pub mod crypto;
pub mod expiry;
pub mod local;
pub mod onchain;

pub use crypto::{CryptoVerifier, DigestCryptoVerifier};
pub use expiry::ExpiryPolicy;
pub use local::{LocalVerifier, VerificationOutcome, VerifierError};
pub use onchain::{
    ChainCall, ChainReceipt, ChainStatus, ChainVerifier, OnChainVerdict, OnChainVerifierAdapter,
    SimulatedChainVerifier,
};

#[cfg(test)]
pub(crate) mod testing {
    use chrono::{Duration, TimeZone, Utc};
    use zkbo_common::accumulator::{wrap_challenge, wrap_opening};
    use zkbo_common::envelope::SEAL_LEN;
    use zkbo_common::{
        Accumulator, Fraction, Network, Proof, ProofEnvelope, ProtocolKind, PublicStatement,
        SealingKey, TerminalExposure, VERIFY_GAS,
    };

    pub const TEST_SEED: [u8; 32] = [0x11; 32];

    pub fn statement() -> PublicStatement {
        let generated_at = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        PublicStatement {
            wallet: "0xwallet".into(),
            network: Network::Mainnet,
            as_of: generated_at - Duration::hours(1),
            nesting_depth: 2,
            protocols_traversed: vec![ProtocolKind::Vault, ProtocolKind::Vault],
            exposures: vec![
                TerminalExposure {
                    asset: "ETH".into(),
                    amount: 200,
                    fraction: Fraction::from_bps(2_000),
                },
                TerminalExposure {
                    asset: "USDC".into(),
                    amount: 800,
                    fraction: Fraction::from_bps(8_000),
                },
            ],
            leaf_count: 3,
            generated_at,
            expires_at: generated_at + Duration::hours(6),
        }
    }

    /// Seal `statement` over three leaves the way the local backend does.
    pub fn sealed_proof(seed: &[u8; 32], statement: PublicStatement) -> Proof {
        let key = SealingKey::from_seed(seed);
        let leaf = |byte: u8| Accumulator::leaf(&[byte; 32], 0, 0);
        let acc = Accumulator::fold(&Accumulator::fold(&leaf(1), &leaf(2)), &leaf(3));

        let statement_digest = statement.digest();
        let challenge = wrap_challenge(&statement_digest, &acc.digest());
        let mut envelope = ProofEnvelope {
            statement_digest,
            accumulator: acc.commitment,
            tree_root: acc.root,
            leaf_count: acc.leaf_count,
            fold_depth: acc.depth,
            nesting_depth: statement.nesting_depth,
            expires_at: statement.expires_at.timestamp(),
            challenge,
            opening: wrap_opening(&challenge, &acc.commitment, &acc.root),
            seal: [0; SEAL_LEN],
        };
        envelope.seal = key.seal(&envelope.sealed_prefix());
        Proof::new(statement, envelope.encode(), VERIFY_GAS)
    }

    pub fn sample_proof() -> Proof {
        sealed_proof(&TEST_SEED, statement())
    }
}
