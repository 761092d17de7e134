//! Error taxonomy for the proving and verification pipeline.
//!
//! Edge-scoped resolution errors are absorbed into residual exposure; witness
//! and proof-generation errors abort a request; verification never fails for
//! an invalid proof, it reports a [`VerificationError`] reason instead.

use thiserror::Error;

use crate::fraction::Fraction;
use crate::types::{NodeId, ProtocolKind};

/// Request validation, checked before any resolution work starts.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RequestError {
    #[error("max_depth {requested} outside 1..={max}")]
    DepthOutOfRange { requested: u32, max: u8 },

    #[error("wallet identifier is empty")]
    EmptyWallet,
}

/// Failure reported by a protocol adapter.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AdapterError {
    /// Network hiccup or rate limit; worth retrying.
    #[error("transient adapter failure: {0}")]
    Transient(String),

    #[error("adapter failure: {0}")]
    Permanent(String),
}

impl AdapterError {
    pub fn is_transient(&self) -> bool {
        matches!(self, AdapterError::Transient(_))
    }
}

/// Edge-scoped resolution failure. Never fatal for the request.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GraphResolutionError {
    #[error("no adapter for protocol {protocol} on edge {holder} -> {target}")]
    UnknownProtocol {
        holder: NodeId,
        target: NodeId,
        protocol: ProtocolKind,
    },

    #[error("{protocol} adapter failed for {node}: {source}")]
    AdapterFailed {
        node: NodeId,
        protocol: ProtocolKind,
        #[source]
        source: AdapterError,
    },

    #[error("{protocol} adapter timed out for {node} after {timeout_ms}ms")]
    AdapterTimeout {
        node: NodeId,
        protocol: ProtocolKind,
        timeout_ms: u64,
    },

    #[error("malformed edge reported for {node}: {reason}")]
    MalformedEdge { node: NodeId, reason: String },
}

impl GraphResolutionError {
    /// Node whose expansion produced this error.
    pub fn node(&self) -> &NodeId {
        match self {
            GraphResolutionError::UnknownProtocol { holder, .. } => holder,
            GraphResolutionError::AdapterFailed { node, .. }
            | GraphResolutionError::AdapterTimeout { node, .. }
            | GraphResolutionError::MalformedEdge { node, .. } => node,
        }
    }
}

/// Adapter data that violates its own protocol invariants.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WitnessError {
    #[error("share {share:?} of edge {holder} -> {target} is outside (0, 1]")]
    ShareOutOfRange {
        holder: NodeId,
        target: NodeId,
        share: Fraction,
    },

    #[error("outgoing shares of {node} sum to {total}, above 100%")]
    OverAllocated { node: NodeId, total: Fraction },

    #[error("exposure step into {target} at depth {depth} is not parent x share")]
    ArithmeticMismatch { target: NodeId, depth: u8 },

    #[error("ownership graph unfolds into more than {limit} traversal steps")]
    TraversalTooLarge { limit: usize },

    #[error("witness building was cancelled")]
    Cancelled,
}

/// Failure reported by a proving backend.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BackendError {
    /// Timeouts and unavailable provers; retried with backoff.
    #[error("transient proving failure: {0}")]
    Transient(String),

    #[error("proving failure: {0}")]
    Permanent(String),
}

impl BackendError {
    pub fn is_transient(&self) -> bool {
        matches!(self, BackendError::Transient(_))
    }
}

/// Fatal composition failure. Partial proofs are never emitted.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProofGenerationError {
    #[error("no traversal steps to prove")]
    NoLeaves,

    #[error("leaf {index} failed after {attempts} attempt(s): {source}")]
    Leaf {
        index: usize,
        attempts: u32,
        #[source]
        source: BackendError,
    },

    #[error("folding leaves {start}..{end} failed: {source}")]
    Fold {
        start: usize,
        end: usize,
        #[source]
        source: BackendError,
    },

    #[error("wrapping the root proof failed: {0}")]
    Wrap(#[source] BackendError),

    #[error("backend produced an invalid envelope: {0}")]
    Envelope(#[from] EnvelopeError),
}

/// Decoding failures of the fixed-size proof envelope.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EnvelopeError {
    #[error("envelope is {actual} bytes, expected {expected}")]
    WrongLength { expected: usize, actual: usize },

    #[error("envelope magic mismatch")]
    BadMagic,

    #[error("unsupported envelope version {0}")]
    UnsupportedVersion(u32),

    #[error("reserved envelope bytes are not zero")]
    NonZeroReserved,
}

/// Reason a proof was judged invalid. Reported, never thrown.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum VerificationError {
    #[error("malformed proof: {0}")]
    Malformed(#[from] EnvelopeError),

    #[error("proof expired")]
    Expired,

    #[error("public metadata inconsistent: {0}")]
    InconsistentMetadata(String),

    #[error("statement digest does not match the committed public inputs")]
    StatementMismatch,

    #[error("no cryptographic verification primitive configured")]
    NoVerificationPrimitive,

    #[error("cryptographic check rejected the proof")]
    CryptoRejected,

    #[error("verification consumed {consumed} units, budget is {budget}")]
    BudgetExceeded { budget: u64, consumed: u64 },
}

impl VerificationError {
    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            VerificationError::Malformed(_) => "PROOF_MALFORMED",
            VerificationError::Expired => "PROOF_EXPIRED",
            VerificationError::InconsistentMetadata(_) => "METADATA_INCONSISTENT",
            VerificationError::StatementMismatch => "PUBLIC_INPUTS_MISMATCH",
            VerificationError::NoVerificationPrimitive => "VERIFIER_UNAVAILABLE",
            VerificationError::CryptoRejected => "PROOF_INVALID",
            VerificationError::BudgetExceeded { .. } => "BUDGET_EXCEEDED",
        }
    }
}

/// Could not talk to the on-chain verification routine. Distinct from a
/// rejection: the proof was not checked.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ChainError {
    #[error("chain transport error: {0}")]
    Transport(String),

    #[error("chain call timed out after {0}ms")]
    Timeout(u64),

    #[error("unexpected chain response: {0}")]
    InvalidResponse(String),
}

/// Top-level failure of a proof-generation request.
#[derive(Debug, Error)]
pub enum ProverError {
    #[error("invalid request: {0}")]
    Request(#[from] RequestError),

    #[error("witness error: {0}")]
    Witness(#[from] WitnessError),

    #[error("proof generation error: {0}")]
    ProofGeneration(#[from] ProofGenerationError),
}
