//! JSON bodies of the remote proving contract (`/v1/prove-leaf`, `/v1/fold`,
//! `/v1/wrap`, `/v1/verifying-key`).

use serde::{Deserialize, Serialize};

use zkbo_common::{PublicStatement, VerifyingKey};

use crate::backend::NodeProof;
use crate::witness::{LeafPublicInput, PrivateWitness};

pub const PROVE_LEAF_PATH: &str = "/v1/prove-leaf";
pub const FOLD_PATH: &str = "/v1/fold";
pub const WRAP_PATH: &str = "/v1/wrap";
pub const VERIFYING_KEY_PATH: &str = "/v1/verifying-key";

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProveLeafRequest {
    pub public: LeafPublicInput,
    pub witness: PrivateWitness,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FoldRequest {
    pub left: NodeProof,
    pub right: NodeProof,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WrapRequest {
    pub root: NodeProof,
    pub statement: PublicStatement,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WrapResponse {
    #[serde(with = "zkbo_common::serde_hex")]
    pub envelope: Vec<u8>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct VerifyingKeyResponse {
    pub verifying_key: VerifyingKey,
    pub fingerprint: String,
}

/// Error body returned by the service for any non-2xx status.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub error_code: String,
}
