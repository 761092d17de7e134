//! HTTP service around the proving pipeline.
//!
//! `/v1/prove` and `/v1/verify` serve end users; `/v1/prove-leaf`, `/v1/fold`,
//! `/v1/wrap` and `/v1/verifying-key` expose the proving backend itself so
//! other provers can point their remote backend at this service.

pub mod config;
pub mod snapshot;

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    extract::{Request, State},
    http::{header, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use zkbo_common::{
    BackendError, Clock, ProofGenerationError, ProofRequest, ProverError, RequestError,
    SystemClock, MAX_NESTING_DEPTH, PROOF_SIZE_BYTES, VERIFY_GAS, VERSION,
};
use zkbo_prover::wire::{
    ErrorBody, FoldRequest, ProveLeafRequest, VerifyingKeyResponse, WrapRequest, WrapResponse,
    FOLD_PATH, PROVE_LEAF_PATH, VERIFYING_KEY_PATH, WRAP_PATH,
};
use zkbo_prover::{
    backend_from_config, standard_protocols, AdapterRegistry, NodeProof, ProofPipeline,
};
use zkbo_verifier::{ExpiryPolicy, LocalVerifier};

pub use config::ServiceConfig;
pub use snapshot::{Snapshot, SnapshotAdapter, SnapshotEntry};

pub const PROVE_PATH: &str = "/v1/prove";
pub const VERIFY_PATH: &str = "/v1/verify";
pub const STATUS_PATH: &str = "/v1/status";

const CODE_REQUEST_INVALID: &str = "REQUEST_INVALID";
const CODE_WITNESS_INVALID: &str = "WITNESS_INVALID";
const CODE_PROOF_GENERATION: &str = "PROOF_GENERATION_FAILED";
const CODE_BACKEND_UNAVAILABLE: &str = "BACKEND_UNAVAILABLE";
const CODE_BACKEND_REJECTED: &str = "BACKEND_REJECTED";
const CODE_PROOF_MALFORMED: &str = "PROOF_MALFORMED";
const CODE_UNAUTHORIZED: &str = "UNAUTHORIZED";

#[derive(Clone)]
pub struct AppState {
    pipeline: Arc<ProofPipeline>,
    verifier: Arc<LocalVerifier>,
    clock: Arc<dyn Clock>,
    api_key_hash: Option<blake3::Hash>,
}

impl AppState {
    pub fn new(pipeline: ProofPipeline, verifier: LocalVerifier, clock: Arc<dyn Clock>) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
            verifier: Arc::new(verifier),
            clock,
            api_key_hash: None,
        }
    }

    /// Require `Authorization: Bearer <key>` on every route but the status one.
    pub fn with_api_key(mut self, key: &str) -> Self {
        self.api_key_hash = Some(blake3::hash(key.as_bytes()));
        self
    }

    /// Wire the pipeline to the holdings snapshot and the configured backend.
    pub async fn from_config(config: &ServiceConfig) -> Result<Self> {
        let adapter = Arc::new(SnapshotAdapter::load(&config.holdings_path)?);
        let registry = AdapterRegistry::new().with_all(standard_protocols(), adapter);
        let backend = backend_from_config(&config.backend)?;
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let expiry = ExpiryPolicy::from_config(&config.pipeline);

        let verifier = match backend.verifying_key().await {
            Ok(key) => {
                info!("verifying with key {}", key.fingerprint());
                LocalVerifier::for_key(key, expiry, clock.clone())
            }
            Err(err) => {
                warn!("no verifying key from {} backend: {}", backend.name(), err);
                LocalVerifier::new(expiry, clock.clone())
            }
        };

        let pipeline = ProofPipeline::new(
            config.pipeline.clone(),
            Arc::new(registry),
            backend,
            clock.clone(),
        );
        let state = Self::new(pipeline, verifier, clock);
        Ok(match &config.api_key {
            Some(key) => state.with_api_key(key),
            None => state,
        })
    }

    pub fn pipeline(&self) -> &ProofPipeline {
        &self.pipeline
    }

    pub fn verifier(&self) -> &LocalVerifier {
        &self.verifier
    }
}

#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
        }
    }

    fn bad_request(code: &'static str, message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, code, message)
    }

    fn unauthorized() -> Self {
        Self::new(
            StatusCode::UNAUTHORIZED,
            CODE_UNAUTHORIZED,
            "missing or invalid bearer token",
        )
    }
}

impl From<BackendError> for ApiError {
    fn from(err: BackendError) -> Self {
        match err {
            BackendError::Transient(_) => Self::new(
                StatusCode::SERVICE_UNAVAILABLE,
                CODE_BACKEND_UNAVAILABLE,
                err.to_string(),
            ),
            BackendError::Permanent(_) => Self::new(
                StatusCode::UNPROCESSABLE_ENTITY,
                CODE_BACKEND_REJECTED,
                err.to_string(),
            ),
        }
    }
}

impl From<ProverError> for ApiError {
    fn from(err: ProverError) -> Self {
        let message = err.to_string();
        match err {
            ProverError::Request(_) => Self::bad_request(CODE_REQUEST_INVALID, message),
            ProverError::Witness(_) => {
                Self::new(StatusCode::UNPROCESSABLE_ENTITY, CODE_WITNESS_INVALID, message)
            }
            ProverError::ProofGeneration(inner) => {
                let transient = match &inner {
                    ProofGenerationError::Leaf { source, .. }
                    | ProofGenerationError::Fold { source, .. }
                    | ProofGenerationError::Wrap(source) => source.is_transient(),
                    ProofGenerationError::NoLeaves | ProofGenerationError::Envelope(_) => false,
                };
                if transient {
                    Self::new(
                        StatusCode::SERVICE_UNAVAILABLE,
                        CODE_BACKEND_UNAVAILABLE,
                        message,
                    )
                } else {
                    Self::new(
                        StatusCode::INTERNAL_SERVER_ERROR,
                        CODE_PROOF_GENERATION,
                        message,
                    )
                }
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: self.message,
            error_code: self.code.to_string(),
        };
        (self.status, Json(body)).into_response()
    }
}

pub async fn serve(config: ServiceConfig) -> Result<()> {
    let state = AppState::from_config(&config).await?;
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = app_router(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http());
    let listener = TcpListener::bind(config.listen_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.listen_addr))?;
    info!("listening on {}", config.listen_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!("failed to install CTRL+C handler: {}", err);
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}

pub fn app_router(state: AppState) -> Router {
    let protected = Router::new()
        .route(PROVE_PATH, post(prove_handler))
        .route(VERIFY_PATH, post(verify_handler))
        .route(PROVE_LEAF_PATH, post(prove_leaf_handler))
        .route(FOLD_PATH, post(fold_handler))
        .route(WRAP_PATH, post(wrap_handler))
        .route(VERIFYING_KEY_PATH, get(verifying_key_handler))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_api_key,
        ));

    Router::new()
        .route(STATUS_PATH, get(status_handler))
        .merge(protected)
        .with_state(state)
}

async fn require_api_key(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if let Some(expected) = state.api_key_hash {
        let presented = request
            .headers()
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "));
        // blake3::Hash compares in constant time.
        let authorized = presented
            .map(|token| blake3::hash(token.trim().as_bytes()) == expected)
            .unwrap_or(false);
        if !authorized {
            return Err(ApiError::unauthorized());
        }
    }
    Ok(next.run(request).await)
}

#[derive(Debug, Deserialize)]
struct ProveRequestBody {
    wallet: String,
    /// Defaults to the current time.
    #[serde(default)]
    as_of: Option<DateTime<Utc>>,
    /// Wider than the pipeline's depth type so oversized values reach
    /// validation instead of failing deserialization.
    #[serde(default)]
    max_depth: Option<u32>,
}

#[derive(Serialize)]
struct ProveResponse {
    proof: zkbo_common::Proof,
    proving_time_ms: u64,
    residual_percentage: f64,
    /// Edges that could not be resolved and were left in the residual.
    resolution_errors: Vec<String>,
}

async fn prove_handler(
    State(state): State<AppState>,
    Json(req): Json<ProveRequestBody>,
) -> Result<Json<ProveResponse>, ApiError> {
    let as_of = req.as_of.unwrap_or_else(|| state.clock.now());
    let max_depth = match req.max_depth {
        None => state.pipeline.config().default_max_depth,
        Some(depth) => u8::try_from(depth).map_err(|_| {
            ProverError::Request(RequestError::DepthOutOfRange {
                requested: depth,
                max: MAX_NESTING_DEPTH,
            })
        })?,
    };
    let request = ProofRequest::new(req.wallet, as_of).with_max_depth(max_depth);

    let report = state.pipeline.prove(&request).await?;
    Ok(Json(ProveResponse {
        resolution_errors: report
            .resolution_errors
            .iter()
            .map(ToString::to_string)
            .collect(),
        proof: report.proof,
        proving_time_ms: report.proving_time_ms,
        residual_percentage: report.residual_percentage,
    }))
}

#[derive(Deserialize)]
struct VerifyRequest {
    proof: serde_json::Value,
}

#[derive(Debug, Serialize)]
struct VerifyResponse {
    valid: bool,
    error: Option<String>,
    error_code: Option<&'static str>,
}

impl VerifyResponse {
    fn success() -> Self {
        Self {
            valid: true,
            error: None,
            error_code: None,
        }
    }

    fn failure(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            valid: false,
            error: Some(message.into()),
            error_code: Some(code),
        }
    }
}

async fn verify_handler(
    State(state): State<AppState>,
    Json(req): Json<VerifyRequest>,
) -> Json<VerifyResponse> {
    let proof = match serde_json::from_value::<zkbo_common::Proof>(req.proof) {
        Ok(proof) => proof,
        Err(err) => {
            return Json(VerifyResponse::failure(
                CODE_PROOF_MALFORMED,
                format!("proof does not parse: {}", err),
            ))
        }
    };
    let outcome = state.verifier.check(&proof);
    Json(match outcome.error {
        None => VerifyResponse::success(),
        Some(error) => VerifyResponse::failure(error.code(), error.to_string()),
    })
}

async fn prove_leaf_handler(
    State(state): State<AppState>,
    Json(req): Json<ProveLeafRequest>,
) -> Result<Json<NodeProof>, ApiError> {
    let proof = state
        .pipeline
        .backend()
        .prove_leaf(&req.public, &req.witness)
        .await?;
    Ok(Json(proof))
}

async fn fold_handler(
    State(state): State<AppState>,
    Json(req): Json<FoldRequest>,
) -> Result<Json<NodeProof>, ApiError> {
    let proof = state
        .pipeline
        .backend()
        .fold_proofs(&req.left, &req.right)
        .await?;
    Ok(Json(proof))
}

async fn wrap_handler(
    State(state): State<AppState>,
    Json(req): Json<WrapRequest>,
) -> Result<Json<WrapResponse>, ApiError> {
    let envelope = state
        .pipeline
        .backend()
        .wrap(&req.root, &req.statement)
        .await?;
    Ok(Json(WrapResponse { envelope }))
}

async fn verifying_key_handler(
    State(state): State<AppState>,
) -> Result<Json<VerifyingKeyResponse>, ApiError> {
    let verifying_key = state.pipeline.backend().verifying_key().await?;
    Ok(Json(VerifyingKeyResponse {
        fingerprint: verifying_key.fingerprint(),
        verifying_key,
    }))
}

#[derive(Debug, Serialize)]
struct StatusResponse {
    version: &'static str,
    network: String,
    backend: &'static str,
    max_nesting_depth: u8,
    default_max_depth: u8,
    proof_size_bytes: usize,
    verification_cost: u64,
    validity_window_secs: i64,
    verifying_key_fingerprint: Option<String>,
}

async fn status_handler(State(state): State<AppState>) -> Json<StatusResponse> {
    let config = state.pipeline.config();
    Json(StatusResponse {
        version: VERSION,
        network: config.network.to_string(),
        backend: state.pipeline.backend().name(),
        max_nesting_depth: MAX_NESTING_DEPTH,
        default_max_depth: config.default_max_depth,
        proof_size_bytes: PROOF_SIZE_BYTES,
        verification_cost: VERIFY_GAS,
        validity_window_secs: state.pipeline.expiry().window().num_seconds(),
        verifying_key_fingerprint: state.verifier.verifying_key().map(|key| key.fingerprint()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use zkbo_common::EnvelopeError;

    #[test]
    fn prover_errors_map_to_statuses() {
        let err = ApiError::from(ProverError::Request(RequestError::EmptyWallet));
        assert_eq!(err.status, StatusCode::BAD_REQUEST);

        let busy = ProverError::ProofGeneration(ProofGenerationError::Wrap(
            BackendError::Transient("busy".into()),
        ));
        assert_eq!(ApiError::from(busy).status, StatusCode::SERVICE_UNAVAILABLE);

        let broken = ProverError::ProofGeneration(ProofGenerationError::Envelope(
            EnvelopeError::BadMagic,
        ));
        let err = ApiError::from(broken);
        assert_eq!(err.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.code, CODE_PROOF_GENERATION);
    }

    #[test]
    fn backend_errors_split_by_retryability() {
        let err = ApiError::from(BackendError::Permanent("bad witness".into()));
        assert_eq!(err.status, StatusCode::UNPROCESSABLE_ENTITY);
        let err = ApiError::from(BackendError::Transient("overloaded".into()));
        assert_eq!(err.status, StatusCode::SERVICE_UNAVAILABLE);
    }
}
