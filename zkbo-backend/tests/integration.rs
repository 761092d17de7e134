use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::{self, Body},
    http::{header, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tower::util::ServiceExt;

use zkbo_backend::{app_router, AppState};
use zkbo_common::{PipelineConfig, VerifyingKey, PROOF_SIZE_BYTES};
use zkbo_prover::{ProvingBackend, RemoteProvingBackend};
use zkbo_test_fixtures::{as_of, clock, two_vault, KEY_SEED, WALLET};
use zkbo_verifier::{ExpiryPolicy, LocalVerifier};

const BODY_LIMIT: usize = usize::MAX;
const API_KEY: &str = "integration-secret";

fn test_state() -> AppState {
    let clock = Arc::new(clock());
    let verifier = LocalVerifier::for_key(
        VerifyingKey::from_seed(&KEY_SEED),
        ExpiryPolicy::default(),
        clock.clone(),
    );
    AppState::new(two_vault().pipeline(), verifier, clock)
}

fn test_app() -> Router {
    app_router(test_state())
}

fn post_json(uri: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(request).await.expect("response");
    let status = response.status();
    let bytes = body::to_bytes(response.into_body(), BODY_LIMIT)
        .await
        .expect("body bytes");
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

fn prove_body() -> Value {
    json!({ "wallet": WALLET, "as_of": as_of().to_rfc3339(), "max_depth": 2 })
}

#[tokio::test]
async fn prove_then_verify_round_trip() {
    let (status, proved) = send(test_app(), post_json("/v1/prove", &prove_body())).await;
    assert_eq!(status, StatusCode::OK, "{proved}");
    assert_eq!(proved["proof"]["nesting_depth"], 2);
    assert_eq!(proved["proof"]["leaf_count"], 5);
    assert_eq!(proved["residual_percentage"].as_f64(), Some(0.0));
    assert!(proved["resolution_errors"].as_array().unwrap().is_empty());

    let (status, verdict) = send(
        test_app(),
        post_json("/v1/verify", &json!({ "proof": proved["proof"] })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(verdict["valid"], true);
    assert_eq!(verdict["error_code"], Value::Null);
}

#[tokio::test]
async fn edited_metadata_is_reported_invalid() {
    let (_, proved) = send(test_app(), post_json("/v1/prove", &prove_body())).await;
    let mut proof = proved["proof"].clone();
    proof["nesting_depth"] = json!(3);

    let (status, verdict) =
        send(test_app(), post_json("/v1/verify", &json!({ "proof": proof }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(verdict["valid"], false);
    assert_eq!(verdict["error_code"], "METADATA_INCONSISTENT");
}

#[tokio::test]
async fn unparseable_proof_is_malformed_not_an_error() {
    let (status, verdict) = send(
        test_app(),
        post_json("/v1/verify", &json!({ "proof": { "wallet": 7 } })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(verdict["valid"], false);
    assert_eq!(verdict["error_code"], "PROOF_MALFORMED");
}

#[tokio::test]
async fn out_of_range_depth_is_a_bad_request() {
    let body = json!({ "wallet": WALLET, "as_of": as_of().to_rfc3339(), "max_depth": 33 });
    let (status, error) = send(test_app(), post_json("/v1/prove", &body)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(error["error_code"], "REQUEST_INVALID");
}

#[tokio::test]
async fn depth_beyond_a_byte_is_still_a_structured_bad_request() {
    let body = json!({ "wallet": WALLET, "as_of": as_of().to_rfc3339(), "max_depth": 300 });
    let (status, error) = send(test_app(), post_json("/v1/prove", &body)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(error["error_code"], "REQUEST_INVALID");
    assert!(error["error"].as_str().unwrap().contains("300"));
}

#[tokio::test]
async fn status_reports_constant_costs() {
    let request = Request::builder()
        .uri("/v1/status")
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(test_app(), request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["proof_size_bytes"], PROOF_SIZE_BYTES);
    assert_eq!(body["verification_cost"], 62_000);
    assert_eq!(body["max_nesting_depth"], 32);
    assert_eq!(body["backend"], "local");
    assert_eq!(
        body["verifying_key_fingerprint"],
        VerifyingKey::from_seed(&KEY_SEED).fingerprint()
    );
}

#[tokio::test]
async fn api_key_guards_everything_but_status() {
    let app = app_router(test_state().with_api_key(API_KEY));

    let (status, error) = send(app.clone(), post_json("/v1/prove", &prove_body())).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(error["error_code"], "UNAUTHORIZED");

    let status_request = Request::builder()
        .uri("/v1/status")
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(app.clone(), status_request).await;
    assert_eq!(status, StatusCode::OK);

    let mut authorized = post_json("/v1/prove", &prove_body());
    authorized.headers_mut().insert(
        header::AUTHORIZATION,
        format!("Bearer {}", API_KEY).parse().unwrap(),
    );
    let (status, _) = send(app, authorized).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn remote_backend_reproduces_local_proofs() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = app_router(test_state().with_api_key(API_KEY));
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let remote = RemoteProvingBackend::new(
        &format!("http://{}", addr),
        Some(API_KEY.to_string()),
        Duration::from_secs(10),
    )
    .unwrap();
    assert_eq!(
        remote.verifying_key().await.unwrap(),
        VerifyingKey::from_seed(&KEY_SEED)
    );

    let scenario = two_vault();
    let via_remote = scenario
        .pipeline_with(PipelineConfig::default(), Arc::new(remote), Arc::new(clock()))
        .prove(&scenario.request())
        .await
        .unwrap();
    let local = scenario.pipeline().prove(&scenario.request()).await.unwrap();
    assert_eq!(via_remote.proof.proof_data, local.proof.proof_data);
}

#[tokio::test]
async fn remote_backend_without_key_is_rejected_permanently() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = app_router(test_state().with_api_key(API_KEY));
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let remote =
        RemoteProvingBackend::new(&format!("http://{}", addr), None, Duration::from_secs(10))
            .unwrap();
    let err = remote.verifying_key().await.unwrap_err();
    assert!(!err.is_transient());
    assert!(err.to_string().contains("UNAUTHORIZED"));
}
