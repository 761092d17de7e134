//! HTTP client for a remote proving cluster.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use tracing::debug;

use zkbo_common::{BackendError, PublicStatement, VerifyingKey};

use crate::backend::{NodeProof, ProvingBackend};
use crate::wire::{
    ErrorBody, FoldRequest, ProveLeafRequest, VerifyingKeyResponse, WrapRequest, WrapResponse,
    FOLD_PATH, PROVE_LEAF_PATH, VERIFYING_KEY_PATH, WRAP_PATH,
};
use crate::witness::{LeafPublicInput, PrivateWitness};

#[derive(Clone)]
pub struct RemoteProvingBackend {
    base_url: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl RemoteProvingBackend {
    pub fn new(endpoint: &str, api_key: Option<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            base_url: endpoint.trim_end_matches('/').to_string(),
            api_key,
            client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn post<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, BackendError> {
        let request = self.client.post(self.url(path)).json(body);
        self.send(path, request).await
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, BackendError> {
        let request = self.client.get(self.url(path));
        self.send(path, request).await
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn send<T: DeserializeOwned>(
        &self,
        path: &str,
        mut request: reqwest::RequestBuilder,
    ) -> Result<T, BackendError> {
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }
        let response = request.send().await.map_err(classify_transport)?;
        let status = response.status();
        debug!("{} {} -> {}", self.base_url, path, status);

        if !status.is_success() {
            let detail = match response.json::<ErrorBody>().await {
                Ok(body) => format!("{} ({})", body.error, body.error_code),
                Err(_) => status.to_string(),
            };
            let message = format!("{} returned {}: {}", path, status, detail);
            return Err(if status.is_server_error() || status.as_u16() == 429 {
                BackendError::Transient(message)
            } else {
                BackendError::Permanent(message)
            });
        }

        response
            .json::<T>()
            .await
            .map_err(|e| BackendError::Permanent(format!("invalid response from {}: {}", path, e)))
    }
}

fn classify_transport(err: reqwest::Error) -> BackendError {
    if err.is_timeout() || err.is_connect() || err.is_request() {
        BackendError::Transient(err.to_string())
    } else {
        BackendError::Permanent(err.to_string())
    }
}

#[async_trait]
impl ProvingBackend for RemoteProvingBackend {
    fn name(&self) -> &'static str {
        "remote"
    }

    async fn prove_leaf(
        &self,
        public: &LeafPublicInput,
        witness: &PrivateWitness,
    ) -> Result<NodeProof, BackendError> {
        let body = ProveLeafRequest {
            public: public.clone(),
            witness: witness.clone(),
        };
        self.post(PROVE_LEAF_PATH, &body).await
    }

    async fn fold_proofs(
        &self,
        left: &NodeProof,
        right: &NodeProof,
    ) -> Result<NodeProof, BackendError> {
        let body = FoldRequest {
            left: left.clone(),
            right: right.clone(),
        };
        self.post(FOLD_PATH, &body).await
    }

    async fn wrap(
        &self,
        root: &NodeProof,
        statement: &PublicStatement,
    ) -> Result<Vec<u8>, BackendError> {
        let body = WrapRequest {
            root: root.clone(),
            statement: statement.clone(),
        };
        let response: WrapResponse = self.post(WRAP_PATH, &body).await?;
        Ok(response.envelope)
    }

    async fn verifying_key(&self) -> Result<VerifyingKey, BackendError> {
        let response: VerifyingKeyResponse = self.get(VERIFYING_KEY_PATH).await?;
        Ok(response.verifying_key)
    }
}
