use std::{env, net::SocketAddr, path::PathBuf};

use anyhow::{Context, Result};

use zkbo_common::{BackendConfig, PipelineConfig};

const LISTEN_ADDR_ENV: &str = "ZKBO_LISTEN_ADDR";
const SERVICE_API_KEY_ENV: &str = "ZKBO_SERVICE_API_KEY";
const HOLDINGS_PATH_ENV: &str = "ZKBO_HOLDINGS_PATH";
const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:3000";
const DEFAULT_HOLDINGS_PATH: &str = "config/holdings.json";

#[derive(Clone, Debug)]
pub struct ServiceConfig {
    pub listen_addr: SocketAddr,
    /// Bearer token required on every route but `/v1/status`. Unset means open.
    pub api_key: Option<String>,
    pub holdings_path: PathBuf,
    pub pipeline: PipelineConfig,
    pub backend: BackendConfig,
}

impl ServiceConfig {
    pub fn from_env() -> Result<Self> {
        let listen_addr = env::var(LISTEN_ADDR_ENV)
            .unwrap_or_else(|_| DEFAULT_LISTEN_ADDR.to_string())
            .parse()
            .context("invalid ZKBO_LISTEN_ADDR")?;
        let api_key = env::var(SERVICE_API_KEY_ENV)
            .ok()
            .filter(|key| !key.trim().is_empty());
        let holdings_path = env::var(HOLDINGS_PATH_ENV)
            .unwrap_or_else(|_| DEFAULT_HOLDINGS_PATH.to_string())
            .into();

        Ok(Self {
            listen_addr,
            api_key,
            holdings_path,
            pipeline: PipelineConfig::from_env()?,
            backend: BackendConfig::from_env()?,
        })
    }
}
