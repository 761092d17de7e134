//! Immutable configuration threaded into every proof request.

use std::{env, fmt, str::FromStr, time::Duration};

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};

use crate::{DEFAULT_MAX_DEPTH, MAX_NESTING_DEPTH};

pub const DEFAULT_PROVER_ENDPOINT: &str = "https://prover.vonbit.co";
/// Development key seed for the in-process backend. Not for production use.
pub const DEV_KEY_SEED: [u8; 32] = *b"zkbo-local-backend-dev-seed-0001";

/// Upper bound on the configurable validity window (one year).
pub const MAX_VALIDITY_WINDOW_SECS: u64 = 365 * 24 * 60 * 60;

const NETWORK_ENV: &str = "ZKBO_NETWORK";
const MAX_DEPTH_ENV: &str = "ZKBO_MAX_DEPTH";
const RESOLVER_WORKERS_ENV: &str = "ZKBO_RESOLVER_WORKERS";
const ADAPTER_TIMEOUT_ENV: &str = "ZKBO_ADAPTER_TIMEOUT_MS";
const LEAF_TIMEOUT_ENV: &str = "ZKBO_LEAF_TIMEOUT_MS";
const VALIDITY_WINDOW_ENV: &str = "ZKBO_VALIDITY_WINDOW_SECS";
const MAX_ATTEMPTS_ENV: &str = "ZKBO_MAX_ATTEMPTS";
const PROVER_ENDPOINT_ENV: &str = "ZKBO_PROVER_ENDPOINT";
const API_KEY_ENV: &str = "ZKBO_API_KEY";
const KEY_SEED_ENV: &str = "ZKBO_KEY_SEED";

/// Chain whose state the proof attests to.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    #[default]
    Mainnet,
    Base,
    Arbitrum,
    Polygon,
}

impl Network {
    pub fn as_str(&self) -> &'static str {
        match self {
            Network::Mainnet => "mainnet",
            Network::Base => "base",
            Network::Arbitrum => "arbitrum",
            Network::Polygon => "polygon",
        }
    }

    /// Single-byte identifier used inside commitments.
    pub fn id(&self) -> u8 {
        match self {
            Network::Mainnet => 1,
            Network::Base => 2,
            Network::Arbitrum => 3,
            Network::Polygon => 4,
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Network {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mainnet" => Ok(Network::Mainnet),
            "base" => Ok(Network::Base),
            "arbitrum" => Ok(Network::Arbitrum),
            "polygon" => Ok(Network::Polygon),
            other => Err(anyhow!("unknown network '{}'", other)),
        }
    }
}

/// Bounded retry with exponential backoff for transient failures.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts including the first one.
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 50,
            max_backoff_ms: 2_000,
        }
    }
}

impl RetryPolicy {
    /// No retries at all.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            initial_backoff_ms: 0,
            max_backoff_ms: 0,
        }
    }

    /// Delay before attempt `attempt + 1`, where `attempt` starts at 1.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        let delay = self
            .initial_backoff_ms
            .saturating_mul(1u64 << exponent)
            .min(self.max_backoff_ms);
        Duration::from_millis(delay)
    }

    pub fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }
}

/// Per-request pipeline parameters.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub network: Network,
    /// Depth used when a request does not specify one.
    pub default_max_depth: u8,
    /// Concurrent node expansions during resolution.
    pub resolver_workers: usize,
    pub adapter_timeout_ms: u64,
    /// Timeout per leaf proof and per fold.
    pub leaf_timeout_ms: u64,
    pub retry: RetryPolicy,
    /// How long a proof stays valid after generation.
    pub validity_window_secs: u64,
    /// Mixed into witness blinding; provers that must reproduce each other's
    /// proofs share it.
    pub blinding_salt: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            network: Network::default(),
            default_max_depth: DEFAULT_MAX_DEPTH,
            resolver_workers: 8,
            adapter_timeout_ms: 5_000,
            leaf_timeout_ms: 30_000,
            retry: RetryPolicy::default(),
            validity_window_secs: 6 * 60 * 60,
            blinding_salt: "zkbo".into(),
        }
    }
}

impl PipelineConfig {
    /// Load configuration from `ZKBO_*` environment variables, falling back
    /// to defaults for anything unset.
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let network = match env::var(NETWORK_ENV) {
            Ok(value) => value.parse().context("invalid ZKBO_NETWORK")?,
            Err(_) => defaults.network,
        };

        let default_max_depth = match env::var(MAX_DEPTH_ENV) {
            Ok(value) => {
                let depth: u8 = value.parse().context("ZKBO_MAX_DEPTH must be an integer")?;
                if depth == 0 || depth > MAX_NESTING_DEPTH {
                    return Err(anyhow!(
                        "ZKBO_MAX_DEPTH must be in 1..={}, got {}",
                        MAX_NESTING_DEPTH,
                        depth
                    ));
                }
                depth
            }
            Err(_) => defaults.default_max_depth,
        };

        let retry = RetryPolicy {
            max_attempts: env_or(MAX_ATTEMPTS_ENV, defaults.retry.max_attempts),
            ..defaults.retry.clone()
        };

        Ok(Self {
            network,
            default_max_depth,
            resolver_workers: env_or(RESOLVER_WORKERS_ENV, defaults.resolver_workers).max(1),
            adapter_timeout_ms: env_or(ADAPTER_TIMEOUT_ENV, defaults.adapter_timeout_ms),
            leaf_timeout_ms: env_or(LEAF_TIMEOUT_ENV, defaults.leaf_timeout_ms),
            retry,
            validity_window_secs: env_or(VALIDITY_WINDOW_ENV, defaults.validity_window_secs),
            blinding_salt: defaults.blinding_salt,
        })
    }

    pub fn adapter_timeout(&self) -> Duration {
        Duration::from_millis(self.adapter_timeout_ms)
    }

    pub fn leaf_timeout(&self) -> Duration {
        Duration::from_millis(self.leaf_timeout_ms)
    }

    pub fn validity_window(&self) -> chrono::Duration {
        let secs = self.validity_window_secs.min(MAX_VALIDITY_WINDOW_SECS);
        chrono::Duration::seconds(i64::try_from(secs).unwrap_or(0))
    }
}

/// Which proving backend the pipeline talks to.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BackendConfig {
    /// In-process accumulator backend keyed by `key_seed`.
    Local {
        #[serde(with = "crate::serde_hex32")]
        key_seed: [u8; 32],
    },
    /// Remote proving cluster speaking the `/v1` proving contract.
    Remote {
        endpoint: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        api_key: Option<String>,
        #[serde(default = "default_request_timeout_ms")]
        request_timeout_ms: u64,
    },
}

fn default_request_timeout_ms() -> u64 {
    30_000
}

impl Default for BackendConfig {
    fn default() -> Self {
        BackendConfig::Local {
            key_seed: DEV_KEY_SEED,
        }
    }
}

impl BackendConfig {
    /// `ZKBO_PROVER_ENDPOINT` selects the remote backend; otherwise the local
    /// one keyed by `ZKBO_KEY_SEED` (hex) or the development seed.
    pub fn from_env() -> Result<Self> {
        if let Ok(endpoint) = env::var(PROVER_ENDPOINT_ENV) {
            return Ok(BackendConfig::Remote {
                endpoint,
                api_key: env::var(API_KEY_ENV).ok(),
                request_timeout_ms: default_request_timeout_ms(),
            });
        }
        let key_seed = match env::var(KEY_SEED_ENV) {
            Ok(value) => crate::parse_hex32(&value).context("invalid ZKBO_KEY_SEED")?,
            Err(_) => DEV_KEY_SEED,
        };
        Ok(BackendConfig::Local { key_seed })
    }

    pub fn remote_default() -> Self {
        BackendConfig::Remote {
            endpoint: DEFAULT_PROVER_ENDPOINT.into(),
            api_key: None,
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(value) => match value.parse() {
            Ok(parsed) => parsed,
            Err(_) => {
                tracing::warn!("ignoring invalid value {:?} for {}", value, key);
                default
            }
        },
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_grows_and_caps() {
        let policy = RetryPolicy {
            max_attempts: 5,
            initial_backoff_ms: 100,
            max_backoff_ms: 350,
        };
        assert_eq!(policy.backoff(1), Duration::from_millis(100));
        assert_eq!(policy.backoff(2), Duration::from_millis(200));
        assert_eq!(policy.backoff(3), Duration::from_millis(350));
        assert_eq!(policy.backoff(30), Duration::from_millis(350));
    }

    #[test]
    fn zero_attempts_still_runs_once() {
        let policy = RetryPolicy {
            max_attempts: 0,
            ..RetryPolicy::default()
        };
        assert_eq!(policy.attempts(), 1);
    }

    #[test]
    fn network_parsing() {
        assert_eq!("Base".parse::<Network>().unwrap(), Network::Base);
        assert!("solana".parse::<Network>().is_err());
    }

    #[test]
    fn defaults_are_short_lived() {
        let config = PipelineConfig::default();
        assert_eq!(config.default_max_depth, MAX_NESTING_DEPTH);
        assert!(config.validity_window_secs < 24 * 60 * 60);
    }

    #[test]
    fn backend_config_json_round_trip() {
        let config = BackendConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        assert!(json.contains("\"kind\":\"local\""));
        let decoded: BackendConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, config);
    }
}
