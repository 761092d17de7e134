use chrono::{DateTime, Duration, Utc};

use zkbo_common::{PipelineConfig, Proof};

/// Validity window stamped onto every proof at generation time.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ExpiryPolicy {
    window: Duration,
}

impl Default for ExpiryPolicy {
    fn default() -> Self {
        Self::new(Duration::hours(6))
    }
}

impl ExpiryPolicy {
    pub fn new(window: Duration) -> Self {
        Self { window }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(config.validity_window())
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// An out-of-range window stamps the proof as already expired.
    pub fn stamp(&self, generated_at: DateTime<Utc>) -> DateTime<Utc> {
        generated_at
            .checked_add_signed(self.window)
            .unwrap_or(generated_at)
    }

    pub fn is_expired(&self, proof: &Proof, now: DateTime<Utc>) -> bool {
        expired_at(proof.expires_at, now)
    }

    /// Time left before `proof` expires, `None` once it has.
    pub fn remaining(&self, proof: &Proof, now: DateTime<Utc>) -> Option<Duration> {
        if self.is_expired(proof, now) {
            None
        } else {
            Some(proof.expires_at - now)
        }
    }
}

pub(crate) fn expired_at(expires_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    now >= expires_at
}
