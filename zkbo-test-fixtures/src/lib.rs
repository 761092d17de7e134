//! Shared test scaffolding: in-memory protocol adapters, ownership graphs
//! with known answers, a fault-injecting proving backend and a fixed clock.

pub mod adapter;
pub mod backend;
pub mod scenarios;

use anyhow::Result;
use chrono::{DateTime, Duration, TimeZone, Utc};
use tokio::sync::OnceCell;

use zkbo_prover::ProofReport;

pub use adapter::MemoryAdapter;
pub use backend::FlakyBackend;
pub use scenarios::{
    chain, cycle, diamond, empty, shortcut, two_vault, unknown_protocol, unreachable_root,
    Scenario, WALLET,
};
pub use zkbo_common::FixedClock;

/// Key seed of every fixture backend.
pub const KEY_SEED: [u8; 32] = [0x5a; 32];

static TWO_VAULT_REPORT: OnceCell<ProofReport> = OnceCell::const_new();

/// Snapshot time of every fixture request.
pub fn as_of() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0)
        .single()
        .unwrap_or_default()
}

/// Generation time fixture pipelines stamp onto proofs.
pub fn generated_at() -> DateTime<Utc> {
    as_of() + Duration::hours(1)
}

pub fn clock() -> FixedClock {
    FixedClock::new(generated_at())
}

/// The two-vault proof, generated once per test binary.
pub async fn two_vault_report() -> Result<&'static ProofReport> {
    TWO_VAULT_REPORT
        .get_or_try_init(|| async {
            let scenario = two_vault();
            let report = scenario.pipeline().prove(&scenario.request()).await?;
            Ok::<_, anyhow::Error>(report)
        })
        .await
}
