//! Protocol adapter backed by a JSON holdings snapshot.
//!
//! ```json
//! {
//!   "taken_at": "2026-01-01T00:00:00Z",
//!   "holdings": [
//!     { "holder": "0xabc", "held_asset": "v1-shares", "protocol": "vault",
//!       "share": 600000000000, "target": "V1", "underlying_amount": 600 }
//!   ]
//! }
//! ```
//!
//! `share` is in raw fixed-point units (10^12 = 100%). An entry may set
//! `reported_by` when the adapter of another protocol reports the edge.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use zkbo_common::{AdapterError, Fraction, HoldingEdge, NodeId, ProtocolKind};
use zkbo_prover::ProtocolAdapter;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reported_by: Option<ProtocolKind>,
    pub holder: NodeId,
    pub held_asset: NodeId,
    pub protocol: ProtocolKind,
    pub share: Fraction,
    pub target: NodeId,
    #[serde(default)]
    pub underlying_amount: u128,
}

impl SnapshotEntry {
    pub fn from_edge(reported_by: Option<ProtocolKind>, edge: &HoldingEdge) -> Self {
        Self {
            reported_by,
            holder: edge.holder.clone(),
            held_asset: edge.held_asset.clone(),
            protocol: edge.protocol.clone(),
            share: edge.share,
            target: edge.target.clone(),
            underlying_amount: edge.underlying_amount,
        }
    }

    fn into_edge(self) -> (ProtocolKind, HoldingEdge) {
        let reporter = self.reported_by.unwrap_or_else(|| self.protocol.clone());
        let edge = HoldingEdge::new(
            self.holder,
            self.held_asset,
            self.protocol,
            self.share,
            self.target,
        )
        .with_amount(self.underlying_amount);
        (reporter, edge)
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub taken_at: Option<DateTime<Utc>>,
    pub holdings: Vec<SnapshotEntry>,
}

/// Serves every registered protocol from one snapshot.
#[derive(Debug, Default)]
pub struct SnapshotAdapter {
    taken_at: Option<DateTime<Utc>>,
    edges: BTreeMap<(NodeId, ProtocolKind), Vec<HoldingEdge>>,
}

impl SnapshotAdapter {
    pub fn new(snapshot: Snapshot) -> Self {
        let mut edges: BTreeMap<(NodeId, ProtocolKind), Vec<HoldingEdge>> = BTreeMap::new();
        for entry in snapshot.holdings {
            let (reporter, edge) = entry.into_edge();
            edges
                .entry((edge.holder.clone(), reporter))
                .or_default()
                .push(edge);
        }
        Self {
            taken_at: snapshot.taken_at,
            edges,
        }
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let snapshot: Snapshot =
            serde_json::from_str(json).context("failed to parse holdings snapshot")?;
        Ok(Self::new(snapshot))
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = fs::read_to_string(path)
            .with_context(|| format!("failed to read holdings snapshot {}", path.display()))?;
        let adapter = Self::from_json(&json)?;
        debug!(
            "loaded {} holding edge(s) from {}",
            adapter.edge_count(),
            path.display()
        );
        Ok(adapter)
    }

    pub fn taken_at(&self) -> Option<DateTime<Utc>> {
        self.taken_at
    }

    pub fn edge_count(&self) -> usize {
        self.edges.values().map(Vec::len).sum()
    }
}

#[async_trait]
impl ProtocolAdapter for SnapshotAdapter {
    async fn list_holdings(
        &self,
        node: &NodeId,
        protocol: &ProtocolKind,
        as_of: DateTime<Utc>,
    ) -> Result<Vec<HoldingEdge>, AdapterError> {
        if let Some(taken_at) = self.taken_at {
            if as_of < taken_at {
                return Err(AdapterError::Permanent(format!(
                    "snapshot taken at {} cannot answer for {}",
                    taken_at, as_of
                )));
            }
        }
        Ok(self
            .edges
            .get(&(node.clone(), protocol.clone()))
            .cloned()
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const SNAPSHOT: &str = r#"{
        "taken_at": "2026-01-01T00:00:00Z",
        "holdings": [
            { "holder": "w", "held_asset": "v-shares", "protocol": "vault",
              "share": 1000000000000, "target": "V" },
            { "reported_by": "vault", "holder": "V", "held_asset": "r",
              "protocol": { "other": "restaking" }, "share": 500000000000,
              "target": "R", "underlying_amount": 42 }
        ]
    }"#;

    #[tokio::test]
    async fn serves_edges_by_reporting_protocol() {
        let adapter = SnapshotAdapter::from_json(SNAPSHOT).unwrap();
        assert_eq!(adapter.edge_count(), 2);
        let at = Utc.with_ymd_and_hms(2026, 1, 2, 0, 0, 0).unwrap();

        let reported = adapter
            .list_holdings(&"V".into(), &ProtocolKind::Vault, at)
            .await
            .unwrap();
        assert_eq!(reported.len(), 1);
        assert_eq!(reported[0].protocol, ProtocolKind::Other("restaking".into()));
        assert_eq!(reported[0].underlying_amount, 42);
    }

    #[tokio::test]
    async fn refuses_times_before_the_snapshot() {
        let adapter = SnapshotAdapter::from_json(SNAPSHOT).unwrap();
        let before = Utc.with_ymd_and_hms(2025, 12, 31, 0, 0, 0).unwrap();
        let err = adapter
            .list_holdings(&"w".into(), &ProtocolKind::Vault, before)
            .await
            .unwrap_err();
        assert!(!err.is_transient());
    }

    #[test]
    fn rejects_garbage() {
        assert!(SnapshotAdapter::from_json("{\"holdings\": 3}").is_err());
    }
}
