// ── Snapshot domain types ──

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One full-replace view of all current connections and cumulative totals.
///
/// Not a diff: each applied snapshot supersedes the previous one wholesale.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub upload_total: u64,
    pub download_total: u64,
    pub connections: Vec<ConnectionRecord>,
}

impl Snapshot {
    /// Total number of flows across all connections.
    pub fn sessions(&self) -> u32 {
        self.connections
            .iter()
            .fold(0u32, |acc, c| acc.saturating_add(c.connection_count))
    }
}

/// Descriptive fields of a flow group or a single flow.
///
/// Known fields are lifted out; anything else the control plane sends is
/// kept in `extra` so nothing is silently dropped.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowMetadata {
    #[serde(default)]
    pub host: String,
    #[serde(default, rename = "sourceIP")]
    pub source_ip: String,
    #[serde(default)]
    pub source_port: String,
    #[serde(default, rename = "destinationIP")]
    pub destination_ip: String,
    #[serde(default)]
    pub destination_port: String,
    #[serde(default)]
    pub network: String,
    #[serde(default)]
    pub outbound: String,
    /// How the destination name was learned: `dns`, `sni`, `sniff`, or `mixed`.
    #[serde(default)]
    pub domain_source: String,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// A flow group as reported by the control plane, or a regrouped
/// aggregate produced by the view aggregator.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionRecord {
    /// Stable for the life of the flow group. Aggregates use `{mode}:{label}`.
    pub id: String,
    pub metadata: FlowMetadata,
    pub upload: u64,
    pub download: u64,
    pub connection_count: u32,
    pub details: Vec<DetailRecord>,
    pub start: Option<DateTime<Utc>>,
    pub last_seen: Option<DateTime<Utc>>,
}

/// One leaf flow under a connection.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetailRecord {
    /// Control-plane id, when it sent one.
    pub id: Option<String>,
    /// Rate-attribution key: `id`, or `{connection_id}-{index}` without one.
    pub key: String,
    pub metadata: FlowMetadata,
    pub upload: u64,
    pub download: u64,
    pub start: Option<DateTime<Utc>>,
    pub last_seen: Option<DateTime<Utc>>,
}
