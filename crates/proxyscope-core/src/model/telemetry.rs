// ── Derived telemetry types ──

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use super::snapshot::ConnectionRecord;

/// How connection rows are grouped.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum ViewMode {
    /// Connections as reported.
    #[default]
    Current,
    /// Every detail regrouped by its source label.
    Source,
    /// Every detail regrouped by its destination label.
    Destination,
}

/// Streaming status observable by consumers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum StreamStatus {
    #[default]
    Idle,
    Connecting,
    Live,
    Reconnecting,
    Paused,
}

/// Whether the consumer is on screen.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Visibility {
    #[default]
    Visible,
    Hidden,
}

impl Visibility {
    pub fn is_hidden(self) -> bool {
        self == Self::Hidden
    }
}

/// Connections view gate: rates are only computed while `active`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ViewState {
    pub active: bool,
    pub mode: ViewMode,
}

/// Instantaneous throughput of one entity in bytes/sec.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RateSample {
    pub upload: f64,
    pub download: f64,
}

/// Per-entity rates for one tick, swapped in whole.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RateMaps {
    /// Keyed by connection id (or aggregate id in grouped views).
    pub connections: HashMap<String, RateSample>,
    /// Keyed by detail key.
    pub details: HashMap<String, RateSample>,
}

impl RateMaps {
    pub fn connection(&self, id: &str) -> RateSample {
        self.connections.get(id).copied().unwrap_or_default()
    }

    pub fn detail(&self, key: &str) -> RateSample {
        self.details.get(key).copied().unwrap_or_default()
    }
}

/// One charted sample, appended per applied snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrafficPoint {
    pub time: DateTime<Utc>,
    /// Upload throughput since the previous sample, bytes/sec.
    pub up: f64,
    /// Download throughput since the previous sample, bytes/sec.
    pub down: f64,
    pub total_up: u64,
    pub total_down: u64,
    pub sessions: u32,
}

/// Rows of the connections view for the mode they were grouped with.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ConnectionsView {
    pub mode: ViewMode,
    pub rows: Vec<ConnectionRecord>,
}
