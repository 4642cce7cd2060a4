// ── Telemetry domain model ──
//
// Canonical shapes shared by the normalizer, the aggregator and every
// read surface. Snapshot types mirror the control plane's payload after
// validation; the telemetry types are derived per tick and never persisted.

pub mod snapshot;
pub mod telemetry;

// ── Re-exports ──────────────────────────────────────────────────────

pub use snapshot::{ConnectionRecord, DetailRecord, FlowMetadata, Snapshot};
pub use telemetry::{
    ConnectionsView, RateMaps, RateSample, StreamStatus, TrafficPoint, ViewMode, ViewState,
    Visibility,
};
