//! Live connection telemetry between `proxyscope-api` and its consumers.
//!
//! Ingests full-replace connection snapshots from a push stream with a
//! fallback fetch path, and derives everything a connections view needs:
//!
//! - **[`Telemetry`]**: Facade owning at most one live session.
//!   [`activate()`](Telemetry::activate) issues an immediate fallback fetch,
//!   opens the push stream and arms the staleness watchdog;
//!   [`pause()`](Telemetry::pause) / [`deactivate()`](Telemetry::deactivate)
//!   tear all of it down. Read surfaces are `watch` channels (snapshot,
//!   status, view rows, traffic series) plus an `ArcSwap` of rate maps.
//!
//! - **Normalization** ([`normalize`]): Validates raw payloads; a bad tick
//!   is skipped and never clears canonical state.
//!
//! - **Frame pacing** ([`FrameScheduler`], [`Pacer`]): Coalesces bursts
//!   into one application per flush, last snapshot wins.
//!
//! - **Derivations**: [`aggregate()`] regroups connections by source or
//!   destination, [`RateCalculator`] turns cumulative counters into
//!   bytes/sec, [`TrafficWindow`] keeps a time- and count-bounded series.
//!
//! - **Collaborators**: [`SnapshotSource`] (the control plane, implemented
//!   by `ConnectionsClient`) and [`ConfigStore`] (persisted view state).

pub mod aggregate;
pub mod config;
pub mod error;
pub mod frame;
pub mod model;
pub mod normalize;
pub mod rate;
mod session;
pub mod source;
pub mod store;
pub mod supervisor;
pub mod telemetry;
pub mod window;

// ── Primary re-exports ──────────────────────────────────────────────
pub use aggregate::aggregate;
pub use config::{TelemetryConfig, TlsVerification};
pub use error::CoreError;
pub use frame::{FrameScheduler, Pacer, VisibilityPacer};
pub use rate::RateCalculator;
pub use source::SnapshotSource;
pub use store::{ConfigStore, MemoryStore};
pub use supervisor::TransportSupervisor;
pub use telemetry::{Telemetry, TelemetryBuilder};
pub use window::TrafficWindow;

pub use model::{
    ConnectionRecord, ConnectionsView, DetailRecord, FlowMetadata, RateMaps, RateSample, Snapshot,
    StreamStatus, TrafficPoint, ViewMode, ViewState, Visibility,
};
